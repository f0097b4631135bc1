/*
 * Copyright (c) 2024 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Call-stack snapshot interpretation for an interpreted runtime.
//!
//! A capture walks the control frames of one target thread while its
//! execution context is paused, copies every field it needs into owned
//! records, and only then classifies the frames, resolves qualified method
//! names and fills native frames with the source position of the nearest
//! interpreted caller.
//!
//! Pipeline: reader -> classifier -> resolver -> propagator -> materializer.

// Fatal path for states that a valid, live thread can never produce.
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        log::error!(
            "internal invariant violated at {}:{}: {}",
            file!(),
            line!(),
            message
        );
        panic!(
            "internal invariant violated at {}:{}: {}",
            file!(),
            line!(),
            message
        )
    }};
}

pub mod capture;
pub mod error;
pub mod frames;
pub mod location;
pub mod vm;

pub use capture::{
    backtrace_locations, caller_locations, capture_raw_frames, frame_count, CaptureOptions,
    CALLER_LOCATIONS_IGNORED_FRAMES,
};
pub use error::{Error, Result};
pub use frames::{
    frame_filename, frame_label, frame_line_number, frame_name, NamingRule, RawFrame, Receiver,
    NATIVE_CODE_PATH,
};
pub use location::{DebugInfo, Location};
pub use vm::{Runtime, Vm};
