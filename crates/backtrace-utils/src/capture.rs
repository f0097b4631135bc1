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

//! Entry points: whole-stack captures and per-frame accessors.

use log::{debug, warn};

use crate::error::Result;
use crate::frames::{self, RawFrame, NATIVE_CODE_PATH};
use crate::location::{materialize, Location};
use crate::vm::{ObjectId, Runtime};

/// Frames [`caller_locations`] drops on top of the caller's request: the
/// capture call itself and its direct caller.
pub const CALLER_LOCATIONS_IGNORED_FRAMES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub ignored_top_frames: usize,
    pub ignored_bottom_frames: usize,
    pub include_debug: bool,
    pub native_code_path: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        CaptureOptions {
            ignored_top_frames: 0,
            ignored_bottom_frames: 0,
            include_debug: false,
            native_code_path: NATIVE_CODE_PATH.to_string(),
        }
    }
}

/// Valid frames of `thread`, newest first. `None` when the thread is dead.
pub fn capture_raw_frames<R: Runtime>(
    runtime: &R,
    thread: ObjectId,
) -> Result<Option<Vec<RawFrame>>> {
    let frames = frames::snapshot(runtime, thread)?;
    match &frames {
        Some(frames) => debug!("captured {} frames of thread {}", frames.len(), thread),
        None => warn!("thread {} is dead, nothing captured", thread),
    }
    Ok(frames)
}

pub fn backtrace_locations<R: Runtime>(
    runtime: &R,
    thread: ObjectId,
    options: &CaptureOptions,
) -> Result<Option<Vec<Location>>> {
    let Some(frames) = capture_raw_frames(runtime, thread)? else {
        return Ok(None);
    };
    Ok(Some(materialize(runtime, &frames, options)))
}

/// Locations of the current thread's callers.
pub fn caller_locations<R: Runtime>(
    runtime: &R,
    options: &CaptureOptions,
) -> Result<Option<Vec<Location>>> {
    let options = CaptureOptions {
        ignored_top_frames: options.ignored_top_frames + CALLER_LOCATIONS_IGNORED_FRAMES,
        ..options.clone()
    };
    backtrace_locations(runtime, runtime.current_thread(), &options)
}

/// Number of valid frames of `thread`; 0 when it is dead.
pub fn frame_count<R: Runtime>(runtime: &R, thread: ObjectId) -> Result<usize> {
    let count = runtime.with_execution_context(thread, |ec| frames::read_frames(ec).len())?;
    Ok(count.unwrap_or(0))
}
