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

//! The host-runtime boundary and its in-memory implementation.
//!
//! [`Runtime`] is everything the frame engine needs from the interpreter:
//! pause-and-read access to a thread's control frames and a handful of
//! object model queries. [`Vm`] implements it over an arena of objects, and
//! [`image`] builds a [`Vm`] from a serialized description.

pub mod image;
mod heap;
mod iseq;
mod method;
mod object;
mod runtime;
mod thread;

pub use heap::Vm;
pub use iseq::{Iseq, IseqType, LineEntry};
pub use method::{MethodEntry, MethodKind};
pub use object::{ObjectId, Refinement, ValueType, WellKnown};
pub use runtime::Runtime;
pub use thread::{
    ControlFrame, Env, EnvRef, ExecutionContext, FrameMagic, MeCref, RubyThread, ThreadStatus,
    DUMMY_FRAME_COUNT,
};
