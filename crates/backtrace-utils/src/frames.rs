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

//! Reading and interpreting the control frames of a paused thread.

mod classify;
mod naming;
mod profile;
mod propagate;

use std::sync::Arc;

use log::trace;

use crate::error::Result;
use crate::vm::{
    ExecutionContext, FrameMagic, Iseq, MethodEntry, MethodKind, ObjectId, Runtime,
};

pub use classify::{classify, frame_method_entry, line_number, receiver_identity};
pub use naming::{
    frame_label, frame_name, mod_to_s, naming_rule, qualified_method_name, NamingRule,
    BLOCK_SUFFIX,
};
pub use profile::{profile_frame, ProfileFrame};
pub use propagate::{
    frame_filename, frame_line_number, nearest_interpreted, propagate, SourcePosition,
    NATIVE_CODE_PATH,
};

/// Number of bootstrap frames at the bottom of every thread's stack.
pub const SENTINEL_FRAME_COUNT: usize = crate::vm::DUMMY_FRAME_COUNT;

/// Everything copied out of one live control frame.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub magic: FrameMagic,
    pub iseq: Option<Arc<Iseq>>,
    pub pc: Option<usize>,
    pub self_value: ObjectId,
    pub method_entry: Option<Arc<MethodEntry>>,
}

/// Who the frame runs on behalf of.
///
/// Only the main object, the frozen core and class-like values are kept as
/// themselves; any other receiver is reduced to its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    RealSelf(ObjectId),
    ClassOf(ObjectId),
}

impl Receiver {
    pub fn is_real_self(&self) -> bool {
        matches!(self, Receiver::RealSelf(_))
    }

    pub fn real_self(&self) -> Option<ObjectId> {
        match *self {
            Receiver::RealSelf(obj) => Some(obj),
            Receiver::ClassOf(_) => None,
        }
    }

    /// The receiver or its class, whichever was kept.
    pub fn value(&self) -> ObjectId {
        match *self {
            Receiver::RealSelf(obj) | Receiver::ClassOf(obj) => obj,
        }
    }

    pub fn self_class<R: Runtime>(&self, runtime: &R) -> ObjectId {
        match *self {
            Receiver::RealSelf(obj) => runtime.class_of(obj),
            Receiver::ClassOf(klass) => klass,
        }
    }
}

/// One classified frame of a snapshot.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub is_interpreted: bool,
    pub iseq: Option<Arc<Iseq>>,
    pub method_entry: Option<Arc<MethodEntry>>,
    pub method_kind: Option<MethodKind>,
    pub receiver: Receiver,
    pub line_number: u32,
    pub pc: Option<usize>,
}

/// Copies the valid frames of `ec`, newest first.
///
/// Skipped: frames with a code object but no program counter, native
/// frames whose method entry is not a native method, and the two bootstrap
/// frames.
pub fn read_frames(ec: &ExecutionContext) -> Vec<FrameRecord> {
    let frames = ec.frames();
    if frames.len() < SENTINEL_FRAME_COUNT {
        invariant_violation!(
            "stack holds {} frames, expected at least {} bootstrap frames",
            frames.len(),
            SENTINEL_FRAME_COUNT
        );
    }
    let (sentinels, live) = frames.split_at(SENTINEL_FRAME_COUNT);
    for (i, frame) in sentinels.iter().enumerate() {
        if frame.magic != FrameMagic::Dummy {
            invariant_violation!("bootstrap frame {} has kind {:?}", i, frame.magic);
        }
    }

    let mut records = Vec::with_capacity(live.len());
    for cfp in live.iter().rev() {
        if cfp.iseq.is_some() && cfp.pc.is_none() {
            trace!("skipping frame without program counter");
            continue;
        }
        let method_entry = frame_method_entry(ec, cfp);
        let interpreted = !cfp.magic.is_cframe();
        let native_method = method_entry
            .as_ref()
            .map_or(false, |me| me.kind == MethodKind::CFunc);
        if !interpreted && !native_method {
            trace!("skipping {:?} frame without native method", cfp.magic);
            continue;
        }
        records.push(FrameRecord {
            magic: cfp.magic,
            iseq: cfp.iseq.clone(),
            pc: cfp.pc,
            self_value: cfp.self_value,
            method_entry,
        });
    }
    records
}

/// Pauses `thread`, copies its frames and classifies them after the
/// thread is released. `None` for dead threads.
pub fn snapshot<R: Runtime>(runtime: &R, thread: ObjectId) -> Result<Option<Vec<RawFrame>>> {
    let Some(records) = runtime.with_execution_context(thread, read_frames)? else {
        return Ok(None);
    };
    Ok(Some(
        records
            .into_iter()
            .map(|record| classify(runtime, record))
            .collect(),
    ))
}
