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

use std::sync::Arc;

use super::{FrameRecord, RawFrame, Receiver};
use crate::vm::{ControlFrame, ExecutionContext, Iseq, MeCref, MethodEntry, ObjectId, Runtime};

/// Method entry of a frame: the first one found walking from the frame's
/// environment out to the local environment.
pub fn frame_method_entry(ec: &ExecutionContext, cfp: &ControlFrame) -> Option<Arc<MethodEntry>> {
    let mut env = match ec.env(cfp.ep) {
        Some(env) => env,
        None => invariant_violation!("frame environment {:?} is out of range", cfp.ep),
    };
    while let Some(prev) = env.prev {
        if let Some(me) = check_method_entry(&env.me_cref, false) {
            return Some(me);
        }
        env = match ec.env(prev) {
            Some(env) => env,
            None => invariant_violation!("outer environment {:?} is out of range", prev),
        };
    }
    check_method_entry(&env.me_cref, true)
}

fn check_method_entry(slot: &MeCref, can_be_svar: bool) -> Option<Arc<MethodEntry>> {
    match slot {
        MeCref::Empty | MeCref::Cref => None,
        MeCref::Method(me) => Some(me.clone()),
        MeCref::Svar(inner) if can_be_svar => check_method_entry(inner, false),
        // only local environments carry special variables
        MeCref::Svar(_) => None,
    }
}

/// Line executing at `pc`; 0 without a program counter.
pub fn line_number(iseq: &Iseq, pc: Option<usize>) -> u32 {
    let Some(pc) = pc else {
        return 0;
    };
    if pc > iseq.size {
        invariant_violation!(
            "program counter {} is past the end of `{}` ({} instructions)",
            pc,
            iseq.label,
            iseq.size
        );
    }
    // pc already points at the next instruction
    let position = pc.saturating_sub(1);
    iseq.line_at(position)
}

pub fn receiver_identity<R: Runtime>(runtime: &R, self_value: ObjectId) -> Receiver {
    let wk = runtime.well_known();
    if self_value == wk.main
        || self_value == wk.frozen_core
        || runtime.value_type(self_value).is_class_like()
    {
        Receiver::RealSelf(self_value)
    } else {
        Receiver::ClassOf(runtime.class_of(self_value))
    }
}

pub fn classify<R: Runtime>(runtime: &R, record: FrameRecord) -> RawFrame {
    let is_interpreted = !record.magic.is_cframe();
    let line_number = match (&record.iseq, is_interpreted) {
        (Some(iseq), true) => line_number(iseq, record.pc),
        _ => 0,
    };
    RawFrame {
        is_interpreted,
        method_kind: record.method_entry.as_ref().map(|me| me.kind),
        method_entry: record.method_entry,
        receiver: receiver_identity(runtime, record.self_value),
        iseq: record.iseq,
        line_number,
        pc: record.pc,
    }
}
