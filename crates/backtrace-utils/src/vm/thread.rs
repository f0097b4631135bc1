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

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use super::{Iseq, MethodEntry, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Runnable,
    Stopped,
    StoppedForever,
    Killed,
}

/// Frame kind tag of a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMagic {
    Method,
    Block,
    Class,
    Top,
    #[serde(rename = "cfunc")]
    CFunc,
    #[serde(rename = "ifunc")]
    IFunc,
    Eval,
    Rescue,
    Dummy,
}

impl FrameMagic {
    /// Frames that run native code rather than an instruction sequence.
    pub fn is_cframe(self) -> bool {
        matches!(self, FrameMagic::CFunc | FrameMagic::IFunc | FrameMagic::Dummy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvRef(pub(crate) usize);

/// Content of an environment's method-entry/lexical-scope slot.
#[derive(Debug, Clone)]
pub enum MeCref {
    Empty,
    Method(Arc<MethodEntry>),
    Cref,
    Svar(Box<MeCref>),
}

#[derive(Debug, Clone)]
pub struct Env {
    pub me_cref: MeCref,
    pub prev: Option<EnvRef>,
}

#[derive(Debug, Clone)]
pub struct ControlFrame {
    pub magic: FrameMagic,
    pub iseq: Option<Arc<Iseq>>,
    pub pc: Option<usize>,
    pub self_value: ObjectId,
    pub ep: EnvRef,
}

/// Frames and environments of one thread. `frames[0]` is the oldest frame;
/// the first two are always the dummy frames pushed when the thread starts.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    frames: Vec<ControlFrame>,
    envs: Vec<Env>,
}

pub const DUMMY_FRAME_COUNT: usize = 2;

impl ExecutionContext {
    pub fn new(root_self: ObjectId) -> Self {
        let mut ec = ExecutionContext {
            frames: Vec::new(),
            envs: Vec::new(),
        };
        for _ in 0..DUMMY_FRAME_COUNT {
            let ep = ec.push_env(MeCref::Empty, None);
            ec.frames.push(ControlFrame {
                magic: FrameMagic::Dummy,
                iseq: None,
                pc: None,
                self_value: root_self,
                ep,
            });
        }
        ec
    }

    /// Oldest first, dummy frames included.
    pub fn frames(&self) -> &[ControlFrame] {
        &self.frames
    }

    pub fn env(&self, env: EnvRef) -> Option<&Env> {
        self.envs.get(env.0)
    }

    /// Frames above the dummy frames.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(DUMMY_FRAME_COUNT)
    }

    pub fn push_env(&mut self, me_cref: MeCref, prev: Option<EnvRef>) -> EnvRef {
        self.envs.push(Env { me_cref, prev });
        EnvRef(self.envs.len() - 1)
    }

    pub fn push_frame(&mut self, frame: ControlFrame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<ControlFrame> {
        if self.frames.len() > DUMMY_FRAME_COUNT {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn push(
        &mut self,
        magic: FrameMagic,
        iseq: Option<Arc<Iseq>>,
        pc: Option<usize>,
        self_value: ObjectId,
        me_cref: MeCref,
        prev: Option<EnvRef>,
    ) -> EnvRef {
        let ep = self.push_env(me_cref, prev);
        self.push_frame(ControlFrame {
            magic,
            iseq,
            pc,
            self_value,
            ep,
        });
        ep
    }

    pub fn push_top(&mut self, iseq: Arc<Iseq>, self_value: ObjectId, pc: usize) -> EnvRef {
        self.push(FrameMagic::Top, Some(iseq), Some(pc), self_value, MeCref::Cref, None)
    }

    pub fn push_class_body(&mut self, iseq: Arc<Iseq>, klass: ObjectId, pc: usize) -> EnvRef {
        self.push(FrameMagic::Class, Some(iseq), Some(pc), klass, MeCref::Cref, None)
    }

    pub fn push_method(
        &mut self,
        iseq: Arc<Iseq>,
        me: Arc<MethodEntry>,
        self_value: ObjectId,
        pc: usize,
    ) -> EnvRef {
        self.push(
            FrameMagic::Method,
            Some(iseq),
            Some(pc),
            self_value,
            MeCref::Method(me),
            None,
        )
    }

    /// Body of a method defined from a block (`define_method`).
    pub fn push_bmethod(
        &mut self,
        iseq: Arc<Iseq>,
        me: Arc<MethodEntry>,
        self_value: ObjectId,
        pc: usize,
    ) -> EnvRef {
        self.push(
            FrameMagic::Block,
            Some(iseq),
            Some(pc),
            self_value,
            MeCref::Method(me),
            None,
        )
    }

    pub fn push_block(
        &mut self,
        iseq: Arc<Iseq>,
        self_value: ObjectId,
        pc: usize,
        outer: EnvRef,
    ) -> EnvRef {
        self.push(
            FrameMagic::Block,
            Some(iseq),
            Some(pc),
            self_value,
            MeCref::Empty,
            Some(outer),
        )
    }

    pub fn push_eval(
        &mut self,
        iseq: Arc<Iseq>,
        self_value: ObjectId,
        pc: usize,
        outer: EnvRef,
    ) -> EnvRef {
        self.push(
            FrameMagic::Eval,
            Some(iseq),
            Some(pc),
            self_value,
            MeCref::Empty,
            Some(outer),
        )
    }

    pub fn push_cfunc(&mut self, me: Arc<MethodEntry>, self_value: ObjectId) -> EnvRef {
        self.push(
            FrameMagic::CFunc,
            None,
            None,
            self_value,
            MeCref::Method(me),
            None,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct ThreadState {
    status: ThreadStatus,
    to_kill: bool,
}

/// A thread of the runtime: its scheduling state and its execution context.
#[derive(Debug)]
pub struct RubyThread {
    state: RwLock<ThreadState>,
    ec: RwLock<ExecutionContext>,
}

impl RubyThread {
    pub fn new(root_self: ObjectId) -> Self {
        RubyThread {
            state: RwLock::new(ThreadState {
                status: ThreadStatus::Runnable,
                to_kill: false,
            }),
            ec: RwLock::new(ExecutionContext::new(root_self)),
        }
    }

    pub fn status(&self) -> ThreadStatus {
        self.state.read().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.state.write().status = status;
    }

    pub fn request_kill(&self) {
        self.state.write().to_kill = true;
    }

    pub fn is_alive(&self) -> bool {
        let state = self.state.read();
        !(state.to_kill || state.status == ThreadStatus::Killed)
    }

    /// Pauses the thread for reading: frames cannot change while the guard
    /// is held.
    pub fn pause(&self) -> RwLockReadGuard<'_, ExecutionContext> {
        self.ec.read()
    }

    pub fn execution_context_mut(&self) -> RwLockWriteGuard<'_, ExecutionContext> {
        self.ec.write()
    }
}
