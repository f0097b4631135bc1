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

use std::fmt;

use serde::Serialize;

/// Handle of a heap object inside a [`crate::vm::Vm`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Object,
    Class,
    Module,
    IClass,
    Thread,
}

impl ValueType {
    /// Receivers of these types are kept as real self by the classifier.
    pub fn is_class_like(self) -> bool {
        matches!(self, ValueType::Class | ValueType::Module | ValueType::IClass)
    }
}

/// A refinement module: the class it refines and the module whose
/// `refine` block created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refinement {
    pub refined_class: ObjectId,
    pub defined_at: ObjectId,
}

/// Objects every runtime has and the resolver compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnown {
    pub main: ObjectId,
    pub frozen_core: ObjectId,
    pub basic_object: ObjectId,
    pub object: ObjectId,
    pub module: ObjectId,
    pub class: ObjectId,
    pub kernel: ObjectId,
    pub thread: ObjectId,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ClassBody {
    pub name: Option<String>,
    pub superclass: Option<ObjectId>,
    // Some(x) iff this is the singleton class of x.
    pub attached: Option<ObjectId>,
    pub refinement: Option<Refinement>,
    // include class through which refined methods are dispatched
    pub activation: Option<ObjectId>,
}

#[derive(Debug)]
pub(crate) enum ObjectBody {
    Plain,
    Class(ClassBody),
    Module(ClassBody),
    IClass {
        module: ObjectId,
        superclass: Option<ObjectId>,
    },
    Thread(std::sync::Arc<crate::vm::RubyThread>),
}

#[derive(Debug)]
pub(crate) struct RObject {
    // None only while bootstrapping the core classes
    pub klass: Option<ObjectId>,
    pub body: ObjectBody,
}

impl RObject {
    pub fn value_type(&self) -> ValueType {
        match self.body {
            ObjectBody::Plain => ValueType::Object,
            ObjectBody::Class(_) => ValueType::Class,
            ObjectBody::Module(_) => ValueType::Module,
            ObjectBody::IClass { .. } => ValueType::IClass,
            ObjectBody::Thread(_) => ValueType::Thread,
        }
    }

    pub fn class_body(&self) -> Option<&ClassBody> {
        match &self.body {
            ObjectBody::Class(b) | ObjectBody::Module(b) => Some(b),
            _ => None,
        }
    }

    pub fn class_body_mut(&mut self) -> Option<&mut ClassBody> {
        match &mut self.body {
            ObjectBody::Class(b) | ObjectBody::Module(b) => Some(b),
            _ => None,
        }
    }

    /// Raw superclass link, include classes not skipped.
    pub fn raw_superclass(&self) -> Option<ObjectId> {
        match &self.body {
            ObjectBody::Class(b) | ObjectBody::Module(b) => b.superclass,
            ObjectBody::IClass { superclass, .. } => *superclass,
            _ => None,
        }
    }
}
