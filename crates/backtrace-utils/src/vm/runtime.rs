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

use super::{ExecutionContext, ObjectId, Refinement, ValueType, WellKnown};
use crate::error::Result;

/// What the frame engine needs from the interpreter hosting it.
///
/// The object model (classes, method tables, names) must not change while a
/// capture runs. Execution contexts are only reachable through
/// [`Runtime::with_execution_context`], which keeps the thread paused for the
/// duration of the closure.
pub trait Runtime {
    fn well_known(&self) -> &WellKnown;

    fn current_thread(&self) -> ObjectId;

    /// Runs `f` with the paused execution context of `thread`.
    ///
    /// Returns `Ok(None)` when the thread is dead or about to be killed and
    /// [`crate::Error::InvalidTarget`] when `thread` is not a thread.
    fn with_execution_context<T, F>(&self, thread: ObjectId, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&ExecutionContext) -> T;

    fn value_type(&self, obj: ObjectId) -> ValueType;

    /// The class of `obj`, singleton class included.
    fn class_of(&self, obj: ObjectId) -> ObjectId;

    /// Superclass of a class, include classes skipped.
    fn superclass(&self, klass: ObjectId) -> Option<ObjectId>;

    fn is_singleton(&self, klass: ObjectId) -> bool;

    /// The object a singleton class belongs to.
    fn attached_object(&self, klass: ObjectId) -> Option<ObjectId>;

    /// Permanent name of a class or module; `None` for anonymous ones.
    fn class_name(&self, klass: ObjectId) -> Option<String>;

    fn refinement_of(&self, module: ObjectId) -> Option<Refinement>;

    /// The module an include class stands for.
    fn included_module(&self, iclass: ObjectId) -> Option<ObjectId>;

    /// Short human readable rendering of any handle.
    fn inspect(&self, obj: ObjectId) -> String;

    /// First ancestor that is neither a singleton class nor an include class.
    fn class_real(&self, klass: ObjectId) -> ObjectId {
        let mut klass = klass;
        while self.is_singleton(klass) || self.value_type(klass) == ValueType::IClass {
            match self.superclass(klass) {
                Some(superclass) => klass = superclass,
                None => break,
            }
        }
        klass
    }
}
