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

use serde::{Deserialize, Serialize};

use super::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Iseq,
    #[serde(rename = "cfunc")]
    CFunc,
    AttrSet,
    #[serde(rename = "ivar")]
    IVar,
    #[serde(rename = "bmethod")]
    BMethod,
    #[serde(rename = "zsuper")]
    ZSuper,
    Alias,
    Undef,
    NotImplemented,
    Optimized,
    Missing,
    Refined,
}

impl MethodKind {
    /// Kinds that can never own a live interpreted frame.
    pub fn is_uncallable(self) -> bool {
        matches!(self, MethodKind::Undef | MethodKind::NotImplemented)
    }
}

/// A resolved, callable method entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    pub called_id: String,
    pub original_id: String,
    /// Class whose method table the entry was found in. For methods of
    /// included modules this is the include class, for refined methods the
    /// refinement's activation include class.
    pub defined_class: Option<ObjectId>,
    pub owner: ObjectId,
    pub kind: MethodKind,
}

impl MethodEntry {
    pub fn new(name: &str, owner: ObjectId, defined_class: ObjectId, kind: MethodKind) -> Self {
        MethodEntry {
            called_id: name.to_string(),
            original_id: name.to_string(),
            defined_class: Some(defined_class),
            owner,
            kind,
        }
    }

    /// The same method reached under another name.
    pub fn aliased(&self, called_id: &str) -> Self {
        MethodEntry {
            called_id: called_id.to_string(),
            ..self.clone()
        }
    }
}
