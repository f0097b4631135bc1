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

use serde::Serialize;

use super::naming::mod_to_s;
use super::RawFrame;
use crate::vm::{Iseq, IseqType, MethodEntry, MethodKind, ObjectId, Runtime, ValueType};

/// What the runtime's stock per-frame profiling API reports for a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileFrame {
    pub path: Option<String>,
    pub absolute_path: Option<String>,
    pub label: Option<String>,
    pub base_label: Option<String>,
    pub full_label: Option<String>,
    pub first_lineno: Option<u32>,
    pub classpath: Option<String>,
    pub singleton_method_p: bool,
    pub method_name: Option<String>,
    pub qualified_method_name: Option<String>,
}

enum Target<'a> {
    Iseq(&'a Iseq),
    MethodEntry(&'a MethodEntry),
}

// eval code is reported as its code object; entries that are not plain
// interpreted methods as the entry itself
fn target(frame: &RawFrame) -> Option<Target<'_>> {
    let iseq = frame.iseq.as_deref();
    if let Some(iseq) = iseq.filter(|i| i.kind == IseqType::Eval) {
        return Some(Target::Iseq(iseq));
    }
    if let Some(me) = frame.method_entry.as_deref() {
        if me.kind != MethodKind::Iseq {
            return Some(Target::MethodEntry(me));
        }
    }
    iseq.map(Target::Iseq)
}

pub fn profile_frame<R: Runtime>(runtime: &R, frame: &RawFrame) -> Option<ProfileFrame> {
    let profile = match target(frame)? {
        Target::Iseq(iseq) => ProfileFrame {
            path: iseq.path.clone(),
            absolute_path: iseq.absolute_path.clone(),
            label: Some(iseq.label.clone()),
            base_label: Some(iseq.base_label.clone()),
            full_label: Some(iseq.label.clone()),
            first_lineno: Some(iseq.first_lineno),
            classpath: None,
            singleton_method_p: false,
            method_name: iseq.method_name.clone(),
            qualified_method_name: iseq.method_name.clone(),
        },
        Target::MethodEntry(me) => {
            let classpath = me.defined_class.map(|dc| classpath(runtime, dc));
            let singleton_method_p = me
                .defined_class
                .map_or(false, |dc| runtime.is_singleton(dc));
            // only native methods have a name without a code object
            let method_name = (me.kind == MethodKind::CFunc).then(|| me.original_id.clone());
            let qualified_method_name = method_name.as_ref().map(|name| match &classpath {
                Some(cp) => format!("{}{}{}", cp, if singleton_method_p { "." } else { "#" }, name),
                None => name.clone(),
            });
            ProfileFrame {
                label: method_name.clone(),
                base_label: method_name.clone(),
                full_label: qualified_method_name.clone(),
                classpath,
                singleton_method_p,
                method_name,
                qualified_method_name,
                ..Default::default()
            }
        }
    };
    Some(profile)
}

// the runtime's own rendering: no $anonymous/$singleton decoration
fn classpath<R: Runtime>(runtime: &R, defined_class: ObjectId) -> String {
    let mut klass = defined_class;
    if runtime.value_type(klass) == ValueType::IClass {
        klass = runtime.included_module(klass).unwrap_or(klass);
    } else if let Some(attached) = runtime.attached_object(klass) {
        if !runtime.value_type(attached).is_class_like() {
            let real = runtime.class_real(runtime.class_of(attached));
            return format!("#<{}:{}>", mod_to_s(runtime, real), attached);
        }
        klass = attached;
    }
    runtime
        .class_name(klass)
        .unwrap_or_else(|| runtime.inspect(klass))
}
