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

//! Human readable method names for classified frames.
//!
//! [`qualified_method_name`] runs a priority-ordered rule chain and is what
//! locations carry. [`frame_name`] is the compact receiver-qualifier plus
//! method-name rendering used by the per-frame accessors.

use serde::Serialize;

use super::{RawFrame, Receiver};
use crate::vm::{Iseq, MethodEntry, ObjectId, Refinement, Runtime, ValueType};

pub const BLOCK_SUFFIX: &str = "{block}";
const CLASS_EXEC: &str = "{class exec}";
const MODULE_EXEC: &str = "{module exec}";

// singleton-of-singleton chains deeper than this are corrupt
const MAX_NESTING: usize = 64;

/// Which rule named an interpreted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingRule {
    Native,
    ExecContext,
    Refinement,
    SingletonReceiver,
    BlockOrEval,
    AnonymousClass,
    Default,
}

pub fn qualified_method_name<R: Runtime>(runtime: &R, frame: &RawFrame) -> String {
    resolve(runtime, frame).1
}

pub fn naming_rule<R: Runtime>(runtime: &R, frame: &RawFrame) -> NamingRule {
    resolve(runtime, frame).0
}

fn resolve<R: Runtime>(runtime: &R, frame: &RawFrame) -> (NamingRule, String) {
    if !frame.is_interpreted {
        let me = match frame.method_entry.as_deref() {
            Some(me) => me,
            None => invariant_violation!("native frame without a method entry"),
        };
        let name = method_entry_qualified_name(runtime, me)
            .unwrap_or_else(|| me.original_id.clone());
        return (NamingRule::Native, name);
    }
    let iseq = interpreted_iseq(frame);
    let Some(me) = frame.method_entry.as_deref() else {
        let mut name = receiver_qualifier(runtime, frame);
        exec_context_suffix(runtime, frame, iseq, &mut name);
        return (NamingRule::ExecContext, name);
    };
    if me.kind.is_uncallable() {
        invariant_violation!(
            "interpreted frame `{}` runs a {:?} method entry `{}`",
            iseq.label,
            me.kind,
            me.called_id
        );
    }

    let (rule, mut name) = if let Some(refinement) = refinement_of_entry(runtime, me) {
        let name = format!(
            "{}#{}",
            refinement_name(runtime, refinement),
            me.called_id
        );
        (NamingRule::Refinement, name)
    } else if is_singleton_receiver(runtime, frame, me) {
        (
            NamingRule::SingletonReceiver,
            singleton_receiver_name(runtime, frame, iseq, me),
        )
    } else if iseq.is_block_or_eval() {
        let name = match me.defined_class {
            Some(dc) => format!(
                "{}{}{}",
                owner_name(runtime, dc),
                separator(runtime, dc),
                me.called_id
            ),
            None => format!("{}{}", receiver_qualifier(runtime, frame), me.called_id),
        };
        (NamingRule::BlockOrEval, name)
    } else if let Some(ancestor) = anonymous_defining_class(runtime, me) {
        let name = format!("{}$anonymous#{}", ancestor, iseq.base_label);
        (NamingRule::AnonymousClass, name)
    } else {
        let name = method_entry_qualified_name(runtime, me).unwrap_or_else(|| {
            format!("{}{}", receiver_qualifier(runtime, frame), iseq.base_label)
        });
        (NamingRule::Default, name)
    };
    if iseq.is_block_or_eval() {
        name.push_str(BLOCK_SUFFIX);
    }
    (rule, name)
}

fn interpreted_iseq(frame: &RawFrame) -> &Iseq {
    match frame.iseq.as_deref() {
        Some(iseq) => iseq,
        None => invariant_violation!("interpreted frame without a code object"),
    }
}

fn refinement_of_entry<R: Runtime>(runtime: &R, me: &MethodEntry) -> Option<Refinement> {
    let dc = me.defined_class?;
    runtime.refinement_of(runtime.class_of(dc))
}

// A reduced receiver only counts when the method sits in its own
// per-object table; inherited methods keep their defining class.
fn is_singleton_receiver<R: Runtime>(runtime: &R, frame: &RawFrame, me: &MethodEntry) -> bool {
    let wk = runtime.well_known();
    match frame.receiver {
        Receiver::RealSelf(obj) if obj == wk.main || obj == wk.frozen_core => true,
        Receiver::RealSelf(obj) => runtime.is_singleton(runtime.class_of(obj)),
        Receiver::ClassOf(klass) => {
            runtime.is_singleton(klass) && me.defined_class == Some(klass)
        }
    }
}

fn singleton_receiver_name<R: Runtime>(
    runtime: &R,
    frame: &RawFrame,
    iseq: &Iseq,
    me: &MethodEntry,
) -> String {
    let wk = runtime.well_known();
    let mut name = match frame.receiver.real_self() {
        Some(obj) if obj == wk.main || obj == wk.frozen_core => {
            let mut name = receiver_qualifier(runtime, frame);
            if !iseq.is_block_or_eval() {
                name.push_str(&iseq.base_label);
            }
            return name;
        }
        _ => {
            let singleton = frame.receiver.self_class(runtime);
            let real = runtime.class_real(singleton);
            if real == wk.class || real == wk.module {
                let attached = match runtime.attached_object(singleton) {
                    Some(attached) => attached,
                    None => invariant_violation!(
                        "singleton class {} has no attached object",
                        runtime.inspect(singleton)
                    ),
                };
                if runtime.class_name(attached).is_some() {
                    if let Some(qualified) = method_entry_qualified_name(runtime, me) {
                        return qualified;
                    }
                }
                format!("{}.", mod_to_s(runtime, attached))
            } else {
                format!("{}$singleton#", mod_to_s(runtime, real))
            }
        }
    };
    if iseq.is_block_or_eval() {
        name.push_str(&me.called_id);
    } else {
        name.push_str(&iseq.base_label);
    }
    name
}

/// Named ancestor of an anonymous defining class, `None` when the class
/// has a name of its own.
fn anonymous_defining_class<R: Runtime>(runtime: &R, me: &MethodEntry) -> Option<String> {
    let dc = normalize(runtime, me.defined_class?);
    if runtime.is_singleton(dc) || runtime.class_name(dc).is_some() {
        return None;
    }
    Some(anonymous_ancestor_name(runtime, dc))
}

/// `<classpath><# or .><original name>` of a method entry, `None` without a
/// defining class.
pub(crate) fn method_entry_qualified_name<R: Runtime>(
    runtime: &R,
    me: &MethodEntry,
) -> Option<String> {
    let dc = me.defined_class?;
    Some(format!(
        "{}{}{}",
        owner_name(runtime, dc),
        separator(runtime, dc),
        me.original_id
    ))
}

fn separator<R: Runtime>(runtime: &R, defined_class: ObjectId) -> &'static str {
    if runtime.is_singleton(defined_class) {
        "."
    } else {
        "#"
    }
}

// include classes stand for their module
fn normalize<R: Runtime>(runtime: &R, klass: ObjectId) -> ObjectId {
    if runtime.value_type(klass) == ValueType::IClass {
        runtime.included_module(klass).unwrap_or(klass)
    } else {
        klass
    }
}

/// Renders the class a method lives in. Singleton classes of classes and
/// modules render as the class or module itself.
fn owner_name<R: Runtime>(runtime: &R, defined_class: ObjectId) -> String {
    let klass = normalize(runtime, defined_class);
    if let Some(attached) = runtime.attached_object(klass) {
        if runtime.value_type(attached).is_class_like() {
            return mod_to_s(runtime, attached);
        }
    }
    mod_to_s(runtime, klass)
}

pub(crate) fn receiver_qualifier<R: Runtime>(runtime: &R, frame: &RawFrame) -> String {
    let wk = runtime.well_known();
    match frame.receiver.real_self() {
        Some(obj) if obj == wk.main => "Object$<main>#".to_string(),
        Some(obj) if obj == wk.frozen_core => "RubyVM::FrozenCore#".to_string(),
        Some(obj) => format!("{}.", mod_to_s(runtime, obj)),
        None => format!(
            "{}#",
            mod_to_s(runtime, frame.receiver.self_class(runtime))
        ),
    }
}

// {class exec}/{module exec}, then {block}; base label only as a last resort
fn exec_context_suffix<R: Runtime>(runtime: &R, frame: &RawFrame, iseq: &Iseq, out: &mut String) {
    let mut wrote = false;
    if let Some(obj) = frame.receiver.real_self() {
        match runtime.value_type(obj) {
            ValueType::Class => {
                out.push_str(CLASS_EXEC);
                wrote = true;
            }
            ValueType::Module => {
                out.push_str(MODULE_EXEC);
                wrote = true;
            }
            _ => {}
        }
    }
    if iseq.is_block_or_eval() {
        out.push_str(BLOCK_SUFFIX);
        wrote = true;
    }
    if !wrote {
        out.push_str(&iseq.base_label);
    }
}

pub(crate) fn refinement_name<R: Runtime>(runtime: &R, refinement: Refinement) -> String {
    format!(
        "{}$refinement@{}",
        mod_to_s(runtime, refinement.refined_class),
        mod_to_s(runtime, refinement.defined_at)
    )
}

/// Name of a class or module for display: its permanent name,
/// `<owner>$singleton` for singleton classes and `<ancestor>$anonymous` for
/// anonymous ones.
pub fn mod_to_s<R: Runtime>(runtime: &R, klass: ObjectId) -> String {
    let mut out = String::new();
    write_mod(runtime, klass, &mut out, 0);
    out
}

fn write_mod<R: Runtime>(runtime: &R, klass: ObjectId, out: &mut String, depth: usize) {
    if depth > MAX_NESTING {
        invariant_violation!(
            "singleton nesting of {} exceeds {}",
            runtime.inspect(klass),
            MAX_NESTING
        );
    }
    let klass = normalize(runtime, klass);
    if runtime.is_singleton(klass) {
        let mut owner = runtime.class_real(klass);
        let wk = runtime.well_known();
        if owner == wk.class || owner == wk.module {
            owner = match runtime.attached_object(klass) {
                Some(attached) => attached,
                None => owner,
            };
        }
        write_mod(runtime, owner, out, depth + 1);
        out.push_str("$singleton");
        return;
    }
    match runtime.class_name(klass) {
        Some(name) => out.push_str(&name),
        None => {
            out.push_str(&anonymous_ancestor_name(runtime, klass));
            out.push_str("$anonymous");
        }
    }
}

/// First named class above an anonymous class or module. For modules the
/// search starts at the module's class.
fn anonymous_ancestor_name<R: Runtime>(runtime: &R, klass: ObjectId) -> String {
    let mut current = klass;
    let mut steps = 0;
    while runtime.value_type(current) != ValueType::Class {
        current = runtime.class_of(current);
        steps += 1;
        if steps > MAX_NESTING {
            invariant_violation!("no class above {}", runtime.inspect(klass));
        }
    }
    if current != klass && !runtime.is_singleton(current) {
        if let Some(name) = runtime.class_name(current) {
            return name;
        }
    }
    loop {
        current = match runtime.superclass(current) {
            Some(superclass) => superclass,
            None => invariant_violation!("no named ancestor above {}", runtime.inspect(klass)),
        };
        if let Some(name) = runtime.class_name(current) {
            return name;
        }
    }
}

/// Compact name of a frame: a qualifier derived from the receiver and the
/// defining class, followed by the method name.
pub fn frame_name<R: Runtime>(runtime: &R, frame: &RawFrame) -> String {
    let wk = runtime.well_known();
    let me = frame.method_entry.as_deref();
    let defined_class = me.and_then(|me| me.defined_class);

    let mut name = match frame.receiver.real_self() {
        Some(obj) if obj == wk.main => "Object$<main>#".to_string(),
        Some(obj) if obj == wk.frozen_core => "RubyVM::FrozenCore#".to_string(),
        real_self => {
            let refinement = defined_class.and_then(|dc| runtime.refinement_of(runtime.class_of(dc)));
            match (refinement, real_self) {
                (Some(refinement), _) => format!("{}#", refinement_name(runtime, refinement)),
                (None, Some(obj)) => format!("{}.", mod_to_s(runtime, obj)),
                (None, None) => {
                    let target = defined_class.unwrap_or_else(|| frame.receiver.self_class(runtime));
                    format!("{}#", mod_to_s(runtime, target))
                }
            }
        }
    };

    match (me, frame.iseq.as_deref()) {
        (Some(me), iseq) => {
            name.push_str(&me.called_id);
            if iseq.map_or(false, Iseq::is_block_or_eval) {
                name.push_str(BLOCK_SUFFIX);
            }
        }
        (None, Some(iseq)) => exec_context_suffix(runtime, frame, iseq, &mut name),
        (None, None) => invariant_violation!("frame has neither a method entry nor a code object"),
    }
    name
}

/// Label of a frame: the code object's (base) label for interpreted frames,
/// the method's original name for native ones.
pub fn frame_label(frame: &RawFrame, base: bool) -> Option<String> {
    if frame.is_interpreted {
        frame.iseq.as_deref().map(|iseq| {
            if base {
                iseq.base_label.clone()
            } else {
                iseq.label.clone()
            }
        })
    } else {
        frame.method_entry.as_deref().map(|me| me.original_id.clone())
    }
}
