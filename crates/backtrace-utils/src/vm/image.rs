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

//! Serialized description of a runtime heap and its threads.
//!
//! Objects are referred to by string ids. The builtins are always
//! available under their names (`BasicObject`, `Object`, `Module`, `Class`,
//! `Kernel`, `Thread`, `RubyVM::FrozenCore`) plus `main` and `frozen-core`
//! for the two special receivers. `<id>$singleton` names the singleton class
//! of `<id>` and creates it on first use.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;

use super::{
    FrameMagic, Iseq, IseqType, MeCref, MethodKind, ObjectId, Runtime, ThreadStatus, ValueType,
    Vm, DUMMY_FRAME_COUNT,
};
use crate::error::{Error, Result};
use crate::frames::frame_method_entry;

const SINGLETON_SUFFIX: &str = "$singleton";

const CLASS: &[ValueType] = &[ValueType::Class];
const MODULE: &[ValueType] = &[ValueType::Module];
const CLASS_OR_MODULE: &[ValueType] = &[ValueType::Class, ValueType::Module];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VmImage {
    pub current_thread: Option<String>,
    pub modules: Vec<ModuleSpec>,
    pub classes: Vec<ClassSpec>,
    pub includes: Vec<IncludeSpec>,
    pub refinements: Vec<RefinementSpec>,
    pub objects: Vec<ObjectSpec>,
    pub iseqs: Vec<IseqSpec>,
    pub methods: Vec<MethodSpec>,
    pub threads: Vec<ThreadSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleSpec {
    pub id: String,
    // absent for `Module.new`
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassSpec {
    pub id: String,
    pub name: Option<String>,
    #[serde(default = "default_superclass")]
    pub superclass: String,
}

fn default_superclass() -> String {
    "Object".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IncludeSpec {
    pub class: String,
    pub module: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RefinementSpec {
    pub id: String,
    pub refines: String,
    pub defined_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectSpec {
    pub id: String,
    pub class: String,
    // give the object its own singleton class up front
    #[serde(default)]
    pub singleton: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IseqSpec {
    pub id: String,
    pub kind: IseqType,
    pub label: Option<String>,
    pub base_label: Option<String>,
    pub parent: Option<String>,
    pub path: Option<String>,
    pub absolute_path: Option<String>,
    #[serde(default = "default_first_lineno")]
    pub first_lineno: u32,
    pub size: Option<usize>,
    // (position, line) pairs
    #[serde(default)]
    pub lines: Vec<(usize, u32)>,
}

fn default_first_lineno() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MethodSpec {
    pub id: String,
    pub name: String,
    // differs from `name` for aliases
    pub original_name: Option<String>,
    pub owner: String,
    // class through whose ancestors a module method is reached
    pub via: Option<String>,
    #[serde(default = "default_method_kind")]
    pub kind: MethodKind,
}

fn default_method_kind() -> MethodKind {
    MethodKind::Iseq
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThreadSpec {
    pub id: String,
    pub class: Option<String>,
    #[serde(default = "default_status")]
    pub status: ThreadStatus,
    #[serde(default)]
    pub to_kill: bool,
    /// Oldest first, dummy frames excluded.
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

fn default_status() -> ThreadStatus {
    ThreadStatus::Runnable
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvSlot {
    Empty,
    Cref,
    // the method entry sits behind a special-variable slot
    Svar,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FrameSpec {
    pub magic: FrameMagic,
    pub iseq: Option<String>,
    pub pc: Option<usize>,
    #[serde(rename = "self")]
    pub self_value: String,
    pub method: Option<String>,
    pub slot: Option<EnvSlot>,
    /// Index of the older frame (in this list) whose environment encloses
    /// this one.
    pub outer: Option<usize>,
}

impl VmImage {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Reads an image, JSON for `.json` files and YAML otherwise.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        info!("loading vm image from {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn build(&self) -> Result<LoadedImage> {
        Builder::new().build(self)
    }
}

/// A runtime built from an image, with the ids it was described with.
#[derive(Debug)]
pub struct LoadedImage {
    pub vm: Vm,
    ids: HashMap<String, ObjectId>,
    thread_ids: Vec<(String, ObjectId)>,
}

impl LoadedImage {
    pub fn object(&self, id: &str) -> Option<ObjectId> {
        self.ids.get(id).copied()
    }

    /// Threads in image order.
    pub fn threads(&self) -> &[(String, ObjectId)] {
        &self.thread_ids
    }
}

struct Builder {
    vm: Vm,
    ids: HashMap<String, ObjectId>,
    iseqs: HashMap<String, Arc<Iseq>>,
    methods: HashMap<String, Arc<super::MethodEntry>>,
}

impl Builder {
    fn new() -> Self {
        let vm = Vm::new();
        let wk = *vm.well_known();
        let ids = [
            ("BasicObject", wk.basic_object),
            ("Object", wk.object),
            ("Module", wk.module),
            ("Class", wk.class),
            ("Kernel", wk.kernel),
            ("Thread", wk.thread),
            ("RubyVM::FrozenCore", vm.class_of(wk.frozen_core)),
            ("main", wk.main),
            ("frozen-core", wk.frozen_core),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Builder {
            vm,
            ids,
            iseqs: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    fn object(&mut self, id: &str) -> Result<ObjectId> {
        if let Some(obj) = self.ids.get(id) {
            return Ok(*obj);
        }
        match id.strip_suffix(SINGLETON_SUFFIX) {
            Some(base) if !base.is_empty() => {
                let base = self.object(base)?;
                let singleton = self.vm.singleton_class(base);
                self.ids.insert(id.to_string(), singleton);
                Ok(singleton)
            }
            _ => Err(Error::UnknownReference {
                kind: "object",
                id: id.to_string(),
            }),
        }
    }

    // like `object`, restricted to the value types `accepted`
    fn object_of(&mut self, id: &str, accepted: &[ValueType]) -> Result<ObjectId> {
        let obj = self.object(id)?;
        let value_type = self.vm.value_type(obj);
        if !accepted.contains(&value_type) {
            return Err(Error::Image(format!(
                "`{}` is a {:?}, expected one of {:?}",
                id, value_type, accepted
            )));
        }
        Ok(obj)
    }

    fn register(&mut self, id: &str, obj: ObjectId) -> Result<()> {
        if self.ids.insert(id.to_string(), obj).is_some() {
            return Err(Error::Image(format!("duplicate id `{}`", id)));
        }
        Ok(())
    }

    fn build(mut self, image: &VmImage) -> Result<LoadedImage> {
        for m in &image.modules {
            let module = match &m.name {
                Some(name) => self.vm.define_module(name),
                None => self.vm.define_anonymous_module(),
            };
            self.register(&m.id, module)?;
        }
        for c in &image.classes {
            let superclass = self.object_of(&c.superclass, CLASS)?;
            let class = match &c.name {
                Some(name) => self.vm.define_class(name, superclass),
                None => self.vm.define_anonymous_class(superclass),
            };
            self.register(&c.id, class)?;
        }
        for r in &image.refinements {
            let refined = self.object_of(&r.refines, CLASS_OR_MODULE)?;
            let defined_at = self.object_of(&r.defined_at, MODULE)?;
            let refinement = self.vm.refine(defined_at, refined);
            self.register(&r.id, refinement)?;
        }
        for i in &image.includes {
            let class = self.object_of(&i.class, CLASS_OR_MODULE)?;
            let module = self.object_of(&i.module, MODULE)?;
            self.vm.include_module(class, module);
        }
        for o in &image.objects {
            let class = self.object_of(&o.class, CLASS)?;
            let obj = self.vm.new_object(class);
            self.register(&o.id, obj)?;
            if o.singleton {
                self.object(&format!("{}{}", o.id, SINGLETON_SUFFIX))?;
            }
        }
        for spec in &image.iseqs {
            let iseq = self.iseq(spec)?;
            self.iseqs.insert(spec.id.clone(), Arc::new(iseq));
        }
        for spec in &image.methods {
            let owner = self.object_of(&spec.owner, CLASS_OR_MODULE)?;
            let mut me = match &spec.via {
                Some(via) => {
                    let includer = self.object_of(via, CLASS_OR_MODULE)?;
                    self.vm.define_method_via(owner, includer, &spec.name, spec.kind)?
                }
                None => self.vm.define_method(owner, &spec.name, spec.kind),
            };
            if let Some(original) = &spec.original_name {
                let entry = Arc::make_mut(&mut me);
                entry.original_id = original.clone();
            }
            self.methods.insert(spec.id.clone(), me);
        }
        let mut thread_ids = Vec::with_capacity(image.threads.len());
        for spec in &image.threads {
            let thread = self.thread(spec)?;
            thread_ids.push((spec.id.clone(), thread));
        }
        if let Some(current) = &image.current_thread {
            let thread = self.object(current)?;
            self.vm.set_current_thread(thread)?;
        } else if let Some((_, first)) = thread_ids.first() {
            self.vm.set_current_thread(*first)?;
        }
        debug!(
            "built vm image: {} ids, {} code objects, {} methods, {} threads",
            self.ids.len(),
            self.iseqs.len(),
            self.methods.len(),
            thread_ids.len()
        );
        Ok(LoadedImage {
            vm: self.vm,
            ids: self.ids,
            thread_ids,
        })
    }

    fn iseq(&self, spec: &IseqSpec) -> Result<Iseq> {
        let parent = match &spec.parent {
            Some(p) => Some(self.iseqs.get(p).ok_or_else(|| Error::UnknownReference {
                kind: "iseq",
                id: p.clone(),
            })?),
            None => None,
        };
        let path = spec.path.clone().unwrap_or_else(|| "-".to_string());
        let mut iseq = match (spec.kind, parent) {
            (IseqType::Block, Some(parent)) => Iseq::block_in(parent, spec.first_lineno),
            (IseqType::Eval, Some(parent)) => Iseq::eval_in(parent, spec.first_lineno),
            (IseqType::Method, _) => {
                let name = spec.label.as_deref().unwrap_or(&spec.id);
                Iseq::method(name, &path, spec.first_lineno)
            }
            (IseqType::Top | IseqType::Main, _) => {
                let mut top = Iseq::top(&path);
                top.kind = spec.kind;
                top.first_lineno = spec.first_lineno;
                top
            }
            (kind, parent) => {
                let label = spec.label.clone().unwrap_or_else(|| spec.id.clone());
                Iseq {
                    kind,
                    base_label: label.clone(),
                    label,
                    path: Some(path.clone()),
                    absolute_path: Some(path.clone()),
                    first_lineno: spec.first_lineno,
                    method_name: parent.and_then(|p| p.method_name.clone()),
                    size: 64,
                    line_table: Vec::new(),
                }
            }
        };
        if let Some(label) = &spec.label {
            iseq.label = label.clone();
        }
        if let Some(base_label) = &spec.base_label {
            iseq.base_label = base_label.clone();
        }
        if spec.path.is_some() {
            iseq.path = spec.path.clone();
            iseq.absolute_path = spec.path.clone();
        }
        if let Some(absolute_path) = &spec.absolute_path {
            iseq = iseq.with_absolute_path(Some(absolute_path));
        }
        if let Some(size) = spec.size {
            iseq.size = size;
        }
        if !spec.lines.is_empty() {
            iseq = iseq.with_lines(&spec.lines);
        } else if iseq.line_table.is_empty() {
            iseq = iseq.with_lines(&[(0, spec.first_lineno)]);
        }
        Ok(iseq)
    }

    fn thread(&mut self, spec: &ThreadSpec) -> Result<ObjectId> {
        let thread = match &spec.class {
            Some(class) => {
                let class = self.object_of(class, CLASS)?;
                self.vm.new_thread_of(class)
            }
            None => self.vm.new_thread(),
        };
        self.register(&spec.id, thread)?;
        let Some(handle) = self.vm.thread(thread).cloned() else {
            return Err(Error::Image(format!("`{}` is not a thread", spec.id)));
        };
        {
            let mut ec = handle.execution_context_mut();
            let mut eps = Vec::with_capacity(spec.frames.len());
            for (index, frame) in spec.frames.iter().enumerate() {
                let iseq = match &frame.iseq {
                    Some(id) => Some(self.iseqs.get(id).cloned().ok_or_else(|| {
                        Error::UnknownReference {
                            kind: "iseq",
                            id: id.clone(),
                        }
                    })?),
                    None => None,
                };
                let method = match &frame.method {
                    Some(id) => Some(self.methods.get(id).cloned().ok_or_else(|| {
                        Error::UnknownReference {
                            kind: "method",
                            id: id.clone(),
                        }
                    })?),
                    None => None,
                };
                let prev = match frame.outer {
                    Some(outer) if outer < index => Some(eps[outer]),
                    Some(outer) => {
                        return Err(Error::Image(format!(
                            "frame {} of thread `{}` encloses itself in frame {}",
                            index, spec.id, outer
                        )))
                    }
                    None => None,
                };
                let me_cref = match (method, frame.slot.unwrap_or(EnvSlot::Empty)) {
                    (Some(me), EnvSlot::Svar) => MeCref::Svar(Box::new(MeCref::Method(me))),
                    (Some(me), _) => MeCref::Method(me),
                    (None, EnvSlot::Cref) => MeCref::Cref,
                    (None, _) => MeCref::Empty,
                };
                if !frame.magic.is_cframe() && iseq.is_none() {
                    return Err(Error::Image(format!(
                        "frame {} of thread `{}` is a {:?} frame without a code object",
                        index, spec.id, frame.magic
                    )));
                }
                if let (Some(iseq), Some(pc)) = (&iseq, frame.pc) {
                    if pc > iseq.size {
                        return Err(Error::Image(format!(
                            "frame {} of thread `{}`: pc {} is past the end of `{}` ({} instructions)",
                            index, spec.id, pc, iseq.label, iseq.size
                        )));
                    }
                }
                let self_value = self.object(&frame.self_value)?;
                let ep = ec.push(frame.magic, iseq, frame.pc, self_value, me_cref, prev);
                eps.push(ep);
            }
            // entries may be inherited from an outer environment
            for (index, cfp) in ec.frames()[DUMMY_FRAME_COUNT..].iter().enumerate() {
                if cfp.magic.is_cframe() {
                    continue;
                }
                if let Some(me) = frame_method_entry(&*ec, cfp) {
                    if me.kind.is_uncallable() {
                        return Err(Error::Image(format!(
                            "frame {} of thread `{}` runs {:?} method `{}`",
                            index, spec.id, me.kind, me.called_id
                        )));
                    }
                }
            }
        }
        handle.set_status(spec.status);
        if spec.to_kill {
            handle.request_kill();
        }
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::ValueType;

    const IMAGE: &str = r#"
modules:
  - { id: Helpers, name: Helpers }
classes:
  - { id: Foo, name: Foo }
  - { id: Anon, superclass: Foo }
includes:
  - { class: Foo, module: Helpers }
objects:
  - { id: foo, class: Foo }
iseqs:
  - { id: top, kind: top, path: /app/main.rb }
  - { id: run, kind: method, label: run, path: /app/foo.rb, first-lineno: 3, lines: [[0, 3], [2, 4]] }
  - { id: run-block, kind: block, parent: run, first-lineno: 4 }
methods:
  - { id: run, name: run, owner: Foo }
  - { id: help, name: help, owner: Helpers, via: Foo }
threads:
  - id: t1
    frames:
      - { magic: top, iseq: top, pc: 1, self: main, slot: cref }
      - { magic: method, iseq: run, pc: 2, self: foo, method: run }
      - { magic: block, iseq: run-block, pc: 1, self: foo, outer: 1 }
  - { id: dead, status: killed }
"#;

    #[test]
    fn builds_heap_and_threads() {
        let image = VmImage::from_yaml(IMAGE).unwrap().build().unwrap();
        let vm = &image.vm;
        let foo = image.object("Foo").unwrap();
        let anon = image.object("Anon").unwrap();
        assert_eq!(vm.class_name(foo).as_deref(), Some("Foo"));
        assert_eq!(vm.class_name(anon), None);
        assert_eq!(vm.superclass(anon), Some(foo));
        assert_eq!(vm.value_type(image.object("Helpers").unwrap()), ValueType::Module);

        let (_, t1) = image.threads()[0];
        assert_eq!(vm.current_thread(), t1);
        let depth = vm.with_execution_context(t1, |ec| ec.depth()).unwrap();
        assert_eq!(depth, Some(3));
        let (_, dead) = image.threads()[1];
        assert_eq!(vm.with_execution_context(dead, |ec| ec.depth()).unwrap(), None);
    }

    #[test]
    fn block_iseq_derives_labels_from_parent() {
        let image = VmImage::from_yaml(IMAGE).unwrap();
        let built = image.build().unwrap();
        let (_, t1) = built.threads()[0];
        let labels = built
            .vm
            .with_execution_context(t1, |ec| {
                ec.frames()
                    .iter()
                    .filter_map(|f| f.iseq.as_ref().map(|i| i.label.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap()
            .unwrap();
        assert_eq!(labels, vec!["<main>", "run", "block in run"]);
    }

    #[test]
    fn unknown_references_are_reported() {
        let image = VmImage::from_yaml("classes:\n  - { id: Bar, superclass: Missing }\n").unwrap();
        match image.build() {
            Err(Error::UnknownReference { kind, id }) => {
                assert_eq!(kind, "object");
                assert_eq!(id, "Missing");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_image_is_a_bare_vm() {
        let built = VmImage::from_yaml("").unwrap().build().unwrap();
        let vm = &built.vm;
        assert_eq!(vm.with_execution_context(vm.current_thread(), |ec| ec.depth()).unwrap(), Some(0));
    }

    fn build_error(yaml: &str) -> String {
        match VmImage::from_yaml(yaml).unwrap().build() {
            Err(Error::Image(message)) => message,
            other => panic!("expected an image error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn interpreted_frame_needs_a_code_object() {
        let message = build_error(
            "threads:\n  - id: t\n    frames:\n      - { magic: method, self: main }\n",
        );
        assert!(message.contains("without a code object"), "{}", message);
    }

    #[test]
    fn pc_must_stay_inside_the_code_object() {
        let message = build_error(
            "iseqs:\n  - { id: run, kind: method, size: 4 }\n\
             threads:\n  - id: t\n    frames:\n      - { magic: method, iseq: run, pc: 99, self: main }\n",
        );
        assert!(message.contains("pc 99"), "{}", message);

        let at_end = "iseqs:\n  - { id: run, kind: method, size: 4 }\n\
                      threads:\n  - id: t\n    frames:\n      - { magic: method, iseq: run, pc: 4, self: main }\n";
        assert!(VmImage::from_yaml(at_end).unwrap().build().is_ok());
    }

    #[test]
    fn uncallable_methods_cannot_run_interpreted_code() {
        let own = build_error(
            "iseqs:\n  - { id: run, kind: method }\n\
             methods:\n  - { id: gone, name: gone, owner: Object, kind: undef }\n\
             threads:\n  - id: t\n    frames:\n      - { magic: method, iseq: run, pc: 1, self: main, method: gone }\n",
        );
        assert!(own.contains("Undef"), "{}", own);

        let inherited = build_error(
            "iseqs:\n  - { id: run, kind: method }\n  - { id: run-block, kind: block, parent: run }\n\
             methods:\n  - { id: todo, name: todo, owner: Object, kind: not_implemented }\n\
             threads:\n  - id: t\n    frames:\n\
             \x20     - { magic: cfunc, self: main, method: todo }\n\
             \x20     - { magic: block, iseq: run-block, pc: 1, self: main, outer: 0 }\n",
        );
        assert!(inherited.contains("frame 1"), "{}", inherited);
    }

    #[test]
    fn references_must_have_the_right_kind() {
        let message = build_error(
            "classes:\n  - { id: Bar, superclass: Kernel }\n",
        );
        assert!(message.contains("`Kernel`"), "{}", message);
        let message = build_error("includes:\n  - { class: Object, module: Thread }\n");
        assert!(message.contains("`Thread`"), "{}", message);
    }

    #[test]
    fn absolute_path_overrides_path() {
        let built = VmImage::from_yaml(
            "iseqs:\n  - { id: run, kind: method, path: lib/x.rb, absolute-path: /app/lib/x.rb }\n\
             threads:\n  - id: t\n    frames:\n      - { magic: method, iseq: run, pc: 1, self: main }\n",
        )
        .unwrap()
        .build()
        .unwrap();
        let (_, t) = built.threads()[0];
        let paths = built
            .vm
            .with_execution_context(t, |ec| {
                let iseq = ec.frames()[DUMMY_FRAME_COUNT].iseq.clone().unwrap();
                (iseq.path.clone(), iseq.absolute_path.clone())
            })
            .unwrap()
            .unwrap();
        assert_eq!(
            paths,
            (Some("lib/x.rb".to_string()), Some("/app/lib/x.rb".to_string()))
        );
    }

    #[test]
    fn json_images() {
        let image = VmImage::from_json(r#"{"classes": [{"id": "Foo", "name": "Foo"}]}"#).unwrap();
        assert!(image.build().unwrap().object("Foo").is_some());
    }
}
