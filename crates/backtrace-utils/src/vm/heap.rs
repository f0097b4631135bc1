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

use log::debug;

use super::object::{ClassBody, ObjectBody, RObject};
use super::{
    ExecutionContext, MethodEntry, MethodKind, ObjectId, Refinement, RubyThread, Runtime,
    ValueType, WellKnown,
};
use crate::error::{Error, Result};

/// In-memory runtime: an arena of objects addressed by [`ObjectId`].
///
/// Classes are created with their metaclass, so every class object has a
/// singleton class like it does in the interpreter.
#[derive(Debug)]
pub struct Vm {
    objects: Vec<RObject>,
    well_known: WellKnown,
    current_thread: ObjectId,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Vm {
            objects: Vec::new(),
            well_known: WellKnown {
                main: ObjectId(0),
                frozen_core: ObjectId(0),
                basic_object: ObjectId(0),
                object: ObjectId(0),
                module: ObjectId(0),
                class: ObjectId(0),
                kernel: ObjectId(0),
                thread: ObjectId(0),
            },
            current_thread: ObjectId(0),
        };
        vm.bootstrap();
        vm
    }

    fn bootstrap(&mut self) {
        let basic_object = self.alloc_class(Some("BasicObject"), None);
        let object = self.alloc_class(Some("Object"), Some(basic_object));
        let module = self.alloc_class(Some("Module"), Some(object));
        let class = self.alloc_class(Some("Class"), Some(module));
        self.well_known.basic_object = basic_object;
        self.well_known.object = object;
        self.well_known.module = module;
        self.well_known.class = class;

        // metaclasses mirror the class hierarchy and end at Class
        let mut meta_super = class;
        for klass in [basic_object, object, module, class] {
            let meta = self.alloc(
                Some(class),
                ObjectBody::Class(ClassBody {
                    superclass: Some(meta_super),
                    attached: Some(klass),
                    ..Default::default()
                }),
            );
            self.objects[klass.index()].klass = Some(meta);
            meta_super = meta;
        }

        let kernel = self.define_module("Kernel");
        self.include_module(object, kernel);
        self.well_known.kernel = kernel;
        self.well_known.thread = self.define_class("Thread", object);

        let main = self.new_object(object);
        self.singleton_class(main);
        self.well_known.main = main;

        let frozen_core_class = self.define_class("RubyVM::FrozenCore", basic_object);
        self.well_known.frozen_core = self.new_object(frozen_core_class);

        self.current_thread = self.new_thread();
    }

    fn alloc(&mut self, klass: Option<ObjectId>, body: ObjectBody) -> ObjectId {
        self.objects.push(RObject { klass, body });
        ObjectId((self.objects.len() - 1) as u32)
    }

    fn alloc_class(&mut self, name: Option<&str>, superclass: Option<ObjectId>) -> ObjectId {
        self.alloc(
            None,
            ObjectBody::Class(ClassBody {
                name: name.map(str::to_string),
                superclass,
                ..Default::default()
            }),
        )
    }

    fn get(&self, obj: ObjectId) -> &RObject {
        match self.objects.get(obj.index()) {
            Some(o) => o,
            None => invariant_violation!("object {} is not in the vm arena", obj),
        }
    }

    fn get_mut(&mut self, obj: ObjectId) -> &mut RObject {
        match self.objects.get_mut(obj.index()) {
            Some(o) => o,
            None => invariant_violation!("object {} is not in the vm arena", obj),
        }
    }

    pub fn contains(&self, obj: ObjectId) -> bool {
        obj.index() < self.objects.len()
    }

    fn new_class(&mut self, name: Option<&str>, superclass: ObjectId) -> ObjectId {
        let klass = self.alloc_class(name, Some(superclass));
        // the metaclass inherits from the superclass's metaclass
        let super_meta = self.class_of(superclass);
        let meta_super = if self.is_singleton(super_meta) {
            super_meta
        } else {
            self.well_known.class
        };
        let meta = self.alloc(
            Some(self.well_known.class),
            ObjectBody::Class(ClassBody {
                superclass: Some(meta_super),
                attached: Some(klass),
                ..Default::default()
            }),
        );
        self.get_mut(klass).klass = Some(meta);
        klass
    }

    pub fn define_class(&mut self, name: &str, superclass: ObjectId) -> ObjectId {
        self.new_class(Some(name), superclass)
    }

    /// `Class.new(superclass)`
    pub fn define_anonymous_class(&mut self, superclass: ObjectId) -> ObjectId {
        self.new_class(None, superclass)
    }

    fn new_module(&mut self, name: Option<&str>) -> ObjectId {
        self.alloc(
            Some(self.well_known.module),
            ObjectBody::Module(ClassBody {
                name: name.map(str::to_string),
                ..Default::default()
            }),
        )
    }

    pub fn define_module(&mut self, name: &str) -> ObjectId {
        self.new_module(Some(name))
    }

    /// `Module.new`
    pub fn define_anonymous_module(&mut self) -> ObjectId {
        self.new_module(None)
    }

    /// Names a previously anonymous class or module, like assigning it to a
    /// constant.
    pub fn set_name(&mut self, klass: ObjectId, name: &str) {
        if let Some(body) = self.get_mut(klass).class_body_mut() {
            body.name = Some(name.to_string());
        }
    }

    /// Inserts an include class for `module` right above `klass` and
    /// returns it.
    pub fn include_module(&mut self, klass: ObjectId, module: ObjectId) -> ObjectId {
        let superclass = self.get(klass).raw_superclass();
        let iclass = self.alloc(Some(module), ObjectBody::IClass { module, superclass });
        if let Some(body) = self.get_mut(klass).class_body_mut() {
            body.superclass = Some(iclass);
        }
        iclass
    }

    /// Returns the singleton class of `obj`, creating it if needed.
    pub fn singleton_class(&mut self, obj: ObjectId) -> ObjectId {
        let klass = self.class_of(obj);
        if self.attached_object(klass) == Some(obj) {
            return klass;
        }
        let singleton = self.alloc(
            Some(self.well_known.class),
            ObjectBody::Class(ClassBody {
                superclass: Some(klass),
                attached: Some(obj),
                ..Default::default()
            }),
        );
        self.get_mut(obj).klass = Some(singleton);
        singleton
    }

    pub fn new_object(&mut self, klass: ObjectId) -> ObjectId {
        self.alloc(Some(klass), ObjectBody::Plain)
    }

    /// `refine refined_class do ... end` inside `defined_at`. Returns the
    /// refinement module.
    pub fn refine(&mut self, defined_at: ObjectId, refined_class: ObjectId) -> ObjectId {
        let refinement = self.alloc(
            Some(self.well_known.module),
            ObjectBody::Module(ClassBody {
                refinement: Some(Refinement {
                    refined_class,
                    defined_at,
                }),
                ..Default::default()
            }),
        );
        let activation = self.alloc(
            Some(refinement),
            ObjectBody::IClass {
                module: refinement,
                superclass: Some(refined_class),
            },
        );
        if let Some(body) = self.get_mut(refinement).class_body_mut() {
            body.activation = Some(activation);
        }
        refinement
    }

    /// Defines `name` on `owner` and returns its method entry. Methods of a
    /// refinement are dispatched through its activation include class.
    pub fn define_method(&self, owner: ObjectId, name: &str, kind: MethodKind) -> Arc<MethodEntry> {
        let defined_class = self
            .get(owner)
            .class_body()
            .and_then(|b| b.activation)
            .unwrap_or(owner);
        Arc::new(MethodEntry::new(name, owner, defined_class, kind))
    }

    /// Entry for `name` of `module` as found through the ancestors of
    /// `includer`, that is with the include class as defining class.
    pub fn define_method_via(
        &self,
        module: ObjectId,
        includer: ObjectId,
        name: &str,
        kind: MethodKind,
    ) -> Result<Arc<MethodEntry>> {
        let mut cursor = self.get(includer).raw_superclass();
        while let Some(klass) = cursor {
            if let ObjectBody::IClass { module: m, .. } = self.get(klass).body {
                if m == module {
                    return Ok(Arc::new(MethodEntry::new(name, module, klass, kind)));
                }
            }
            cursor = self.get(klass).raw_superclass();
        }
        Err(Error::InvalidTarget(format!(
            "{} does not include {}",
            self.inspect(includer),
            self.inspect(module)
        )))
    }

    pub fn new_thread(&mut self) -> ObjectId {
        self.new_thread_of(self.well_known.thread)
    }

    /// A thread whose class is `klass`, a subclass of Thread.
    pub fn new_thread_of(&mut self, klass: ObjectId) -> ObjectId {
        let thread = Arc::new(RubyThread::new(self.well_known.main));
        let id = self.alloc(Some(klass), ObjectBody::Thread(thread));
        debug!("created thread {} of class {}", id, self.inspect(klass));
        id
    }

    pub fn thread(&self, id: ObjectId) -> Option<&Arc<RubyThread>> {
        match &self.objects.get(id.index())?.body {
            ObjectBody::Thread(t) => Some(t),
            _ => None,
        }
    }

    /// Every thread object, in creation order.
    pub fn threads(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o.body, ObjectBody::Thread(_)))
            .map(|(i, _)| ObjectId(i as u32))
            .collect()
    }

    pub fn set_current_thread(&mut self, thread: ObjectId) -> Result<()> {
        if self.thread(thread).is_none() {
            return Err(Error::InvalidTarget(format!("{} is not a thread", thread)));
        }
        self.current_thread = thread;
        Ok(())
    }
}

impl Runtime for Vm {
    fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    fn current_thread(&self) -> ObjectId {
        self.current_thread
    }

    fn with_execution_context<T, F>(&self, thread: ObjectId, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&ExecutionContext) -> T,
    {
        let Some(target) = self.thread(thread) else {
            return Err(Error::InvalidTarget(format!(
                "{} is not a thread",
                if self.contains(thread) {
                    self.inspect(thread)
                } else {
                    thread.to_string()
                }
            )));
        };
        if !target.is_alive() {
            return Ok(None);
        }
        let ec = target.pause();
        Ok(Some(f(&*ec)))
    }

    fn value_type(&self, obj: ObjectId) -> ValueType {
        self.get(obj).value_type()
    }

    fn class_of(&self, obj: ObjectId) -> ObjectId {
        match self.get(obj).klass {
            Some(k) => k,
            None => invariant_violation!("object {} has no class", obj),
        }
    }

    fn superclass(&self, klass: ObjectId) -> Option<ObjectId> {
        let mut cursor = self.get(klass).raw_superclass();
        while let Some(k) = cursor {
            if self.value_type(k) != ValueType::IClass {
                return Some(k);
            }
            cursor = self.get(k).raw_superclass();
        }
        None
    }

    fn is_singleton(&self, klass: ObjectId) -> bool {
        self.attached_object(klass).is_some()
    }

    fn attached_object(&self, klass: ObjectId) -> Option<ObjectId> {
        self.get(klass).class_body().and_then(|b| b.attached)
    }

    fn class_name(&self, klass: ObjectId) -> Option<String> {
        self.get(klass).class_body().and_then(|b| b.name.clone())
    }

    fn refinement_of(&self, module: ObjectId) -> Option<Refinement> {
        self.get(module).class_body().and_then(|b| b.refinement)
    }

    fn included_module(&self, iclass: ObjectId) -> Option<ObjectId> {
        match self.get(iclass).body {
            ObjectBody::IClass { module, .. } => Some(module),
            _ => None,
        }
    }

    fn inspect(&self, obj: ObjectId) -> String {
        if obj == self.well_known.main {
            return "main".to_string();
        }
        let o = self.get(obj);
        match &o.body {
            ObjectBody::Class(b) | ObjectBody::Module(b) => match (&b.name, b.attached) {
                (Some(name), _) => name.clone(),
                (None, Some(attached)) => format!("#<Class:{}>", self.inspect(attached)),
                (None, None) if o.value_type() == ValueType::Module => {
                    format!("#<Module:{}>", obj)
                }
                (None, None) => format!("#<Class:{}>", obj),
            },
            ObjectBody::IClass { module, .. } => {
                format!("#<IClass:{}>", self.inspect(*module))
            }
            ObjectBody::Thread(t) => format!("#<Thread:{} {:?}>", obj, t.status()),
            ObjectBody::Plain => {
                let klass = self.class_real(self.class_of(obj));
                format!("#<{}:{}>", self.inspect(klass), obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metaclasses_follow_class_hierarchy() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        let foo = vm.define_class("Foo", wk.object);
        let meta = vm.class_of(foo);
        assert!(vm.is_singleton(meta));
        assert_eq!(vm.attached_object(meta), Some(foo));
        assert_eq!(vm.superclass(meta), Some(vm.class_of(wk.object)));
        assert_eq!(vm.class_real(meta), wk.class);
    }

    #[test]
    fn superclass_skips_include_classes() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        // Object includes Kernel
        assert_eq!(vm.superclass(wk.object), Some(wk.basic_object));
        let m = vm.define_module("Helpers");
        let foo = vm.define_class("Foo", wk.object);
        let iclass = vm.include_module(foo, m);
        assert_eq!(vm.included_module(iclass), Some(m));
        assert_eq!(vm.superclass(foo), Some(wk.object));
        assert_eq!(vm.class_real(iclass), wk.object);
    }

    #[test]
    fn singleton_class_is_created_once() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        let obj = vm.new_object(wk.object);
        let s1 = vm.singleton_class(obj);
        let s2 = vm.singleton_class(obj);
        assert_eq!(s1, s2);
        assert_eq!(vm.class_of(obj), s1);
        assert_eq!(vm.class_real(s1), wk.object);
        assert_eq!(vm.inspect(s1), format!("#<Class:#<Object:{}>>", obj));
    }

    #[test]
    fn refined_methods_dispatch_through_activation() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        let integer = vm.define_class("Integer", wk.object);
        let the_refinement = vm.define_module("TheRefinement");
        let r = vm.refine(the_refinement, integer);
        let me = vm.define_method(r, "test_method", MethodKind::Iseq);
        let dc = me.defined_class.unwrap();
        assert_eq!(vm.value_type(dc), ValueType::IClass);
        assert_eq!(vm.class_of(dc), r);
        assert_eq!(
            vm.refinement_of(r),
            Some(Refinement {
                refined_class: integer,
                defined_at: the_refinement
            })
        );
    }

    #[test]
    fn thread_targets() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        let sub = vm.define_class("WorkerThread", wk.thread);
        let t = vm.new_thread_of(sub);
        assert_eq!(vm.with_execution_context(t, |ec| ec.depth()).unwrap(), Some(0));

        let not_a_thread = vm.new_object(wk.object);
        assert!(matches!(
            vm.with_execution_context(not_a_thread, |_| ()),
            Err(Error::InvalidTarget(_))
        ));

        vm.thread(t).unwrap().request_kill();
        assert_eq!(vm.with_execution_context(t, |ec| ec.depth()).unwrap(), None);
    }

    #[test]
    fn method_via_include_class() {
        let mut vm = Vm::new();
        let wk = *vm.well_known();
        let m = vm.define_module("Greeter");
        let foo = vm.define_class("Foo", wk.object);
        let iclass = vm.include_module(foo, m);
        let me = vm.define_method_via(m, foo, "hi", MethodKind::Iseq).unwrap();
        assert_eq!(me.defined_class, Some(iclass));
        assert_eq!(me.owner, m);
        let bar = vm.define_class("Bar", wk.object);
        assert!(vm.define_method_via(m, bar, "hi", MethodKind::Iseq).is_err());
    }
}
