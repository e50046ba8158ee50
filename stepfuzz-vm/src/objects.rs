//! Object model and the per-request object store.

use crate::opcode::{ClassDecl, OpArray};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

pub type ObjectRef = Rc<Object>;

pub struct Object {
    id: u64,
    class: Rc<ClassDecl>,
    props: RefCell<Vec<(Rc<str>, Value)>>,
    destructed: Cell<bool>,
}

impl Object {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> &Rc<ClassDecl> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn get(&self, name: &str) -> Value {
        self.props
            .borrow()
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }

    pub fn set(&self, name: Rc<str>, value: Value) {
        let old = {
            let mut props = self.props.borrow_mut();
            match props.iter_mut().find(|(k, _)| **k == *name) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, value)),
                None => {
                    props.push((name, value));
                    None
                }
            }
        };
        drop(old);
    }

    pub fn is_destructed(&self) -> bool {
        self.destructed.get()
    }

    pub fn mark_destructed(&self) {
        self.destructed.set(true);
    }

    fn clear_props(&self) {
        let props = std::mem::take(&mut *self.props.borrow_mut());
        drop(props);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object(#{} {})", self.id, self.class.name)
    }
}

/// Outcome of releasing a request's objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Objects the store held at release time.
    pub released: usize,
    /// Objects still alive once the store let go of them.
    pub leaked: usize,
}

/// Every object created during a request, in creation order.
///
/// The store keeps a strong reference to each object until the request is released, so
/// destructors can be run at shutdown regardless of how the request ended. With tracked release,
/// property tables are cleared first, which reclaims reference cycles that the abandoned frames
/// would otherwise have kept alive.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: Vec<ObjectRef>,
    next_id: u64,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, class: Rc<ClassDecl>) -> ObjectRef {
        self.next_id += 1;
        let object = Rc::new(Object {
            id: self.next_id,
            class,
            props: RefCell::new(Vec::new()),
            destructed: Cell::new(false),
        });
        self.objects.push(object.clone());
        object
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The oldest object whose destructor has not run yet.
    pub fn next_pending_destructor(&self) -> Option<(ObjectRef, Rc<OpArray>)> {
        self.objects
            .iter()
            .filter(|o| !o.is_destructed())
            .find_map(|o| o.class.destructor().map(|d| (o.clone(), d.clone())))
    }

    pub fn mark_all_destructed(&self) {
        for object in &self.objects {
            object.mark_destructed();
        }
    }

    pub fn release(&mut self, tracked: bool) -> ReleaseReport {
        let objects = std::mem::take(&mut self.objects);
        let released = objects.len();
        let weak: Vec<Weak<Object>> = objects.iter().map(Rc::downgrade).collect();
        if tracked {
            for object in &objects {
                object.clear_props();
            }
        }
        drop(objects);
        let leaked = weak.iter().filter(|w| w.strong_count() > 0).count();
        ReleaseReport { released, leaked }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> Rc<ClassDecl> {
        Rc::new(ClassDecl {
            name: name.into(),
            methods: Vec::new(),
        })
    }

    #[test]
    fn props_overwrite_in_place() {
        let mut store = ObjectStore::new();
        let o = store.create(class("Point"));
        o.set("x".into(), Value::Int(1));
        o.set("x".into(), Value::Int(2));
        assert_eq!(o.get("x").to_int(), 2);
        assert!(matches!(o.get("missing"), Value::Null));
    }

    #[test]
    fn tracked_release_reclaims_cycles() {
        let mut store = ObjectStore::new();
        let a = store.create(class("Node"));
        let b = store.create(class("Node"));
        a.set("next".into(), Value::Object(b.clone()));
        b.set("next".into(), Value::Object(a.clone()));
        drop((a, b));
        let report = store.release(true);
        assert_eq!(report, ReleaseReport { released: 2, leaked: 0 });
    }

    #[test]
    fn untracked_release_leaks_cycles() {
        let mut store = ObjectStore::new();
        let a = store.create(class("Node"));
        a.set("me".into(), Value::Object(a.clone()));
        drop(a);
        let report = store.release(false);
        assert_eq!(report.leaked, 1);
    }
}
