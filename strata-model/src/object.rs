//! Model objects, their identities and the handles the graph is built from.
//!
//! Every node of the persisted graph lives behind an [`ObjectRef`]:
//!
//! ```text
//! ┌───────────────── ObjectRef (Rc) ─────────────────┐
//! │ id: ObjectId          stable identity             │
//! │ descriptor            runtime type, resolved once │
//! │ owner: Weak           None for root pages         │
//! │ object: RefCell<Box<dyn ModelObject>>             │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Owned children are held as `ObjectRef` fields of their owner, so the
//! ownership tree is the tree of strong handles. Back-references are plain
//! [`ObjectId`] keys resolved through an [`ObjectIndex`].
//!
//! The graph is single-threaded: handles are `Rc`, and every borrow goes
//! through `read`/`write`, which report [`ModelError::Busy`] instead of
//! panicking when an object is already mutably borrowed.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::TypeDescriptor;
use crate::error::{ModelError, Result};
use crate::index::ObjectIndex;

/// Stable identity of a model object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

/// A concrete model type. `Default` is the zero-argument constructor used
/// when a document or the undo log needs a fresh instance.
pub trait Model: Default + 'static {
    /// The cached descriptor of this type. Implementations keep it in a
    /// `OnceLock` so it is built once per process.
    fn type_descriptor() -> &'static TypeDescriptor;

    /// Second-phase hook, called after a whole document has been loaded
    /// and every back-reference in it is known to resolve.
    fn after_load(&mut self, _index: &ObjectIndex) -> Result<()> {
        Ok(())
    }
}

/// Object-safe view of a [`Model`]; implemented for every model type.
pub trait ModelObject: Any {
    /// The descriptor of the runtime type of this object.
    fn descriptor(&self) -> &'static TypeDescriptor;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn after_load(&mut self, index: &ObjectIndex) -> Result<()>;
}

impl<T: Model> ModelObject for T {
    fn descriptor(&self) -> &'static TypeDescriptor {
        T::type_descriptor()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn after_load(&mut self, index: &ObjectIndex) -> Result<()> {
        Model::after_load(self, index)
    }
}

pub(crate) struct ModelNode {
    id: Cell<ObjectId>,
    descriptor: &'static TypeDescriptor,
    owner: RefCell<Weak<ModelNode>>,
    object: RefCell<Box<dyn ModelObject>>,
}

/// Shared handle to one model object.
///
/// Cloning the handle does not clone the object; equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<ModelNode>);

impl ObjectRef {
    /// Wrap a root-level object (no owner).
    pub fn new<T: Model>(value: T) -> Self {
        Self::from_boxed(Box::new(value), None)
    }

    /// Wrap an object owned by `owner`.
    pub fn with_owner<T: Model>(value: T, owner: &ObjectRef) -> Self {
        Self::from_boxed(Box::new(value), Some(owner))
    }

    pub fn from_boxed(object: Box<dyn ModelObject>, owner: Option<&ObjectRef>) -> Self {
        let descriptor = object.descriptor();
        let node = ModelNode {
            id: Cell::new(ObjectId::new()),
            descriptor,
            owner: RefCell::new(owner.map(|o| Rc::downgrade(&o.0)).unwrap_or_default()),
            object: RefCell::new(object),
        };
        let this = ObjectRef(Rc::new(node));
        this.adopt_children();
        this
    }

    /// Children created by a constructor don't know their owner yet.
    fn adopt_children(&self) {
        let children = match self.read() {
            Ok(object) => self.0.descriptor.owned_children(&*object),
            Err(_) => return,
        };
        if let Ok(children) = children {
            for child in children {
                child.set_owner(Some(self));
            }
        }
    }

    pub fn id(&self) -> ObjectId {
        self.0.id.get()
    }

    pub(crate) fn set_id(&self, id: ObjectId) {
        self.0.id.set(id);
    }

    pub fn owner(&self) -> Option<ObjectRef> {
        self.0.owner.borrow().upgrade().map(ObjectRef)
    }

    pub(crate) fn set_owner(&self, owner: Option<&ObjectRef>) {
        *self.0.owner.borrow_mut() = owner.map(|o| Rc::downgrade(&o.0)).unwrap_or_default();
    }

    pub fn is_root(&self) -> bool {
        self.owner().is_none()
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.0.descriptor
    }

    pub fn type_name(&self) -> &'static str {
        self.0.descriptor.name()
    }

    pub fn is<T: Model>(&self) -> bool {
        self.0.descriptor.type_id() == TypeId::of::<T>()
    }

    pub fn read(&self) -> Result<Ref<'_, dyn ModelObject + 'static>> {
        self.0
            .object
            .try_borrow()
            .map(|object| Ref::map(object, |boxed| &**boxed))
            .map_err(|_| ModelError::Busy(self.id()))
    }

    pub fn write(&self) -> Result<RefMut<'_, dyn ModelObject + 'static>> {
        self.0
            .object
            .try_borrow_mut()
            .map(|object| RefMut::map(object, |boxed| &mut **boxed))
            .map_err(|_| ModelError::Busy(self.id()))
    }

    pub fn read_as<T: Model>(&self) -> Result<Ref<'_, T>> {
        let found = self.type_name();
        Ref::filter_map(self.read()?, |object| object.as_any().downcast_ref::<T>()).map_err(|_| {
            ModelError::TypeMismatch {
                expected: T::type_descriptor().name(),
                found,
            }
        })
    }

    pub fn write_as<T: Model>(&self) -> Result<RefMut<'_, T>> {
        let found = self.type_name();
        RefMut::filter_map(self.write()?, |object| object.as_any_mut().downcast_mut::<T>()).map_err(
            |_| ModelError::TypeMismatch {
                expected: T::type_descriptor().name(),
                found,
            },
        )
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_node(node: Rc<ModelNode>) -> Self {
        ObjectRef(node)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name(), self.id())
    }
}
