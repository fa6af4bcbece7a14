//! Property descriptors: one per (owner type, property) pair.
//!
//! A descriptor pairs a typed field projection (`fn(&T) -> &F` and
//! `fn(&mut T) -> &mut F`) with the routing for that field's declared kind.
//! The projection is erased behind a small trait object so that a
//! [`TypeDescriptor`](crate::TypeDescriptor) can hold the properties of any
//! owner type in one ordered list.
//!
//! All variants expose the same four operations, one per backend direction:
//! `write_document`, `read_document`, `write_snapshot`, `read_snapshot`.

use std::marker::PhantomData;

use serde_json::Value;

use crate::codec::Scalar;
use crate::descriptor::TypeDescriptor;
use crate::document::{self, LoadContext};
use crate::error::{ModelError, Result};
use crate::object::{Model, ModelObject, ObjectId, ObjectRef};
use crate::ownership::Ownership;
use crate::snapshot::{SnapshotBuilder, SnapshotReader};

/// Lazily resolved declared type of an owned property. A function rather
/// than a reference so that recursive types don't re-enter their own
/// descriptor initialization.
pub type DeclaredType = fn() -> &'static TypeDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A scalar value.
    Value,
    /// An owned child in a fixed slot; only its contents change.
    Owned,
    /// An owned child in a slot that may be rebound or emptied.
    OwnedReplaceable,
    /// A list of scalar values.
    ValueList,
    /// A list of owned children.
    OwnedList,
    /// A back-reference to an object owned elsewhere, by identity.
    Reference,
}

fn downcast<T: Model>(object: &dyn ModelObject) -> Result<&T> {
    object
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ModelError::TypeMismatch {
            expected: T::type_descriptor().name(),
            found: object.descriptor().name(),
        })
}

fn downcast_mut<T: Model>(object: &mut dyn ModelObject) -> Result<&mut T> {
    let found = object.descriptor().name();
    object
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| ModelError::TypeMismatch {
            expected: T::type_descriptor().name(),
            found,
        })
}

/// Typed projection of one field of `T`.
pub(crate) struct Field<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> Field<T, F> {
    pub(crate) fn new(get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self {
        Self { get, get_mut }
    }
}

/// Erased access to a field of type `F` on some owner type.
trait Slot<F>: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn ModelObject) -> Result<&'a F>;
    fn get_mut<'a>(&self, owner: &'a mut dyn ModelObject) -> Result<&'a mut F>;
}

impl<T: Model, F: 'static> Slot<F> for Field<T, F> {
    fn get<'a>(&self, owner: &'a dyn ModelObject) -> Result<&'a F> {
        Ok((self.get)(downcast::<T>(owner)?))
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn ModelObject) -> Result<&'a mut F> {
        Ok((self.get_mut)(downcast_mut::<T>(owner)?))
    }
}

/// Scalar and list-of-scalar properties, with the value type erased.
trait ScalarAccess: Send + Sync {
    fn nullable(&self) -> bool;
    fn write_document(&self, owner: &dyn ModelObject) -> Result<Value>;
    fn read_document(&self, owner: &mut dyn ModelObject, value: &Value) -> Result<()>;
    fn write_snapshot(&self, owner: &dyn ModelObject, builder: &mut SnapshotBuilder) -> Result<()>;
    fn read_snapshot(&self, owner: &mut dyn ModelObject, reader: &mut SnapshotReader<'_>) -> Result<()>;
}

impl<T: Model, V: Scalar> ScalarAccess for Field<T, V> {
    fn nullable(&self) -> bool {
        V::nullable()
    }

    fn write_document(&self, owner: &dyn ModelObject) -> Result<Value> {
        self.get(owner)?.to_document()
    }

    fn read_document(&self, owner: &mut dyn ModelObject, value: &Value) -> Result<()> {
        let decoded = V::from_document(value)?;
        *self.get_mut(owner)? = decoded;
        Ok(())
    }

    fn write_snapshot(&self, owner: &dyn ModelObject, builder: &mut SnapshotBuilder) -> Result<()> {
        self.get(owner)?.encode(builder)
    }

    fn read_snapshot(&self, owner: &mut dyn ModelObject, reader: &mut SnapshotReader<'_>) -> Result<()> {
        let decoded = V::decode(reader)?;
        *self.get_mut(owner)? = decoded;
        Ok(())
    }
}

pub(crate) struct ListField<T, V> {
    field: Field<T, Vec<V>>,
    _value: PhantomData<fn() -> V>,
}

impl<T, V> ListField<T, V> {
    pub(crate) fn new(field: Field<T, Vec<V>>) -> Self {
        Self {
            field,
            _value: PhantomData,
        }
    }
}

impl<T: Model, V: Scalar> ScalarAccess for ListField<T, V> {
    fn nullable(&self) -> bool {
        false
    }

    fn write_document(&self, owner: &dyn ModelObject) -> Result<Value> {
        let items = self
            .field
            .get(owner)?
            .iter()
            .enumerate()
            .map(|(i, item)| item.to_document().map_err(|e| e.within(&format!("[{i}]"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(items))
    }

    fn read_document(&self, owner: &mut dyn ModelObject, value: &Value) -> Result<()> {
        let items = value
            .as_array()
            .ok_or_else(|| ModelError::format("", "expected an array"))?;
        let decoded = items
            .iter()
            .enumerate()
            .map(|(i, item)| V::from_document(item).map_err(|e| e.within(&format!("[{i}]"))))
            .collect::<Result<Vec<_>>>()?;
        *self.field.get_mut(owner)? = decoded;
        Ok(())
    }

    fn write_snapshot(&self, owner: &dyn ModelObject, builder: &mut SnapshotBuilder) -> Result<()> {
        let items = self.field.get(owner)?;
        builder.write_count(items.len())?;
        for item in items {
            item.encode(builder)?;
        }
        Ok(())
    }

    fn read_snapshot(&self, owner: &mut dyn ModelObject, reader: &mut SnapshotReader<'_>) -> Result<()> {
        // Zero-sized scalars encode to no bytes at all.
        let min_len = usize::from(std::mem::size_of::<V>() > 0);
        let count = reader.read_count(min_len)?;
        let mut decoded = Vec::with_capacity(count);
        for _ in 0..count {
            decoded.push(V::decode(reader)?);
        }
        *self.field.get_mut(owner)? = decoded;
        Ok(())
    }
}

enum Access {
    Value(Box<dyn ScalarAccess>),
    ValueList(Box<dyn ScalarAccess>),
    Owned {
        declared: DeclaredType,
        slot: Box<dyn Slot<ObjectRef>>,
    },
    OwnedReplaceable {
        declared: DeclaredType,
        slot: Box<dyn Slot<Option<ObjectRef>>>,
    },
    OwnedList {
        declared: DeclaredType,
        slot: Box<dyn Slot<Vec<ObjectRef>>>,
    },
    Reference(Box<dyn Slot<Option<ObjectId>>>),
}

/// Describes one property of one owner type.
pub struct PropertyDescriptor {
    name: &'static str,
    path: String,
    access: Access,
}

impl PropertyDescriptor {
    fn with_access(owner: &'static str, name: &'static str, access: Access) -> Self {
        Self {
            name,
            path: format!("{owner}.{name}"),
            access,
        }
    }

    pub(crate) fn value<T: Model, V: Scalar>(
        owner: &'static str,
        name: &'static str,
        field: Field<T, V>,
    ) -> Self {
        Self::with_access(owner, name, Access::Value(Box::new(field)))
    }

    pub(crate) fn value_list<T: Model, V: Scalar>(
        owner: &'static str,
        name: &'static str,
        field: Field<T, Vec<V>>,
    ) -> Self {
        Self::with_access(owner, name, Access::ValueList(Box::new(ListField::new(field))))
    }

    pub(crate) fn owned<T: Model>(
        owner: &'static str,
        name: &'static str,
        declared: DeclaredType,
        field: Field<T, ObjectRef>,
    ) -> Self {
        let slot = Box::new(field);
        Self::with_access(owner, name, Access::Owned { declared, slot })
    }

    pub(crate) fn owned_replaceable<T: Model>(
        owner: &'static str,
        name: &'static str,
        declared: DeclaredType,
        field: Field<T, Option<ObjectRef>>,
    ) -> Self {
        let slot = Box::new(field);
        Self::with_access(owner, name, Access::OwnedReplaceable { declared, slot })
    }

    pub(crate) fn owned_list<T: Model>(
        owner: &'static str,
        name: &'static str,
        declared: DeclaredType,
        field: Field<T, Vec<ObjectRef>>,
    ) -> Self {
        let slot = Box::new(field);
        Self::with_access(owner, name, Access::OwnedList { declared, slot })
    }

    pub(crate) fn reference<T: Model>(
        owner: &'static str,
        name: &'static str,
        field: Field<T, Option<ObjectId>>,
    ) -> Self {
        Self::with_access(owner, name, Access::Reference(Box::new(field)))
    }

    /// Document field key.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `Owner.property`, used to attribute errors.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> PropertyKind {
        match self.access {
            Access::Value(_) => PropertyKind::Value,
            Access::ValueList(_) => PropertyKind::ValueList,
            Access::Owned { .. } => PropertyKind::Owned,
            Access::OwnedReplaceable { .. } => PropertyKind::OwnedReplaceable,
            Access::OwnedList { .. } => PropertyKind::OwnedList,
            Access::Reference(_) => PropertyKind::Reference,
        }
    }

    pub fn ownership(&self) -> Ownership {
        Ownership::of(self.kind())
    }

    /// Whether the document null marker is accepted for this property.
    pub fn nullable(&self) -> bool {
        match &self.access {
            Access::Value(access) => access.nullable(),
            Access::OwnedReplaceable { .. } | Access::Reference(_) => true,
            Access::ValueList(_) | Access::Owned { .. } | Access::OwnedList { .. } => false,
        }
    }

    /// Declared type of an owned property.
    pub fn declared_type(&self) -> Option<&'static TypeDescriptor> {
        match &self.access {
            Access::Owned { declared, .. }
            | Access::OwnedReplaceable { declared, .. }
            | Access::OwnedList { declared, .. } => Some(declared()),
            _ => None,
        }
    }

    /// The back-reference held by a `Reference` property.
    pub fn reference_of(&self, owner: &dyn ModelObject) -> Result<Option<ObjectId>> {
        match &self.access {
            Access::Reference(slot) => Ok(*slot.get(owner)?),
            _ => Ok(None),
        }
    }

    /// Children owned through this property, in slot order.
    pub fn owned_children(&self, owner: &dyn ModelObject, out: &mut Vec<ObjectRef>) -> Result<()> {
        match &self.access {
            Access::Owned { slot, .. } => out.push(slot.get(owner)?.clone()),
            Access::OwnedReplaceable { slot, .. } => out.extend(slot.get(owner)?.iter().cloned()),
            Access::OwnedList { slot, .. } => out.extend(slot.get(owner)?.iter().cloned()),
            _ => {}
        }
        Ok(())
    }

    pub fn write_document(&self, owner: &dyn ModelObject) -> Result<Value> {
        self.write_document_inner(owner).map_err(|e| e.within(&self.path))
    }

    fn write_document_inner(&self, owner: &dyn ModelObject) -> Result<Value> {
        match &self.access {
            Access::Value(access) | Access::ValueList(access) => access.write_document(owner),
            Access::Owned { declared, slot } => document::write_object(slot.get(owner)?, Some(declared())),
            Access::OwnedReplaceable { declared, slot } => match slot.get(owner)? {
                Some(child) => document::write_object(child, Some(declared())),
                None => Ok(Value::Null),
            },
            Access::OwnedList { declared, slot } => {
                let declared = declared();
                let items = slot
                    .get(owner)?
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        document::write_object(child, Some(declared))
                            .map_err(|e| e.within(&format!("[{i}]")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(items))
            }
            Access::Reference(slot) => slot.get(owner)?.to_document(),
        }
    }

    pub(crate) fn read_document(
        &self,
        owner: &ObjectRef,
        value: &Value,
        ctx: &mut LoadContext<'_>,
    ) -> Result<()> {
        self.read_document_inner(owner, value, ctx)
            .map_err(|e| e.within(&self.path))
    }

    fn read_document_inner(
        &self,
        owner: &ObjectRef,
        value: &Value,
        ctx: &mut LoadContext<'_>,
    ) -> Result<()> {
        if value.is_null() && !self.nullable() {
            return Err(ModelError::format("", "null is not allowed here"));
        }
        match &self.access {
            Access::Value(access) | Access::ValueList(access) => {
                access.read_document(&mut *owner.write()?, value)
            }
            Access::Owned { declared, slot } => {
                let current = slot.get(&*owner.read()?)?.clone();
                if let Some(fresh) = ctx.bind(Some(&current), value, declared(), owner)? {
                    *slot.get_mut(&mut *owner.write()?)? = fresh;
                    ctx.record_rebind(owner, self.name, current);
                }
                Ok(())
            }
            Access::OwnedReplaceable { declared, slot } => {
                if value.is_null() {
                    return Ok(());
                }
                let current = slot.get(&*owner.read()?)?.clone();
                if let Some(fresh) = ctx.bind(current.as_ref(), value, declared(), owner)? {
                    *slot.get_mut(&mut *owner.write()?)? = Some(fresh);
                }
                Ok(())
            }
            Access::OwnedList { declared, slot } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| ModelError::format("", "expected an array"))?;
                let declared = declared();
                let mut children = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child = ctx
                        .instantiate(item, declared, owner)
                        .map_err(|e| e.within(&format!("[{i}]")))?;
                    children.push(child);
                }
                *slot.get_mut(&mut *owner.write()?)? = children;
                Ok(())
            }
            Access::Reference(slot) => {
                let target = <Option<ObjectId>>::from_document(value)?;
                if let Some(id) = target {
                    ctx.expect_reference(id, &self.path);
                }
                *slot.get_mut(&mut *owner.write()?)? = target;
                Ok(())
            }
        }
    }

    /// Put `child` back into a fixed owned slot. Only used to undo a load
    /// that replaced the slot's instance with one of another type.
    pub(crate) fn rebind_owned(&self, owner: &ObjectRef, child: ObjectRef) -> Result<()> {
        match &self.access {
            Access::Owned { slot, .. } => {
                child.set_owner(Some(owner));
                *slot.get_mut(&mut *owner.write()?)? = child;
                Ok(())
            }
            _ => Err(ModelError::format(self.path(), "not a fixed owned slot")),
        }
    }

    pub fn write_snapshot(&self, owner: &dyn ModelObject, builder: &mut SnapshotBuilder) -> Result<()> {
        if !self.ownership().tracked_by_snapshot() {
            return Ok(());
        }
        self.write_snapshot_inner(owner, builder)
            .map_err(|e| e.within(&self.path))
    }

    fn write_snapshot_inner(&self, owner: &dyn ModelObject, builder: &mut SnapshotBuilder) -> Result<()> {
        match &self.access {
            Access::Value(access) | Access::ValueList(access) => access.write_snapshot(owner, builder),
            Access::Owned { .. } => Ok(()),
            Access::OwnedReplaceable { slot, .. } => builder.write_reference(slot.get(owner)?.as_ref()),
            Access::OwnedList { slot, .. } => {
                let children = slot.get(owner)?;
                builder.write_count(children.len())?;
                for child in children {
                    builder.write_reference(Some(child))?;
                }
                Ok(())
            }
            Access::Reference(slot) => slot.get(owner)?.encode(builder),
        }
    }

    pub fn read_snapshot(&self, owner: &ObjectRef, reader: &mut SnapshotReader<'_>) -> Result<()> {
        if !self.ownership().tracked_by_snapshot() {
            return Ok(());
        }
        self.read_snapshot_inner(owner, reader)
            .map_err(|e| e.within(&self.path))
    }

    fn read_snapshot_inner(&self, owner: &ObjectRef, reader: &mut SnapshotReader<'_>) -> Result<()> {
        match &self.access {
            Access::Value(access) | Access::ValueList(access) => {
                access.read_snapshot(&mut *owner.write()?, reader)
            }
            Access::Owned { .. } => Ok(()),
            Access::OwnedReplaceable { slot, .. } => {
                let child = reader.read_reference()?;
                if let Some(child) = &child {
                    child.set_owner(Some(owner));
                }
                *slot.get_mut(&mut *owner.write()?)? = child;
                Ok(())
            }
            Access::OwnedList { slot, .. } => {
                let count = reader.read_count(4)?;
                let mut children = Vec::with_capacity(count);
                for i in 0..count {
                    let child = reader
                        .read_reference()?
                        .ok_or_else(|| ModelError::format(format!("[{i}]"), "empty token in owned list"))?;
                    children.push(child);
                }
                for child in &children {
                    child.set_owner(Some(owner));
                }
                *slot.get_mut(&mut *owner.write()?)? = children;
                Ok(())
            }
            Access::Reference(slot) => {
                let target = <Option<ObjectId>>::decode(reader)?;
                *slot.get_mut(&mut *owner.write()?)? = target;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("path", &self.path)
            .field("kind", &self.kind())
            .finish()
    }
}
