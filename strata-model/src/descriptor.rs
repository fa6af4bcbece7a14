//! Type descriptors: the ordered property table of one concrete model type.
//!
//! Property order is declaration order and is the only framing of the undo
//! log, so it must not change while an undo history or a saved snapshot is
//! alive. Documents are keyed by name and do not depend on it.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::codec::Scalar;
use crate::error::{ModelError, Result};
use crate::object::{Model, ModelObject, ObjectId, ObjectRef};
use crate::property::{DeclaredType, Field, PropertyDescriptor};

/// Keys reserved by the document format; no property may use them.
pub const RESERVED_PREFIX: char = '$';

pub struct TypeDescriptor {
    name: &'static str,
    type_id: TypeId,
    properties: Vec<PropertyDescriptor>,
    by_name: HashMap<&'static str, usize>,
    base: Option<DeclaredType>,
    factory: fn() -> Box<dyn ModelObject>,
}

fn construct_default<T: Model>() -> Box<dyn ModelObject> {
    Box::new(T::default())
}

impl TypeDescriptor {
    pub fn builder<T: Model>(name: &'static str) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            name,
            properties: Vec::new(),
            base: None,
            _owner: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// The declared base type, for subtypes that may stand in for it.
    pub fn base(&self) -> Option<&'static TypeDescriptor> {
        self.base.map(|base| base())
    }

    /// Whether an instance of this type may sit in a slot declared as `other`.
    pub fn is_a(&self, other: &TypeDescriptor) -> bool {
        if self.type_id == other.type_id {
            return true;
        }
        let mut current = self.base();
        while let Some(base) = current {
            if base.type_id == other.type_id {
                return true;
            }
            current = base.base();
        }
        false
    }

    /// Construct a default instance bound to `owner`.
    pub fn construct(&self, owner: Option<&ObjectRef>) -> ObjectRef {
        ObjectRef::from_boxed((self.factory)(), owner)
    }

    /// Every child owned by `object`, in property order.
    pub fn owned_children(&self, object: &dyn ModelObject) -> Result<Vec<ObjectRef>> {
        let mut children = Vec::new();
        for property in self.properties.iter().filter(|p| p.ownership().owns_target()) {
            property.owned_children(object, &mut children)?;
        }
        Ok(children)
    }

    /// Every back-reference held by `object`, paired with the property path.
    pub fn references(&self, object: &dyn ModelObject) -> Result<Vec<(ObjectId, &str)>> {
        let mut references = Vec::new();
        for property in &self.properties {
            if let Some(id) = property.reference_of(object)? {
                references.push((id, property.path()));
            }
        }
        Ok(references)
    }

    /// Rejects property tables no backend can handle.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.starts_with(RESERVED_PREFIX) {
            return Err(ModelError::UnsupportedType(format!(
                "invalid type name `{}`",
                self.name
            )));
        }
        for property in &self.properties {
            let name = property.name();
            if name.is_empty() || name.starts_with(RESERVED_PREFIX) {
                return Err(ModelError::UnsupportedType(format!(
                    "{}: property name `{name}` is empty or reserved",
                    self.name
                )));
            }
        }
        if self.by_name.len() != self.properties.len() {
            return Err(ModelError::UnsupportedType(format!(
                "{}: duplicate property names",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("base", &self.base().map(|b| b.name()))
            .field("properties", &self.properties)
            .finish()
    }
}

/// Declares the properties of `T` in order.
///
/// Each property is given as a pair of field projections:
///
/// ```ignore
/// TypeDescriptor::builder::<TextLayer>("TextLayer")
///     .value("content", |t| &t.content, |t| &mut t.content)
///     .owned_replaceable("shadow", Shadow::type_descriptor, |t| &t.shadow, |t| &mut t.shadow)
///     .build()
/// ```
pub struct TypeDescriptorBuilder<T> {
    name: &'static str,
    properties: Vec<PropertyDescriptor>,
    base: Option<DeclaredType>,
    _owner: PhantomData<fn() -> T>,
}

impl<T: Model> TypeDescriptorBuilder<T> {
    /// Lets this type fill owned slots declared as `base`. Properties are
    /// not inherited; a subtype declares every field it stores.
    pub fn extends(mut self, base: DeclaredType) -> Self {
        self.base = Some(base);
        self
    }

    pub fn value<V: Scalar>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.properties
            .push(PropertyDescriptor::value(self.name, name, Field::new(get, get_mut)));
        self
    }

    pub fn value_list<V: Scalar>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &Vec<V>,
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> Self {
        self.properties
            .push(PropertyDescriptor::value_list(self.name, name, Field::new(get, get_mut)));
        self
    }

    /// Owned child in a fixed slot, constructed with the owner.
    pub fn owned(
        mut self,
        name: &'static str,
        declared: DeclaredType,
        get: fn(&T) -> &ObjectRef,
        get_mut: fn(&mut T) -> &mut ObjectRef,
    ) -> Self {
        self.properties.push(PropertyDescriptor::owned(
            self.name,
            name,
            declared,
            Field::new(get, get_mut),
        ));
        self
    }

    /// Owned child in a slot that may be emptied or rebound.
    pub fn owned_replaceable(
        mut self,
        name: &'static str,
        declared: DeclaredType,
        get: fn(&T) -> &Option<ObjectRef>,
        get_mut: fn(&mut T) -> &mut Option<ObjectRef>,
    ) -> Self {
        self.properties.push(PropertyDescriptor::owned_replaceable(
            self.name,
            name,
            declared,
            Field::new(get, get_mut),
        ));
        self
    }

    pub fn owned_list(
        mut self,
        name: &'static str,
        declared: DeclaredType,
        get: fn(&T) -> &Vec<ObjectRef>,
        get_mut: fn(&mut T) -> &mut Vec<ObjectRef>,
    ) -> Self {
        self.properties.push(PropertyDescriptor::owned_list(
            self.name,
            name,
            declared,
            Field::new(get, get_mut),
        ));
        self
    }

    /// Back-reference by identity to an object owned elsewhere.
    pub fn reference(
        mut self,
        name: &'static str,
        get: fn(&T) -> &Option<ObjectId>,
        get_mut: fn(&mut T) -> &mut Option<ObjectId>,
    ) -> Self {
        self.properties
            .push(PropertyDescriptor::reference(self.name, name, Field::new(get, get_mut)));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        let by_name = self
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name(), i))
            .collect();
        TypeDescriptor {
            name: self.name,
            type_id: TypeId::of::<T>(),
            properties: self.properties,
            by_name,
            base: self.base,
            factory: construct_default::<T>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyKind;
    use std::sync::OnceLock;

    #[derive(Default)]
    struct Marker {
        label: String,
        ticks: Vec<u32>,
        target: Option<ObjectId>,
    }

    impl Model for Marker {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Marker>("Marker")
                    .value("label", |m| &m.label, |m| &mut m.label)
                    .value_list("ticks", |m| &m.ticks, |m| &mut m.ticks)
                    .reference("target", |m| &m.target, |m| &mut m.target)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Broken {
        a: u8,
    }

    impl Model for Broken {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Broken>("Broken")
                    .value("a", |b| &b.a, |b| &mut b.a)
                    .value("a", |b| &b.a, |b| &mut b.a)
                    .build()
            })
        }
    }

    #[test]
    fn test_declaration_order_and_kinds() {
        let descriptor = Marker::type_descriptor();
        let names: Vec<_> = descriptor.properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["label", "ticks", "target"]);
        let kinds: Vec<_> = descriptor.properties().iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            [PropertyKind::Value, PropertyKind::ValueList, PropertyKind::Reference]
        );
        assert_eq!(descriptor.property("ticks").unwrap().path(), "Marker.ticks");
        assert!(descriptor.property("missing").is_none());
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_descriptor_is_cached() {
        assert!(std::ptr::eq(Marker::type_descriptor(), Marker::type_descriptor()));
    }

    #[test]
    fn test_construct_and_references() {
        let object = Marker::type_descriptor().construct(None);
        let target = ObjectId::new();
        object.write_as::<Marker>().unwrap().target = Some(target);
        let guard = object.read().unwrap();
        let references = object.descriptor().references(&*guard).unwrap();
        assert_eq!(references, vec![(target, "Marker.target")]);
    }

    #[derive(Default)]
    struct Arrow {
        label: String,
    }

    impl Model for Arrow {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Arrow>("Arrow")
                    .extends(Marker::type_descriptor)
                    .value("label", |a| &a.label, |a| &mut a.label)
                    .build()
            })
        }
    }

    #[test]
    fn test_subtype_assignability() {
        let arrow = Arrow::type_descriptor();
        let marker = Marker::type_descriptor();
        assert!(arrow.is_a(marker));
        assert!(arrow.is_a(arrow));
        assert!(!marker.is_a(arrow));
        assert_eq!(arrow.base().map(|b| b.name()), Some("Marker"));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = Broken::type_descriptor().validate().unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedType(_)));
    }
}
