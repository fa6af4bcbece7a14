//! Type registry: every concrete model type a document may contain.
//!
//! Built once, validated up front and immutable afterwards, so it can be
//! shared by reference between graphs (and threads) while loading.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::descriptor::TypeDescriptor;
use crate::error::{ModelError, Result};
use crate::object::{Model, ObjectRef};

#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<&'static TypeDescriptor>,
    by_name: HashMap<&'static str, &'static TypeDescriptor>,
    by_id: HashMap<TypeId, &'static TypeDescriptor>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Look up a type by its document name (`$type`).
    pub fn resolve(&self, name: &str) -> Result<&'static TypeDescriptor> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnsupportedType(format!("unknown type `{name}`")))
    }

    pub fn descriptor(&self, type_id: TypeId) -> Option<&'static TypeDescriptor> {
        self.by_id.get(&type_id).copied()
    }

    pub fn descriptor_of<T: Model>(&self) -> Option<&'static TypeDescriptor> {
        self.descriptor(TypeId::of::<T>())
    }

    pub fn construct(&self, descriptor: &TypeDescriptor, owner: Option<&ObjectRef>) -> Result<ObjectRef> {
        if !self.by_id.contains_key(&descriptor.type_id()) {
            return Err(ModelError::UnsupportedType(format!(
                "{} is not registered",
                descriptor.name()
            )));
        }
        Ok(descriptor.construct(owner))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered types, in registration order.
    pub fn types(&self) -> impl Iterator<Item = &'static TypeDescriptor> + '_ {
        self.types.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Default)]
pub struct TypeRegistryBuilder {
    types: Vec<&'static TypeDescriptor>,
}

impl TypeRegistryBuilder {
    pub fn register<T: Model>(self) -> Self {
        self.register_descriptor(T::type_descriptor())
    }

    pub fn register_descriptor(mut self, descriptor: &'static TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Validate every registered type and freeze the registry.
    ///
    /// Fails on malformed property tables, on two types sharing a name and on
    /// owned properties or base types that point at unregistered types.
    pub fn build(self) -> Result<TypeRegistry> {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for &descriptor in &self.types {
            descriptor.validate()?;
            if by_name.insert(descriptor.name(), descriptor).is_some() {
                return Err(ModelError::UnsupportedType(format!(
                    "type name `{}` registered twice",
                    descriptor.name()
                )));
            }
            by_id.insert(descriptor.type_id(), descriptor);
        }

        for &descriptor in &self.types {
            if let Some(base) = descriptor.base() {
                if !by_id.contains_key(&base.type_id()) {
                    return Err(ModelError::UnsupportedType(format!(
                        "{} extends unregistered type {}",
                        descriptor.name(),
                        base.name()
                    )));
                }
            }
            let mut seen = HashSet::from([descriptor.type_id()]);
            let mut current = descriptor.base();
            while let Some(base) = current {
                if !seen.insert(base.type_id()) {
                    return Err(ModelError::UnsupportedType(format!(
                        "{} has a cyclic base chain through {}",
                        descriptor.name(),
                        base.name()
                    )));
                }
                current = base.base();
            }
            for property in descriptor.properties() {
                if let Some(declared) = property.declared_type() {
                    if !by_id.contains_key(&declared.type_id()) {
                        return Err(ModelError::UnsupportedType(format!(
                            "{} declares unregistered type {}",
                            property.path(),
                            declared.name()
                        )));
                    }
                }
            }
        }

        log::debug!("Type registry built with {} types", self.types.len());
        Ok(TypeRegistry {
            types: self.types,
            by_name,
            by_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    #[derive(Default)]
    struct Glyph {
        code: char,
    }

    impl Model for Glyph {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Glyph>("Glyph")
                    .value("code", |g| &g.code, |g| &mut g.code)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Ligature {
        code: char,
        parts: u8,
    }

    impl Model for Ligature {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Ligature>("Ligature")
                    .extends(Glyph::type_descriptor)
                    .value("code", |l| &l.code, |l| &mut l.code)
                    .value("parts", |l| &l.parts, |l| &mut l.parts)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Line {
        glyphs: Vec<ObjectRef>,
    }

    impl Model for Line {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Line>("Line")
                    .owned_list("glyphs", Glyph::type_descriptor, |l| &l.glyphs, |l| &mut l.glyphs)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Shadowed {
        code: u8,
    }

    impl Model for Shadowed {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Shadowed>("Glyph")
                    .value("code", |s| &s.code, |s| &mut s.code)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Reserved {
        id: u8,
    }

    impl Model for Reserved {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Reserved>("Reserved")
                    .value("$id", |r| &r.id, |r| &mut r.id)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Rock {
        mass: f32,
    }

    impl Model for Rock {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Rock>("Rock")
                    .extends(Stone::type_descriptor)
                    .value("mass", |r| &r.mass, |r| &mut r.mass)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Stone {
        mass: f32,
    }

    impl Model for Stone {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Stone>("Stone")
                    .extends(Rock::type_descriptor)
                    .value("mass", |s| &s.mass, |s| &mut s.mass)
                    .build()
            })
        }
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register::<Glyph>()
            .register::<Ligature>()
            .register::<Line>()
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_by_name_and_type() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.resolve("Ligature").unwrap().name(), "Ligature");
        assert!(registry.descriptor_of::<Line>().is_some());
        assert!(matches!(
            registry.resolve("Kerning"),
            Err(ModelError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_cyclic_bases_fail_build() {
        let err = TypeRegistry::builder()
            .register::<Rock>()
            .register::<Stone>()
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedType(_)));
        assert!(err.to_string().contains("cyclic base chain"));
    }

    #[test]
    fn test_unregistered_owned_type_fails_build() {
        let err = TypeRegistry::builder().register::<Line>().build().unwrap_err();
        assert!(err.to_string().contains("Line.glyphs"));

        let err = TypeRegistry::builder().register::<Ligature>().build().unwrap_err();
        assert!(err.to_string().contains("extends unregistered"));
    }

    #[test]
    fn test_duplicate_and_reserved_names_fail_build() {
        let err = TypeRegistry::builder()
            .register::<Glyph>()
            .register::<Shadowed>()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("registered twice"));

        let err = TypeRegistry::builder().register::<Reserved>().build().unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedType(_)));
    }

    #[test]
    fn test_construct_requires_registration() {
        let registry = registry();
        let glyph = registry.construct(Glyph::type_descriptor(), None).unwrap();
        assert!(glyph.is::<Glyph>());
        assert!(registry.construct(Reserved::type_descriptor(), None).is_err());
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeRegistry>();
    }
}
