//! Document backend: the model graph as a self-describing JSON tree.
//!
//! Every object becomes a JSON object keyed by property name:
//!
//! ```text
//! {
//!   "$type": "Page",            runtime type; root, or when it differs
//!   "$id": "6f1c...",           identity, always written
//!   "name": "Cover",            scalar
//!   "guides": [12.0, 48.0],     list of scalars
//!   "background": { ... },      owned child, written inline
//!   "layers": [ { ... } ],      owned children, each by its runtime type
//!   "selection": "a91e..."      back-reference, identity only
//! }
//! ```
//!
//! Loading runs in two phases:
//! 1. Construct and populate every object in the document, recursively,
//!    collecting the new objects into a pool and every back-reference id.
//! 2. Reject duplicate identities, resolve every back-reference against the
//!    pool and the caller's [`ObjectIndex`], register the pool in the index
//!    and run the `after_load` hooks in pool order.
//!
//! Nothing is registered until phase 2 has checked every reference, and an
//! in-place [`DocumentReader::populate`] that fails is rolled back, so a
//! refused load never leaves a half-applied graph behind.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::codec::Scalar;
use crate::descriptor::TypeDescriptor;
use crate::error::{ModelError, Result};
use crate::index::ObjectIndex;
use crate::object::{Model, ObjectId, ObjectRef};
use crate::registry::TypeRegistry;
use crate::snapshot::UndoSnapshot;

/// Runtime type name of an object.
pub const TYPE_KEY: &str = "$type";
/// Identity of an object.
pub const ID_KEY: &str = "$id";

/// Text output settings for [`DocumentWriter`].
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Indent nested objects when writing text.
    pub pretty: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl DocumentConfig {
    pub fn for_testing() -> Self {
        Self { pretty: false }
    }
}

/// Write `object` and everything it owns. `$type` is emitted when there is
/// no declared type to fall back on or the runtime type differs from it.
pub(crate) fn write_object(object: &ObjectRef, declared: Option<&'static TypeDescriptor>) -> Result<Value> {
    let descriptor = object.descriptor();
    let guard = object.read()?;
    let mut fields = Map::with_capacity(descriptor.properties().len() + 2);
    if declared.map_or(true, |declared| declared.type_id() != descriptor.type_id()) {
        fields.insert(TYPE_KEY.to_string(), Value::String(descriptor.name().to_string()));
    }
    fields.insert(ID_KEY.to_string(), object.id().to_document()?);
    for property in descriptor.properties() {
        fields.insert(property.name().to_string(), property.write_document(&*guard)?);
    }
    Ok(Value::Object(fields))
}

#[derive(Debug, Clone, Default)]
pub struct DocumentWriter {
    config: DocumentConfig,
}

impl DocumentWriter {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn save(&self, root: &ObjectRef) -> Result<Value> {
        let document = write_object(root, None)?;
        log::debug!("Saved {root:?}");
        Ok(document)
    }

    pub fn to_string(&self, root: &ObjectRef) -> Result<String> {
        let document = self.save(root)?;
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        log::debug!("Document for {root:?} is {} bytes", text.len());
        Ok(text)
    }

    pub fn to_writer<W: Write>(&self, root: &ObjectRef, mut writer: W) -> Result<()> {
        writer.write_all(self.to_string(root)?.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn save_file(&self, root: &ObjectRef, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_writer(root, BufWriter::new(File::create(path)?))?;
        log::info!("Wrote {root:?} to {}", path.display());
        Ok(())
    }
}

/// Rebuilds graphs from documents, resolving `$type` through a registry.
pub struct DocumentReader<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> DocumentReader<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Load a new root graph whose root is a `T` (or a registered subtype).
    pub fn load<T: Model>(&self, document: &Value) -> Result<ObjectRef> {
        self.load_with_index::<T>(document, &mut ObjectIndex::new())
    }

    /// Like [`load`](Self::load); back-references may also point at objects
    /// already in `index`, and the loaded objects are added to it.
    pub fn load_with_index<T: Model>(&self, document: &Value, index: &mut ObjectIndex) -> Result<ObjectRef> {
        let declared = self.registry.descriptor_of::<T>().ok_or_else(|| {
            ModelError::UnsupportedType(format!("{} is not registered", T::type_descriptor().name()))
        })?;
        let mut ctx = LoadContext::new(self.registry);
        let root = ctx.construct(document, declared, None)?;
        ctx.finish(index)?;
        Ok(root)
    }

    pub fn from_str<T: Model>(&self, text: &str) -> Result<ObjectRef> {
        let document: Value = serde_json::from_str(text)?;
        self.load::<T>(&document)
    }

    pub fn from_reader<T: Model, R: Read>(&self, reader: R) -> Result<ObjectRef> {
        let document: Value = serde_json::from_reader(reader)?;
        self.load::<T>(&document)
    }

    pub fn load_file<T: Model>(&self, path: impl AsRef<Path>) -> Result<ObjectRef> {
        let path = path.as_ref();
        let root = self.from_reader::<T, _>(BufReader::new(File::open(path)?))?;
        log::info!("Read {root:?} from {}", path.display());
        Ok(root)
    }

    /// Populate an existing object in place. Children of the same runtime
    /// type keep their instance; lists are replaced wholesale.
    pub fn populate(&self, target: &ObjectRef, document: &Value) -> Result<()> {
        let mut index = ObjectIndex::collect(target)?;
        self.populate_with_index(target, document, &mut index)
    }

    pub fn populate_with_index(&self, target: &ObjectRef, document: &Value, index: &mut ObjectIndex) -> Result<()> {
        let fields = expect_object(document)?;
        if let Some(tag) = fields.get(TYPE_KEY) {
            let named = tag.as_str().unwrap_or_default();
            if named != target.type_name() {
                return Err(ModelError::format(
                    TYPE_KEY,
                    format!("document describes {named}, target is {}", target.type_name()),
                ));
            }
        }

        let before = Rollback::capture(target)?;
        let mut ctx = LoadContext::new(self.registry);
        let result = ctx
            .populate(target, document)
            .and_then(|()| ctx.finish_in_place(target, before.ids(), index));
        if let Err(err) = result {
            log::warn!("Populating {target:?} failed, rolling back: {err}");
            before.apply(&ctx.rebound);
            return Err(err);
        }
        Ok(())
    }
}

fn expect_object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ModelError::format("", "expected an object"))
}

/// State of one load pass, threaded through the property descriptors.
pub(crate) struct LoadContext<'a> {
    registry: &'a TypeRegistry,
    pool: Vec<ObjectRef>,
    references: Vec<(ObjectId, String)>,
    rebound: Vec<(ObjectRef, &'static str, ObjectRef)>,
}

impl<'a> LoadContext<'a> {
    fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            pool: Vec::new(),
            references: Vec::new(),
            rebound: Vec::new(),
        }
    }

    /// The type a document object asks for, checked against its slot.
    fn tagged_type(
        &self,
        fields: &Map<String, Value>,
        declared: &'static TypeDescriptor,
    ) -> Result<&'static TypeDescriptor> {
        let Some(tag) = fields.get(TYPE_KEY) else {
            return Ok(declared);
        };
        let name = tag
            .as_str()
            .ok_or_else(|| ModelError::format(TYPE_KEY, "expected a type name"))?;
        let descriptor = self.registry.resolve(name)?;
        if !descriptor.is_a(declared) {
            return Err(ModelError::format(
                TYPE_KEY,
                format!("{name} cannot stand in for {}", declared.name()),
            ));
        }
        Ok(descriptor)
    }

    fn construct(
        &mut self,
        value: &Value,
        declared: &'static TypeDescriptor,
        owner: Option<&ObjectRef>,
    ) -> Result<ObjectRef> {
        let descriptor = self.tagged_type(expect_object(value)?, declared)?;
        let object = self.registry.construct(descriptor, owner)?;
        self.populate(&object, value)?;
        Ok(object)
    }

    /// Construct a fresh child of `owner` from a document object.
    pub(crate) fn instantiate(
        &mut self,
        value: &Value,
        declared: &'static TypeDescriptor,
        owner: &ObjectRef,
    ) -> Result<ObjectRef> {
        self.construct(value, declared, Some(owner))
    }

    /// Read a document object into an owned slot. The current instance is
    /// populated in place when the document asks for its exact type;
    /// otherwise a fresh instance is returned for the caller to bind.
    pub(crate) fn bind(
        &mut self,
        current: Option<&ObjectRef>,
        value: &Value,
        declared: &'static TypeDescriptor,
        owner: &ObjectRef,
    ) -> Result<Option<ObjectRef>> {
        let descriptor = self.tagged_type(expect_object(value)?, declared)?;
        match current {
            Some(current) if current.descriptor().type_id() == descriptor.type_id() => {
                self.populate(current, value)?;
                current.set_owner(Some(owner));
                Ok(None)
            }
            _ => self.construct(value, declared, Some(owner)).map(Some),
        }
    }

    pub(crate) fn expect_reference(&mut self, id: ObjectId, context: &str) {
        self.references.push((id, context.to_string()));
    }

    pub(crate) fn record_rebind(&mut self, owner: &ObjectRef, property: &'static str, previous: ObjectRef) {
        self.rebound.push((owner.clone(), property, previous));
    }

    fn populate(&mut self, object: &ObjectRef, value: &Value) -> Result<()> {
        let fields = expect_object(value)?;
        let descriptor = object.descriptor();
        if let Some(id) = fields.get(ID_KEY) {
            let id = ObjectId::from_document(id).map_err(|e| e.within(ID_KEY))?;
            object.set_id(id);
        }
        for (key, field) in fields {
            if key == TYPE_KEY || key == ID_KEY {
                continue;
            }
            match descriptor.property(key) {
                Some(property) => property.read_document(object, field, self)?,
                None => log::trace!("Skipping unknown field `{key}` on {}", descriptor.name()),
            }
        }
        self.pool.push(object.clone());
        Ok(())
    }

    /// Checks that must pass before anything is registered.
    fn verify(&self, index: &ObjectIndex) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.pool.len());
        for object in &self.pool {
            if !ids.insert(object.id()) {
                return Err(ModelError::format(
                    ID_KEY,
                    format!("object id {} appears more than once", object.id()),
                ));
            }
        }
        for (id, context) in &self.references {
            if !ids.contains(id) && !index.contains(*id) {
                return Err(ModelError::UnresolvedReference {
                    id: *id,
                    context: context.clone(),
                });
            }
        }
        Ok(())
    }

    fn finish(self, index: &mut ObjectIndex) -> Result<()> {
        self.verify(index)?;
        let mut displaced = Vec::new();
        for object in &self.pool {
            if let Some(previous) = index.insert(object) {
                if !previous.ptr_eq(object) {
                    displaced.push(previous);
                }
            }
        }
        if let Err(err) = self.run_hooks(index) {
            for object in &self.pool {
                index.remove(object.id());
            }
            for previous in &displaced {
                index.insert(previous);
            }
            return Err(err);
        }
        log::debug!(
            "Loaded {} objects with {} back-references",
            self.pool.len(),
            self.references.len()
        );
        Ok(())
    }

    /// Phase 2 of an in-place populate. Entries for objects that were in the
    /// graph before are replaced by what is still reachable from `target`, so
    /// references to detached children and ids that were rewritten no longer
    /// resolve. The caller rolls the graph back on failure; the index is only
    /// touched once the hooks have succeeded.
    fn finish_in_place(
        &self,
        target: &ObjectRef,
        previous: impl Iterator<Item = ObjectId>,
        index: &mut ObjectIndex,
    ) -> Result<()> {
        let mut staged = index.clone();
        for id in previous {
            staged.remove(id);
        }
        staged.merge(ObjectIndex::collect(target)?);
        self.verify(&staged)?;
        self.run_hooks(&staged)?;
        *index = staged;
        log::debug!(
            "Populated {} objects with {} back-references",
            self.pool.len(),
            self.references.len()
        );
        Ok(())
    }

    fn run_hooks(&self, index: &ObjectIndex) -> Result<()> {
        for object in &self.pool {
            object
                .write()?
                .after_load(index)
                .map_err(|e| e.within(object.type_name()))?;
        }
        Ok(())
    }
}

/// Pre-populate image of a graph: every object's properties and identity.
struct Rollback {
    images: Vec<(UndoSnapshot, ObjectId)>,
}

impl Rollback {
    fn capture(root: &ObjectRef) -> Result<Self> {
        let mut images = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(object) = stack.pop() {
            let children = {
                let guard = object.read()?;
                object.descriptor().owned_children(&*guard)?
            };
            images.push((UndoSnapshot::capture(&object)?, object.id()));
            stack.extend(children);
        }
        Ok(Self { images })
    }

    fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.images.iter().map(|(_, id)| *id)
    }

    fn apply(&self, rebound: &[(ObjectRef, &'static str, ObjectRef)]) {
        for (snapshot, id) in &self.images {
            snapshot.target().set_id(*id);
        }
        for (owner, name, previous) in rebound.iter().rev() {
            let restored = owner
                .descriptor()
                .property(name)
                .ok_or_else(|| ModelError::format(*name, "property disappeared"))
                .and_then(|property| property.rebind_owned(owner, previous.clone()));
            if let Err(err) = restored {
                log::error!("Could not restore {owner:?}.{name}: {err}");
            }
        }
        for (snapshot, _) in &self.images {
            if let Err(err) = snapshot.restore() {
                log::error!("Could not restore {:?}: {err}", snapshot.target());
            }
        }
    }
}
