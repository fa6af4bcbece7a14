//! Identity index: resolves back-references by [`ObjectId`].
//!
//! The index holds weak handles only. Ownership stays with the tree of
//! owning properties, so an object removed from the graph disappears from
//! lookups once its last strong handle (including any held by the undo
//! history) is dropped.

use std::collections::HashMap;
use std::rc::Weak;

use crate::error::{ModelError, Result};
use crate::object::{ModelNode, ObjectId, ObjectRef};

#[derive(Clone, Default)]
pub struct ObjectIndex {
    objects: HashMap<ObjectId, Weak<ModelNode>>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every object reachable from `root` through owning properties.
    pub fn collect(root: &ObjectRef) -> Result<Self> {
        let mut index = Self::new();
        let mut stack = vec![root.clone()];
        while let Some(object) = stack.pop() {
            let children = {
                let guard = object.read()?;
                object.descriptor().owned_children(&*guard)?
            };
            index.insert(&object);
            stack.extend(children);
        }
        Ok(index)
    }

    /// Returns the previous live object under the same id, if any.
    pub fn insert(&mut self, object: &ObjectRef) -> Option<ObjectRef> {
        self.objects
            .insert(object.id(), object.downgrade())
            .and_then(|previous| previous.upgrade())
            .map(ObjectRef::from_node)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectRef> {
        self.objects
            .remove(&id)
            .and_then(|weak| weak.upgrade())
            .map(ObjectRef::from_node)
    }

    /// Add every entry of `other`, replacing entries with the same id.
    pub fn merge(&mut self, other: ObjectIndex) {
        self.objects.extend(other.objects);
    }

    pub fn resolve(&self, id: ObjectId) -> Option<ObjectRef> {
        self.objects
            .get(&id)
            .and_then(|weak| weak.upgrade())
            .map(ObjectRef::from_node)
    }

    /// Like [`resolve`](Self::resolve), attributing a miss to `context`.
    pub fn require(&self, id: ObjectId, context: &str) -> Result<ObjectRef> {
        self.resolve(id).ok_or_else(|| ModelError::UnresolvedReference {
            id,
            context: context.to_string(),
        })
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.resolve(id).is_some()
    }

    /// Number of entries, including ones whose object has been dropped
    /// since the last [`prune`](Self::prune).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop entries whose objects no longer exist.
    pub fn prune(&mut self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, weak| weak.strong_count() > 0);
        let pruned = before - self.objects.len();
        if pruned > 0 {
            log::trace!("Pruned {pruned} dead index entries");
        }
        pruned
    }
}

impl std::fmt::Debug for ObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIndex")
            .field("entries", &self.objects.len())
            .finish()
    }
}
