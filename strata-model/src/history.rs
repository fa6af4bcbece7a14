//! Undo/redo timeline built from per-object snapshots.
//!
//! ```text
//!   record(obj, |o| ...)        undo()                    redo()
//!   ┌──────────────────┐   ┌──────────────────────┐   ┌──────────────────────┐
//!   │ capture before   │   │ pop changeset        │   │ pop changeset        │
//!   │ image (once per  │   │ capture after images │   │ capture before images│
//!   │ object/changeset)│   │ restore before images│   │ restore after images │
//!   │ mutate           │   │ push onto redo       │   │ push onto undo       │
//!   │ clear redo       │   └──────────────────────┘   └──────────────────────┘
//!   └──────────────────┘
//! ```
//!
//! A changeset is one undo step. Records outside an explicit changeset form
//! a step of their own. Each object is captured at most once per changeset,
//! so the step restores the state from before its first mutation.
//!
//! Owners and children are captured independently: an owner's image records
//! which child instances sit in its replaceable slots and lists, never the
//! children's own fields.

use std::collections::VecDeque;

use crate::error::{ModelError, Result};
use crate::object::{Model, ObjectRef};
use crate::snapshot::UndoSnapshot;

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Undo steps kept; the oldest are dropped past this bound.
    pub max_changesets: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_changesets: 256,
        }
    }
}

impl HistoryConfig {
    pub fn for_testing() -> Self {
        Self { max_changesets: 8 }
    }
}

/// Snapshots that are undone or redone together.
#[derive(Debug, Default)]
pub struct Changeset {
    version: u64,
    snapshots: Vec<UndoSnapshot>,
}

impl Changeset {
    fn contains(&self, object: &ObjectRef) -> bool {
        self.snapshots.iter().any(|s| s.target().ptr_eq(object))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshots(&self) -> &[UndoSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.snapshots.iter().map(UndoSnapshot::byte_len).sum()
    }

    /// Restore every snapshot and return the images they replaced.
    ///
    /// All or nothing: if one object fails to restore, the objects already
    /// restored are put back and the error is returned.
    fn apply(&self) -> Result<Changeset> {
        let mut replaced = Vec::with_capacity(self.snapshots.len());
        for snapshot in self.snapshots.iter().rev() {
            let step = UndoSnapshot::capture(snapshot.target()).and_then(|current| {
                snapshot.restore()?;
                Ok(current)
            });
            match step {
                Ok(current) => replaced.push(current),
                Err(err) => {
                    log::warn!(
                        "Restoring {:?} failed, rolling back {} objects: {err}",
                        snapshot.target(),
                        replaced.len()
                    );
                    for image in replaced.iter().rev() {
                        if let Err(rollback) = image.restore() {
                            log::error!("Rollback of {:?} failed: {rollback}", image.target());
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(Changeset {
            version: self.version,
            snapshots: replaced,
        })
    }
}

pub struct UndoHistory {
    config: HistoryConfig,
    undo: VecDeque<Changeset>,
    redo: Vec<Changeset>,
    open: Option<Changeset>,
    depth: usize,
    next_version: u64,
    base_version: u64,
    current: u64,
    saved: u64,
}

impl UndoHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            undo: VecDeque::new(),
            redo: Vec::new(),
            open: None,
            depth: 0,
            next_version: 1,
            base_version: 0,
            current: 0,
            saved: 0,
        }
    }

    /// Capture `object`, then mutate it through `mutate`.
    pub fn record<T: Model, R>(&mut self, object: &ObjectRef, mutate: impl FnOnce(&mut T) -> R) -> Result<R> {
        if !object.is::<T>() {
            return Err(ModelError::TypeMismatch {
                expected: T::type_descriptor().name(),
                found: object.type_name(),
            });
        }
        // Nothing may be captured for an object that cannot be written.
        drop(object.write()?);
        self.record_change(object)?;
        let mut target = object.write_as::<T>()?;
        Ok(mutate(&mut *target))
    }

    /// Capture `object` ahead of a mutation made by the caller.
    pub fn record_change(&mut self, object: &ObjectRef) -> Result<()> {
        if self.open.as_ref().is_some_and(|open| open.contains(object)) {
            return Ok(());
        }
        let snapshot = UndoSnapshot::capture(object)?;
        log::trace!("Captured {object:?} ({} bytes)", snapshot.byte_len());
        self.redo.clear();
        match self.open.as_mut() {
            Some(open) => open.snapshots.push(snapshot),
            None => {
                let changeset = Changeset {
                    version: 0,
                    snapshots: vec![snapshot],
                };
                self.push_committed(changeset);
            }
        }
        Ok(())
    }

    /// Group the following records into one undo step. Calls nest; the step
    /// is committed when the outermost changeset is.
    pub fn begin_changeset(&mut self) {
        self.depth += 1;
        if self.open.is_none() {
            self.open = Some(Changeset::default());
        }
    }

    pub fn commit_changeset(&mut self) {
        if self.depth == 0 {
            log::warn!("commit_changeset called without an open changeset");
            return;
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.close_open();
        }
    }

    pub fn in_changeset(&self) -> bool {
        self.depth > 0
    }

    fn close_open(&mut self) {
        self.depth = 0;
        if let Some(changeset) = self.open.take() {
            if !changeset.is_empty() {
                self.push_committed(changeset);
            }
        }
    }

    fn push_committed(&mut self, mut changeset: Changeset) {
        changeset.version = self.next_version;
        self.next_version += 1;
        self.current = changeset.version;
        self.push_undo(changeset);
    }

    fn push_undo(&mut self, changeset: Changeset) {
        self.undo.push_back(changeset);
        while self.undo.len() > self.config.max_changesets {
            if let Some(dropped) = self.undo.pop_front() {
                log::debug!("Dropping undo step {} past the history bound", dropped.version);
                self.base_version = dropped.version;
            }
        }
    }

    fn settle_open(&mut self) {
        if self.depth > 0 {
            log::warn!("Undo history used with an open changeset; committing it");
            self.close_open();
        }
    }

    /// Undo the latest step. Returns `false` when there is nothing to undo.
    ///
    /// On failure every object of the step is left as it was and both
    /// stacks are unchanged.
    pub fn undo(&mut self) -> Result<bool> {
        self.settle_open();
        let Some(changeset) = self.undo.pop_back() else {
            return Ok(false);
        };
        match changeset.apply() {
            Ok(after) => {
                log::info!("Undo step {} ({} objects)", changeset.version, changeset.len());
                self.current = self.undo.back().map_or(self.base_version, |c| c.version);
                self.redo.push(after);
                Ok(true)
            }
            Err(err) => {
                self.undo.push_back(changeset);
                Err(err)
            }
        }
    }

    /// Redo the latest undone step. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.settle_open();
        let Some(changeset) = self.redo.pop() else {
            return Ok(false);
        };
        match changeset.apply() {
            Ok(before) => {
                log::info!("Redo step {} ({} objects)", changeset.version, changeset.len());
                self.current = changeset.version;
                self.push_undo(before);
                Ok(true)
            }
            Err(err) => {
                self.redo.push(changeset);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty() || self.open.as_ref().is_some_and(|open| !open.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Identifies the state the graph is in: the step last applied.
    pub fn version(&self) -> u64 {
        self.current
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.current;
    }

    /// Whether the graph differs from the state last marked saved.
    pub fn is_dirty(&self) -> bool {
        self.current != self.saved || self.open.as_ref().is_some_and(|open| !open.is_empty())
    }

    /// Forget every step. The dirty flag is kept.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.open = None;
        self.depth = 0;
        self.base_version = self.current;
    }

    /// Bytes held by snapshots on both stacks.
    pub fn byte_len(&self) -> usize {
        self.undo.iter().chain(&self.redo).map(Changeset::byte_len).sum()
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl std::fmt::Debug for UndoHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoHistory")
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .field("depth", &self.depth)
            .field("version", &self.current)
            .finish()
    }
}
