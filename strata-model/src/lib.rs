//! # strata-model: Persistence and undo runtime for mutable object graphs
//!
//! Each model type declares its properties once, as an ordered table of
//! typed field projections. That table drives both backends:
//!
//! ```text
//!                     ┌────────────────────┐
//!                     │   TypeDescriptor   │
//!                     │ [PropertyDescriptor│
//!                     │  in decl. order]   │
//!                     └─────────┬──────────┘
//!                ┌──────────────┴──────────────┐
//!                ▼                             ▼
//!       ┌─────────────────┐           ┌─────────────────┐
//!       │ DocumentWriter  │           │ SnapshotBuilder │
//!       │ DocumentReader  │           │ SnapshotReader  │
//!       │ (JSON, by name) │           │ (binary, order) │
//!       └────────┬────────┘           └────────┬────────┘
//!                ▼                             ▼
//!         save / load files             UndoHistory
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: `Scalar` value codec for both backends
//! - [`object`]: `ObjectRef` handles, identities, the `Model` trait
//! - [`property`]: the property descriptor variants
//! - [`ownership`]: owned vs. back-reference policy per property kind
//! - [`descriptor`]: type descriptors and their builder
//! - [`registry`]: validated set of loadable types
//! - [`index`]: identity table for back-reference resolution
//! - [`document`]: JSON document save and two-phase load
//! - [`snapshot`]: binary before/after images of one object
//! - [`history`]: undo/redo stacks of snapshot changesets
//!
//! ## Core API
//!
//! | Operation        | Entry point                                  |
//! |------------------|----------------------------------------------|
//! | Save             | [`DocumentWriter::save`]                     |
//! | Load             | [`DocumentReader::load`]                     |
//! | Record mutation  | [`UndoHistory::record`]                      |
//! | Undo / Redo      | [`UndoHistory::undo`] / [`UndoHistory::redo`]|

pub mod codec;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod history;
pub mod index;
pub mod object;
pub mod ownership;
pub mod property;
pub mod registry;
pub mod snapshot;

// Re-exports for convenience
pub use codec::Scalar;
pub use descriptor::{TypeDescriptor, TypeDescriptorBuilder};
pub use document::{DocumentConfig, DocumentReader, DocumentWriter, ID_KEY, TYPE_KEY};
pub use error::{ModelError, Result};
pub use history::{Changeset, HistoryConfig, UndoHistory};
pub use index::ObjectIndex;
pub use object::{Model, ModelObject, ObjectId, ObjectRef};
pub use ownership::Ownership;
pub use property::{DeclaredType, PropertyDescriptor, PropertyKind};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use snapshot::{SnapshotBuilder, SnapshotReader, UndoSnapshot};
