//! Binary undo snapshots: dense before/after images of one model object.
//!
//! Record layout:
//! ```text
//! ┌──────────────┬─────────────────────────────────────────────────────┐
//! │ identity     │ properties, in declaration order                    │
//! │ 8 + 16 bytes │ value | i32 count + values | i32 token | identity   │
//! └──────────────┴─────────────────────────────────────────────────────┘
//! ```
//!
//! The format carries no field names and no lengths beyond explicit list
//! counts; the target's type descriptor is the only framing. Scalars are
//! encoded with bincode (little-endian, fixed-width integers), so floats are
//! bit exact.
//!
//! Owned children are not written inline. Each snapshot keeps a table of the
//! child handles it saw and writes an `i32` index into that table (`-1` for
//! an empty slot). Replaying the token rebinds the very same instance, which
//! is what lets undo tell "slot rebound" apart from "same child, edited".

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Scalar;
use crate::error::{ModelError, Result};
use crate::object::{ObjectId, ObjectRef};

const EMPTY_TOKEN: i32 = -1;

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Append-only writer for one snapshot record.
#[derive(Default)]
pub struct SnapshotBuilder {
    buffer: Vec<u8>,
    references: Vec<ObjectRef>,
    tokens: HashMap<usize, i32>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a record for `target` by writing its identity token.
    pub fn begin(&mut self, target: &ObjectRef) -> Result<()> {
        self.write_encoded(&target.id())
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| ModelError::format("", format!("list of {count} items is too long")))?;
        self.write_i32(count);
        Ok(())
    }

    pub fn write_encoded<V: Serialize + ?Sized>(&mut self, value: &V) -> Result<()> {
        bincode::serde::encode_into_std_write(value, &mut self.buffer, wire_config())
            .map_err(|e| ModelError::format("", e.to_string()))?;
        Ok(())
    }

    pub fn write_scalar<V: Scalar>(&mut self, value: &V) -> Result<()> {
        value.encode(self)
    }

    /// Write a managed-reference token for an owned child.
    pub fn write_reference(&mut self, target: Option<&ObjectRef>) -> Result<()> {
        let token = match target {
            None => EMPTY_TOKEN,
            Some(object) => match self.tokens.get(&object.addr()) {
                Some(&token) => token,
                None => {
                    let token = i32::try_from(self.references.len())
                        .map_err(|_| ModelError::format("", "too many references in one snapshot"))?;
                    self.tokens.insert(object.addr(), token);
                    self.references.push(object.clone());
                    token
                }
            },
        };
        self.write_i32(token);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Seal the record as a snapshot of `target`.
    pub fn commit(self, target: &ObjectRef) -> UndoSnapshot {
        UndoSnapshot {
            target: target.clone(),
            references: self.references,
            data: self.buffer,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over one snapshot record.
pub struct SnapshotReader<'a> {
    data: &'a [u8],
    position: usize,
    references: &'a [ObjectRef],
}

impl<'a> SnapshotReader<'a> {
    pub fn new(data: &'a [u8], references: &'a [ObjectRef]) -> Self {
        Self {
            data,
            position: 0,
            references,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn truncated(&self, wanted: usize) -> ModelError {
        ModelError::format(
            format!("byte {}", self.position),
            format!("snapshot truncated: wanted {wanted} bytes, {} left", self.remaining()),
        )
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let end = self.position + 4;
        let bytes: [u8; 4] = self
            .data
            .get(self.position..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| self.truncated(4))?;
        self.position = end;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Read a list count whose elements each take at least `min_len` bytes.
    /// A count that cannot fit in what is left is a corrupt record. Pass 0
    /// for elements that may encode to nothing.
    pub fn read_count(&mut self, min_len: usize) -> Result<usize> {
        let at = self.position;
        let count = self.read_i32()?;
        let count = usize::try_from(count)
            .map_err(|_| ModelError::format(format!("byte {at}"), format!("negative count {count}")))?;
        if count.saturating_mul(min_len) > self.remaining() {
            return Err(ModelError::format(
                format!("byte {at}"),
                format!("count {count} exceeds the {} bytes left", self.remaining()),
            ));
        }
        Ok(count)
    }

    pub fn read_encoded<V: DeserializeOwned>(&mut self) -> Result<V> {
        let (value, read) = bincode::serde::decode_from_slice(&self.data[self.position..], wire_config())
            .map_err(|e| ModelError::format(format!("byte {}", self.position), e.to_string()))?;
        self.position += read;
        Ok(value)
    }

    pub fn read_scalar<V: Scalar>(&mut self) -> Result<V> {
        V::decode(self)
    }

    pub fn read_reference(&mut self) -> Result<Option<ObjectRef>> {
        let at = self.position;
        let token = self.read_i32()?;
        if token == EMPTY_TOKEN {
            return Ok(None);
        }
        usize::try_from(token)
            .ok()
            .and_then(|i| self.references.get(i))
            .cloned()
            .map(Some)
            .ok_or_else(|| ModelError::format(format!("byte {at}"), format!("unknown reference token {token}")))
    }

    /// Check the record's identity token against the object it is applied to.
    pub fn expect_identity(&mut self, expected: ObjectId) -> Result<()> {
        let found: ObjectId = self.read_encoded()?;
        if found != expected {
            return Err(ModelError::format(
                "identity",
                format!("snapshot of {found} applied to {expected}"),
            ));
        }
        Ok(())
    }

    /// Every byte must have been consumed by the descriptors.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ModelError::format(
                format!("byte {}", self.position),
                format!("{} trailing bytes", self.remaining()),
            ));
        }
        Ok(())
    }
}

/// Before- or after-image of one object's properties.
#[derive(Clone)]
pub struct UndoSnapshot {
    target: ObjectRef,
    references: Vec<ObjectRef>,
    data: Vec<u8>,
}

impl UndoSnapshot {
    pub fn capture(target: &ObjectRef) -> Result<Self> {
        let mut builder = SnapshotBuilder::new();
        builder.begin(target)?;
        {
            let object = target.read()?;
            for property in target.descriptor().properties() {
                property.write_snapshot(&*object, &mut builder)?;
            }
        }
        Ok(builder.commit(target))
    }

    /// Reassemble a snapshot from stored parts. The bytes are checked only
    /// when the snapshot is restored.
    pub fn from_parts(target: ObjectRef, references: Vec<ObjectRef>, data: Vec<u8>) -> Self {
        Self {
            target,
            references,
            data,
        }
    }

    /// Write the recorded values back into the target.
    ///
    /// Either the whole record applies or the target is left as it was: the
    /// current image is captured first and put back if replay fails.
    pub fn restore(&self) -> Result<()> {
        let current = Self::capture(&self.target)?;
        if let Err(err) = self.replay() {
            log::warn!("Snapshot of {:?} failed to replay, rolling back: {err}", self.target);
            if let Err(rollback) = current.replay() {
                log::error!("Rollback of {:?} failed: {rollback}", self.target);
            }
            return Err(err);
        }
        Ok(())
    }

    fn replay(&self) -> Result<()> {
        let mut reader = SnapshotReader::new(&self.data, &self.references);
        reader.expect_identity(self.target.id())?;
        for property in self.target.descriptor().properties() {
            property.read_snapshot(&self.target, &mut reader)?;
        }
        reader.finish()
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn references(&self) -> &[ObjectRef] {
        &self.references
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for UndoSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoSnapshot")
            .field("target", &self.target)
            .field("references", &self.references.len())
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::object::Model;
    use std::sync::OnceLock;

    #[derive(Default)]
    struct Stroke {
        width: f32,
        dashes: Vec<f32>,
    }

    impl Model for Stroke {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Stroke>("Stroke")
                    .value("width", |s| &s.width, |s| &mut s.width)
                    .value_list("dashes", |s| &s.dashes, |s| &mut s.dashes)
                    .build()
            })
        }
    }

    #[derive(Default)]
    struct Outline {
        strokes: Vec<ObjectRef>,
        accent: Option<ObjectRef>,
    }

    impl Model for Outline {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Outline>("Outline")
                    .owned_list("strokes", Stroke::type_descriptor, |o| &o.strokes, |o| &mut o.strokes)
                    .owned_replaceable("accent", Stroke::type_descriptor, |o| &o.accent, |o| &mut o.accent)
                    .build()
            })
        }
    }

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Tick;

    impl crate::codec::Scalar for Tick {}

    #[derive(Default)]
    struct Metronome {
        tempo: u16,
        ticks: Vec<Tick>,
    }

    impl Model for Metronome {
        fn type_descriptor() -> &'static TypeDescriptor {
            static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                TypeDescriptor::builder::<Metronome>("Metronome")
                    .value("tempo", |m| &m.tempo, |m| &mut m.tempo)
                    .value_list("ticks", |m| &m.ticks, |m| &mut m.ticks)
                    .build()
            })
        }
    }

    fn stroke(width: f32) -> ObjectRef {
        ObjectRef::new(Stroke {
            width,
            dashes: vec![width, width * 2.0],
        })
    }

    #[test]
    fn test_capture_restore_values() {
        let target = stroke(1.5);
        let snapshot = UndoSnapshot::capture(&target).unwrap();
        {
            let mut s = target.write_as::<Stroke>().unwrap();
            s.width = 9.0;
            s.dashes.clear();
        }
        snapshot.restore().unwrap();
        let s = target.read_as::<Stroke>().unwrap();
        assert_eq!(s.width, 1.5);
        assert_eq!(s.dashes, vec![1.5, 3.0]);
    }

    #[test]
    fn test_tokens_restore_same_instances() {
        let outline = ObjectRef::new(Outline::default());
        let (a, b) = (stroke(1.0), stroke(2.0));
        {
            let mut o = outline.write_as::<Outline>().unwrap();
            o.strokes = vec![a.clone(), b.clone(), a.clone()];
            o.accent = Some(b.clone());
        }
        let snapshot = UndoSnapshot::capture(&outline).unwrap();
        // Duplicates share one table entry.
        assert_eq!(snapshot.references().len(), 2);

        {
            let mut o = outline.write_as::<Outline>().unwrap();
            o.strokes.truncate(1);
            o.accent = Some(stroke(7.0));
        }
        snapshot.restore().unwrap();

        let o = outline.read_as::<Outline>().unwrap();
        assert_eq!(o.strokes.len(), 3);
        assert!(o.strokes[0].ptr_eq(&a) && o.strokes[1].ptr_eq(&b) && o.strokes[2].ptr_eq(&a));
        assert!(o.accent.as_ref().unwrap().ptr_eq(&b));
        assert_eq!(b.owner(), Some(outline.clone()));
    }

    #[test]
    fn test_empty_slot_token() {
        let outline = ObjectRef::new(Outline::default());
        let snapshot = UndoSnapshot::capture(&outline).unwrap();
        outline.write_as::<Outline>().unwrap().accent = Some(stroke(1.0));
        snapshot.restore().unwrap();
        assert!(outline.read_as::<Outline>().unwrap().accent.is_none());
    }

    #[test]
    fn test_oversized_count_leaves_target_unchanged() {
        let target = stroke(4.0);
        let mut builder = SnapshotBuilder::new();
        builder.begin(&target).unwrap();
        builder.write_scalar(&8.0f32).unwrap();
        builder.write_i32(1_000);
        builder.write_scalar(&1.0f32).unwrap();
        let corrupt = builder.commit(&target);

        let err = corrupt.restore().unwrap_err();
        assert!(err.is_format());
        let s = target.read_as::<Stroke>().unwrap();
        assert_eq!(s.width, 4.0);
        assert_eq!(s.dashes, vec![4.0, 8.0]);
    }

    #[test]
    fn test_unknown_token_and_trailing_bytes() {
        let outline = ObjectRef::new(Outline::default());
        let mut builder = SnapshotBuilder::new();
        builder.begin(&outline).unwrap();
        builder.write_i32(0);
        builder.write_i32(5);
        let err = builder.commit(&outline).restore().unwrap_err();
        assert!(err.to_string().contains("unknown reference token 5"));

        let mut data = UndoSnapshot::capture(&outline).unwrap().bytes().to_vec();
        data.push(0);
        let err = UndoSnapshot::from_parts(outline.clone(), Vec::new(), data)
            .restore()
            .unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_identity_mismatch() {
        let snapshot = UndoSnapshot::capture(&stroke(1.0)).unwrap();
        let other = stroke(2.0);
        let forged = UndoSnapshot::from_parts(other.clone(), Vec::new(), snapshot.bytes().to_vec());
        assert!(forged.restore().unwrap_err().is_format());
        assert_eq!(other.read_as::<Stroke>().unwrap().width, 2.0);
    }

    #[test]
    fn test_zero_sized_list_at_record_end() {
        let target = ObjectRef::new(Metronome {
            tempo: 120,
            ticks: vec![Tick, Tick, Tick],
        });
        let snapshot = UndoSnapshot::capture(&target).unwrap();
        target.write_as::<Metronome>().unwrap().ticks.clear();

        snapshot.restore().unwrap();
        assert_eq!(target.read_as::<Metronome>().unwrap().ticks.len(), 3);
    }

    #[test]
    fn test_reader_primitives() {
        let mut builder = SnapshotBuilder::new();
        builder.write_i32(-7);
        builder.write_count(0).unwrap();
        let bytes = builder.into_bytes();
        let mut reader = SnapshotReader::new(&bytes, &[]);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_count(1).unwrap(), 0);
        assert!(reader.read_i32().is_err());
        reader.finish().unwrap();

        let bytes = (-3i32).to_le_bytes();
        let mut reader = SnapshotReader::new(&bytes, &[]);
        assert!(reader.read_count(0).unwrap_err().to_string().contains("negative count"));

        let bytes = 3i32.to_le_bytes();
        assert_eq!(SnapshotReader::new(&bytes, &[]).read_count(0).unwrap(), 3);
        assert!(SnapshotReader::new(&bytes, &[]).read_count(1).is_err());
    }
}
