//! Value codecs for scalar property values.
//!
//! A scalar is anything stored by value in a model object: numbers, strings,
//! booleans, identities, enums and small plain structs. Each scalar type owns
//! exactly one codec, expressed as the [`Scalar`] trait, and both backends go
//! through it:
//!
//! ```text
//! ┌────────────┐  to_document / from_document   ┌──────────────────┐
//! │  Scalar V  │ ◄────────────────────────────► │ serde_json::Value│
//! │            │  encode / decode                ├──────────────────┤
//! │            │ ◄────────────────────────────► │ undo log bytes   │
//! └────────────┘  (bincode, fixed-width LE)      └──────────────────┘
//! ```
//!
//! Application enums and simple structs opt in with an empty impl over their
//! serde derives:
//!
//! ```ignore
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! enum BlendMode { Normal, Multiply }
//!
//! impl Scalar for BlendMode {}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::object::ObjectId;
use crate::snapshot::{SnapshotBuilder, SnapshotReader};

/// Codec for one scalar type. Stateless; all methods are associated with the type.
pub trait Scalar: Serialize + DeserializeOwned + Clone + PartialEq + std::fmt::Debug + 'static {
    /// Whether the document null marker is a legal value for this type.
    fn nullable() -> bool {
        false
    }

    fn to_document(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ModelError::format("", e.to_string()))
    }

    fn from_document(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| ModelError::format("", e.to_string()))
    }

    fn encode(&self, builder: &mut SnapshotBuilder) -> Result<()> {
        builder.write_encoded(self)
    }

    fn decode(reader: &mut SnapshotReader<'_>) -> Result<Self> {
        reader.read_encoded()
    }
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(impl Scalar for $ty {})*
    };
}

impl_scalar!(bool, i8, i16, i32, i64, u8, u16, u32, u64, char, String, Uuid, ObjectId);

macro_rules! impl_float_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                fn to_document(&self) -> Result<Value> {
                    if !self.is_finite() {
                        return Err(ModelError::format(
                            "",
                            format!("non-finite number {self} cannot be stored in a document"),
                        ));
                    }
                    serde_json::to_value(self).map_err(|e| ModelError::format("", e.to_string()))
                }
            }
        )*
    };
}

impl_float_scalar!(f32, f64);

impl<V: Scalar> Scalar for Option<V> {
    fn nullable() -> bool {
        true
    }

    fn to_document(&self) -> Result<Value> {
        match self {
            Some(value) => value.to_document(),
            None => Ok(Value::Null),
        }
    }

    fn from_document(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            V::from_document(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binary_roundtrip<V: Scalar>(value: V) -> V {
        let mut builder = SnapshotBuilder::new();
        value.encode(&mut builder).unwrap();
        let bytes = builder.into_bytes();
        let mut reader = SnapshotReader::new(&bytes, &[]);
        let decoded = V::decode(&mut reader).unwrap();
        reader.finish().unwrap();
        decoded
    }

    #[test]
    fn test_float_bits_survive_both_backends() {
        let value = 0.1f64 + 0.2f64;
        let decoded = binary_roundtrip(value);
        assert_eq!(decoded.to_bits(), value.to_bits());

        let text = serde_json::to_string(&value.to_document().unwrap()).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(f64::from_document(&parsed).unwrap().to_bits(), value.to_bits());

        let narrow = 1.0f32 / 3.0;
        let text = serde_json::to_string(&narrow.to_document().unwrap()).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(f32::from_document(&parsed).unwrap().to_bits(), narrow.to_bits());
    }

    #[test]
    fn test_integers_exact_at_extremes() {
        assert_eq!(binary_roundtrip(u64::MAX), u64::MAX);
        assert_eq!(binary_roundtrip(i64::MIN), i64::MIN);
        assert_eq!(u64::from_document(&u64::MAX.to_document().unwrap()).unwrap(), u64::MAX);
    }

    #[test]
    fn test_fixed_width_layout() {
        let mut builder = SnapshotBuilder::new();
        7u32.encode(&mut builder).unwrap();
        true.encode(&mut builder).unwrap();
        assert_eq!(builder.into_bytes(), vec![7, 0, 0, 0, 1]);
    }

    #[test]
    fn test_wrong_kind_is_format_error() {
        let err = u32::from_document(&json!("twelve")).unwrap_err();
        assert!(err.is_format());
        assert!(bool::from_document(&json!(1)).is_err());
        assert!(String::from_document(&Value::Null).is_err());
    }

    #[test]
    fn test_non_finite_rejected_in_documents() {
        assert!(f64::NAN.to_document().is_err());
        assert!(Some(f32::INFINITY).to_document().is_err());
        // The binary log has no such restriction.
        assert!(binary_roundtrip(f64::INFINITY).is_infinite());
    }

    #[test]
    fn test_option_is_nullable() {
        assert!(<Option<String>>::nullable());
        assert!(!String::nullable());
        assert_eq!(<Option<u8>>::from_document(&Value::Null).unwrap(), None);
        assert_eq!(<Option<u8>>::from_document(&json!(4)).unwrap(), Some(4));
        assert_eq!(binary_roundtrip(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(binary_roundtrip::<Option<i32>>(None), None);
    }

    #[test]
    fn test_truncated_binary_value_is_format_error() {
        let mut builder = SnapshotBuilder::new();
        "hello".to_string().encode(&mut builder).unwrap();
        let bytes = builder.into_bytes();
        let mut reader = SnapshotReader::new(&bytes[..bytes.len() - 2], &[]);
        let err = String::decode(&mut reader).unwrap_err();
        assert!(err.is_format());
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    enum Cap {
        Butt,
        Round,
    }

    impl Scalar for Cap {}

    #[test]
    fn test_enum_opt_in() {
        assert_eq!(Cap::Round.to_document().unwrap(), json!("Round"));
        assert_eq!(Cap::from_document(&json!("Butt")).unwrap(), Cap::Butt);
        assert!(Cap::from_document(&json!("Square")).is_err());
        assert_eq!(binary_roundtrip(Cap::Round), Cap::Round);
    }
}
