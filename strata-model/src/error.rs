use thiserror::Error;

use crate::object::ObjectId;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Document or snapshot bytes do not match the shape the descriptors expect.
    #[error("format error in {context}: {message}")]
    Format { context: String, message: String },
    #[error("unresolved reference {id} in {context}")]
    UnresolvedReference { id: ObjectId, context: String },
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// The object is already borrowed, usually a mutation started from inside another one.
    #[error("object {0} is busy")]
    Busy(ObjectId),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Prefixes the context of a format or reference error with an enclosing
    /// `Owner.property` path, so nested failures name the full route.
    pub fn within(self, outer: &str) -> Self {
        let nest = |context: String| {
            if context.is_empty() {
                outer.to_string()
            } else {
                format!("{outer} > {context}")
            }
        };
        match self {
            ModelError::Format { context, message } => ModelError::Format {
                context: nest(context),
                message,
            },
            ModelError::UnresolvedReference { id, context } => ModelError::UnresolvedReference {
                id,
                context: nest(context),
            },
            other => other,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ModelError::Format { .. })
    }
}
