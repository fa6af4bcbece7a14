//! Ownership policy for reference-typed properties.
//!
//! Decided once, from the declared [`PropertyKind`], when a type descriptor is
//! built. Nothing here holds objects; it only answers how a property of a
//! given kind travels through each backend:
//!
//! | Kind               | Ownership  | Document        | Undo snapshot         |
//! |--------------------|------------|-----------------|-----------------------|
//! | `Value`            | `Inline`   | scalar          | encoded value         |
//! | `ValueList`        | `Inline`   | array           | count + values        |
//! | `Owned`            | `Embedded` | nested object   | nothing (fixed slot)  |
//! | `OwnedReplaceable` | `Token`    | nested object   | reference token       |
//! | `OwnedList`        | `Token`    | array of objects| count + tokens        |
//! | `Reference`        | `Identity` | object id       | object id             |

use crate::property::PropertyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Stored by value through a scalar codec.
    Inline,
    /// Owned child in a slot that is never rebound after construction.
    Embedded,
    /// Owned child (or children) in a slot that undo may rebind.
    Token,
    /// Back-reference to an object owned elsewhere.
    Identity,
}

impl Ownership {
    pub fn of(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Value | PropertyKind::ValueList => Ownership::Inline,
            PropertyKind::Owned => Ownership::Embedded,
            PropertyKind::OwnedReplaceable | PropertyKind::OwnedList => Ownership::Token,
            PropertyKind::Reference => Ownership::Identity,
        }
    }

    /// Target lifetime is bound to the owner.
    pub fn owns_target(self) -> bool {
        matches!(self, Ownership::Embedded | Ownership::Token)
    }

    /// Target is written inline, field by field, into documents.
    pub fn deep_serializes(self) -> bool {
        self.owns_target()
    }

    /// Undo snapshots record which instance sits in the slot.
    pub fn writes_token(self) -> bool {
        self == Ownership::Token
    }

    /// Undo snapshots of the owner carry anything for this property at all.
    /// Children in fixed slots are snapshotted on their own.
    pub fn tracked_by_snapshot(self) -> bool {
        self != Ownership::Embedded
    }
}
