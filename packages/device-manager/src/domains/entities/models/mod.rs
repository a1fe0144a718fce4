//! Entity trees as written by clients.
//!
//! Payload fields are carried through untouched; only ids are assigned by
//! this service. Unknown fields are kept in `extra` so downstream consumers
//! see the body the client sent.

/// Implement [`Identifiable`](crate::common::Identifiable) for a struct with
/// an `id: String` field, optionally walking child collections.
macro_rules! identifiable {
    ($ty:ty, $segment:expr) => {
        identifiable!($ty, $segment, |_node, _visitor| {});
    };
    ($ty:ty, $segment:expr, |$node:ident, $visitor:ident| $walk:block) => {
        impl $crate::common::Identifiable for $ty {
            fn id_segment(&self) -> &'static str {
                $segment
            }

            fn id(&self) -> &str {
                &self.id
            }

            fn id_mut(&mut self) -> &mut String {
                &mut self.id
            }

            fn walk_children(&mut self, $visitor: &mut dyn $crate::common::IdVisitor) {
                let $node = self;
                $walk
            }
        }
    };
}

/// Mark a root entity as a [`Resource`](super::Resource) of `$kind`.
macro_rules! resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::domains::entities::Resource for $ty {
            const KIND: $crate::domains::entities::EntityKind = $kind;
        }
    };
}

pub mod device;
pub mod device_type;
pub mod protocol;
pub mod semantics;

pub use device::{Device, Hub, Location};
pub use device_type::{Content, ContentVariable, DeviceType, Service};
pub use protocol::{Protocol, ProtocolSegment};
pub use semantics::{Aspect, Characteristic, Concept, DeviceClass, Function};

use serde::{Deserialize, Serialize};

/// Free-form key/value attribute. Attributes carry no id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}
