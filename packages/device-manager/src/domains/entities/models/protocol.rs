use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::walk_all;
use crate::domains::entities::EntityKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub handler: String,
    #[serde(default)]
    pub protocol_segments: Vec<ProtocolSegment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSegment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

identifiable!(Protocol, EntityKind::Protocol.id_segment(), |protocol, visitor| {
    walk_all(&mut protocol.protocol_segments, visitor);
});
resource!(Protocol, EntityKind::Protocol);

identifiable!(ProtocolSegment, "protocol-segment");
