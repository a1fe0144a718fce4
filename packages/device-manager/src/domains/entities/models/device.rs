//! Owner-scoped entities: devices, hubs and locations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Attribute;
use crate::domains::entities::EntityKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_type_id: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub device_local_ids: Vec<String>,
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub device_group_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

identifiable!(Device, EntityKind::Device.id_segment());
resource!(Device, EntityKind::Device);

identifiable!(Hub, EntityKind::Hub.id_segment());
resource!(Hub, EntityKind::Hub);

identifiable!(Location, EntityKind::Location.id_segment());
resource!(Location, EntityKind::Location);
