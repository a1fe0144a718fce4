//! Semantic metadata: concepts, characteristics, functions, aspects and
//! device classes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::walk_all;
use crate::domains::entities::EntityKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub characteristic_ids: Vec<String>,
    #[serde(default)]
    pub base_characteristic_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub display_unit: String,
    #[serde(default)]
    pub sub_characteristics: Vec<Characteristic>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub concept_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_aspects: Vec<Aspect>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceClass {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

identifiable!(Concept, EntityKind::Concept.id_segment());
resource!(Concept, EntityKind::Concept);

identifiable!(Characteristic, EntityKind::Characteristic.id_segment(), |characteristic, visitor| {
    walk_all(&mut characteristic.sub_characteristics, visitor);
});
resource!(Characteristic, EntityKind::Characteristic);

identifiable!(Function, EntityKind::Function.id_segment());
resource!(Function, EntityKind::Function);

identifiable!(Aspect, EntityKind::Aspect.id_segment(), |aspect, visitor| {
    walk_all(&mut aspect.sub_aspects, visitor);
});
resource!(Aspect, EntityKind::Aspect);

identifiable!(DeviceClass, EntityKind::DeviceClass.id_segment());
resource!(DeviceClass, EntityKind::DeviceClass);
