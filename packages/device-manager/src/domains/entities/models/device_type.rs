//! Device types and their nested services.
//!
//! ```text
//! DeviceType
//!  └─ services[]           (service)
//!      ├─ inputs[]         (content)
//!      │   └─ content_variable          (content-variable)
//!      │       └─ sub_content_variables[]  (content-variable, recursive)
//!      └─ outputs[]        (content, same shape as inputs)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Attribute;
use crate::common::{walk, walk_all};
use crate::domains::entities::EntityKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub device_class_id: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interaction: String,
    #[serde(default)]
    pub protocol_id: String,
    #[serde(default)]
    pub inputs: Vec<Content>,
    #[serde(default)]
    pub outputs: Vec<Content>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content_variable: ContentVariable,
    #[serde(default)]
    pub serialization: String,
    #[serde(default)]
    pub protocol_segment_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentVariable {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub characteristic_id: String,
    #[serde(default)]
    pub aspect_id: String,
    #[serde(default)]
    pub function_id: String,
    #[serde(default)]
    pub sub_content_variables: Vec<ContentVariable>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

identifiable!(DeviceType, EntityKind::DeviceType.id_segment(), |device_type, visitor| {
    walk_all(&mut device_type.services, visitor);
});
resource!(DeviceType, EntityKind::DeviceType);

identifiable!(Service, "service", |service, visitor| {
    walk_all(&mut service.inputs, visitor);
    walk_all(&mut service.outputs, visitor);
});

identifiable!(Content, "content", |content, visitor| {
    walk(&mut content.content_variable, visitor);
});

identifiable!(ContentVariable, "content-variable", |variable, visitor| {
    walk_all(&mut variable.sub_content_variables, visitor);
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{assign_ids, collect_ids, IdMinter};
    use serde_json::json;
    use std::collections::HashSet;

    fn one_service_device_type() -> DeviceType {
        serde_json::from_value(json!({
            "name": "lamp",
            "device_class_id": "urn:infai:ses:device-class:lamp",
            "services": [{
                "local_id": "setOn",
                "name": "set on",
                "protocol_id": "urn:infai:ses:protocol:mqtt",
                "inputs": [{
                    "serialization": "json",
                    "content_variable": {"name": "on", "type": "https://schema.org/Boolean"}
                }]
            }],
            "service_groups": [{"key": "main"}]
        }))
        .unwrap()
    }

    #[test]
    fn every_node_gets_a_distinct_id_once() {
        let mut device_type = one_service_device_type();
        let minter = IdMinter::default();

        assert_eq!(assign_ids(&mut device_type, &minter), 4);

        let ids = collect_ids(&mut device_type);
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| !id.is_empty()));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 4);
        assert!(device_type.id.starts_with("urn:infai:ses:device-type:"));
        assert!(device_type.services[0].id.starts_with("urn:infai:ses:service:"));
        let content = &device_type.services[0].inputs[0];
        assert!(content.id.starts_with("urn:infai:ses:content:"));
        assert!(content
            .content_variable
            .id
            .starts_with("urn:infai:ses:content-variable:"));

        let before = device_type.clone();
        assert_eq!(assign_ids(&mut device_type, &minter), 0);
        assert_eq!(device_type, before);
    }

    #[test]
    fn nested_sub_variables_and_outputs_are_visited() {
        let mut device_type: DeviceType = serde_json::from_value(json!({
            "services": [{
                "outputs": [{
                    "content_variable": {
                        "type": "https://schema.org/StructuredValue",
                        "sub_content_variables": [
                            {"name": "r"},
                            {"name": "g", "sub_content_variables": [{"name": "deep"}]}
                        ]
                    }
                }]
            }]
        }))
        .unwrap();

        assign_ids(&mut device_type, &IdMinter::default());

        let variable = &device_type.services[0].outputs[0].content_variable;
        assert!(!variable.sub_content_variables[0].id.is_empty());
        assert!(!variable.sub_content_variables[1].sub_content_variables[0]
            .id
            .is_empty());
    }

    #[test]
    fn unknown_fields_survive_serialization() {
        let device_type = one_service_device_type();
        let value = serde_json::to_value(&device_type).unwrap();
        assert_eq!(value["service_groups"], json!([{"key": "main"}]));
        assert_eq!(
            value["services"][0]["inputs"][0]["content_variable"]["type"],
            "https://schema.org/Boolean"
        );
    }
}
