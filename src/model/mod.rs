//! Object model registry
//!
//! Codecs consult a model to learn the declared type and cardinality of a
//! resource. Payloads referencing resources absent from the model still
//! decode, falling back to the type information carried on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::ResourceType;

/// Declared description of a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceModel {
    pub id: u16,
    pub name: String,
    /// Multi-instance resources hold a map of resource instances.
    #[serde(default)]
    pub multiple: bool,
    /// Declared type, absent for resources the model leaves untyped.
    #[serde(default, rename = "type")]
    pub kind: Option<ResourceType>,
}

impl ResourceModel {
    pub fn new<N: Into<String>>(id: u16, name: N, kind: ResourceType) -> Self {
        Self {
            id,
            name: name.into(),
            multiple: false,
            kind: Some(kind),
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// Declared description of an object and its resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectModel {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub resources: HashMap<u16, ResourceModel>,
}

impl ObjectModel {
    pub fn new<N, I>(id: u16, name: N, resources: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = ResourceModel>,
    {
        Self {
            id,
            name: name.into(),
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

/// Lookup seam used by the codecs.
pub trait LwM2mModel: Send + Sync {
    fn object_model(&self, object_id: u16) -> Option<&ObjectModel>;

    fn resource_model(&self, object_id: u16, resource_id: u16) -> Option<&ResourceModel> {
        self.object_model(object_id)
            .and_then(|object| object.resources.get(&resource_id))
    }
}

/// A fixed in-memory model, typically loaded once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticModel {
    objects: HashMap<u16, ObjectModel>,
}

impl StaticModel {
    /// An empty model; every lookup falls back to wire types.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = ObjectModel>,
    {
        Self {
            objects: objects.into_iter().map(|o| (o.id, o)).collect(),
        }
    }

    pub fn add_object(&mut self, object: ObjectModel) {
        self.objects.insert(object.id, object);
    }

    /// Load object definitions from their JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let objects: Vec<ObjectModel> = serde_json::from_str(json)?;
        Ok(Self::with_objects(objects))
    }
}

impl LwM2mModel for StaticModel {
    fn object_model(&self, object_id: u16) -> Option<&ObjectModel> {
        self.objects.get(&object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_object() -> ObjectModel {
        ObjectModel::new(
            3,
            "Device",
            vec![
                ResourceModel::new(0, "Manufacturer", ResourceType::String),
                ResourceModel::new(6, "Available Power Sources", ResourceType::Integer).multiple(),
                ResourceModel::new(13, "Current Time", ResourceType::Time),
            ],
        )
    }

    #[test]
    fn test_resource_lookup() {
        let model = StaticModel::with_objects(vec![device_object()]);

        let current_time = model.resource_model(3, 13).unwrap();
        assert_eq!(current_time.kind, Some(ResourceType::Time));
        assert!(!current_time.multiple);

        assert!(model.resource_model(3, 6).unwrap().multiple);
        assert!(model.resource_model(3, 999).is_none());
        assert!(model.resource_model(4, 0).is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {
                "id": 3303,
                "name": "Temperature",
                "resources": {
                    "5700": { "id": 5700, "name": "Sensor Value", "type": "FLOAT" },
                    "5701": { "id": 5701, "name": "Units", "type": "STRING" }
                }
            }
        ]"#;
        let model = StaticModel::from_json(json).unwrap();
        assert_eq!(
            model.resource_model(3303, 5700).unwrap().kind,
            Some(ResourceType::Float)
        );
    }
}
