//! The LWM2M node tree
//!
//! Values live in a fixed hierarchy: objects contain instances, instances
//! contain resources, and a multi-instance resource contains resource
//! instances. Children are keyed by numeric identifier and kept in
//! identifier order.

pub mod path;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use path::{InvalidPathError, LwM2mPath, validate_not_overlapping};

/// The data type of a resource value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    String,
    Integer,
    Float,
    Boolean,
    Opaque,
    Time,
    #[serde(rename = "OBJLNK")]
    ObjLink,
    /// Executable resources carry no value.
    None,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::String => "STRING",
            ResourceType::Integer => "INTEGER",
            ResourceType::Float => "FLOAT",
            ResourceType::Boolean => "BOOLEAN",
            ResourceType::Opaque => "OPAQUE",
            ResourceType::Time => "TIME",
            ResourceType::ObjLink => "OBJLNK",
            ResourceType::None => "NONE",
        };
        write!(f, "{}", name)
    }
}

/// A reference to an object instance, the `OBJLNK` resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectLink {
    pub object_id: u16,
    pub object_instance_id: u16,
}

impl ObjectLink {
    pub fn new(object_id: u16, object_instance_id: u16) -> Self {
        Self {
            object_id,
            object_instance_id,
        }
    }
}

impl fmt::Display for ObjectLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_id, self.object_instance_id)
    }
}

impl FromStr for ObjectLink {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (object, instance) = s.split_once(':').ok_or_else(|| {
            InvalidValueError::new(format!("object link '{}' must be 'OID:IID'", s))
        })?;
        let object_id = object
            .parse::<u16>()
            .map_err(|_| InvalidValueError::new(format!("invalid object id in link '{}'", s)))?;
        let object_instance_id = instance
            .parse::<u16>()
            .map_err(|_| InvalidValueError::new(format!("invalid instance id in link '{}'", s)))?;
        Ok(ObjectLink::new(object_id, object_instance_id))
    }
}

/// A resource value could not be interpreted as its declared type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid resource value: {message}")]
pub struct InvalidValueError {
    pub message: String,
}

impl InvalidValueError {
    pub(crate) fn new<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A typed leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Opaque(Vec<u8>),
    /// Epoch time in milliseconds.
    Time(i64),
    ObjectLink(ObjectLink),
}

impl ResourceValue {
    /// The wire type of this value.
    pub fn kind(&self) -> ResourceType {
        match self {
            ResourceValue::String(_) => ResourceType::String,
            ResourceValue::Integer(_) => ResourceType::Integer,
            ResourceValue::Float(_) => ResourceType::Float,
            ResourceValue::Boolean(_) => ResourceType::Boolean,
            ResourceValue::Opaque(_) => ResourceType::Opaque,
            ResourceValue::Time(_) => ResourceType::Time,
            ResourceValue::ObjectLink(_) => ResourceType::ObjLink,
        }
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::String(v) => write!(f, "{}", v),
            ResourceValue::Integer(v) => write!(f, "{}", v),
            ResourceValue::Float(v) => write!(f, "{}", v),
            ResourceValue::Boolean(v) => write!(f, "{}", v),
            ResourceValue::Opaque(v) => write!(f, "{} bytes", v.len()),
            ResourceValue::Time(v) => write!(f, "{}", v),
            ResourceValue::ObjectLink(v) => write!(f, "{}", v),
        }
    }
}

/// A resource, either single-valued or multi-instance.
///
/// The variant is part of the resource's identity: a single-valued
/// resource never merges with resource instances of the same identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum LwM2mResource {
    Single {
        id: u16,
        value: ResourceValue,
    },
    Multiple {
        id: u16,
        kind: ResourceType,
        instances: BTreeMap<u16, ResourceValue>,
    },
}

impl LwM2mResource {
    pub fn single(id: u16, value: ResourceValue) -> Self {
        LwM2mResource::Single { id, value }
    }

    pub fn multiple<I>(id: u16, kind: ResourceType, instances: I) -> Self
    where
        I: IntoIterator<Item = (u16, ResourceValue)>,
    {
        LwM2mResource::Multiple {
            id,
            kind,
            instances: instances.into_iter().collect(),
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            LwM2mResource::Single { id, .. } => *id,
            LwM2mResource::Multiple { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> ResourceType {
        match self {
            LwM2mResource::Single { value, .. } => value.kind(),
            LwM2mResource::Multiple { kind, .. } => *kind,
        }
    }

    pub fn is_multi_instances(&self) -> bool {
        matches!(self, LwM2mResource::Multiple { .. })
    }
}

/// An object instance: a set of resources keyed by resource identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mObjectInstance {
    pub id: u16,
    pub resources: BTreeMap<u16, LwM2mResource>,
}

impl LwM2mObjectInstance {
    pub fn new<I>(id: u16, resources: I) -> Self
    where
        I: IntoIterator<Item = LwM2mResource>,
    {
        Self {
            id,
            resources: resources.into_iter().map(|r| (r.id(), r)).collect(),
        }
    }

    pub fn resource(&self, resource_id: u16) -> Option<&LwM2mResource> {
        self.resources.get(&resource_id)
    }
}

/// An object: a set of instances keyed by instance identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mObject {
    pub id: u16,
    pub instances: BTreeMap<u16, LwM2mObjectInstance>,
}

impl LwM2mObject {
    pub fn new<I>(id: u16, instances: I) -> Self
    where
        I: IntoIterator<Item = LwM2mObjectInstance>,
    {
        Self {
            id,
            instances: instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn instance(&self, instance_id: u16) -> Option<&LwM2mObjectInstance> {
        self.instances.get(&instance_id)
    }
}

/// The shape of a node, without its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    ObjectInstance,
    Resource,
}

/// Any node of the LWM2M tree.
#[derive(Debug, Clone, PartialEq)]
pub enum LwM2mNode {
    Object(LwM2mObject),
    ObjectInstance(LwM2mObjectInstance),
    Resource(LwM2mResource),
}

impl LwM2mNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            LwM2mNode::Object(_) => NodeKind::Object,
            LwM2mNode::ObjectInstance(_) => NodeKind::ObjectInstance,
            LwM2mNode::Resource(_) => NodeKind::Resource,
        }
    }
}
