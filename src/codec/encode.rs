//! Node-tree to SenML payload encoding
//!
//! The first record of each node carries the request path as its base
//! name; subsequent records only carry names relative to it. Values are
//! written with the type the model declares when it declares one,
//! otherwise with the type they already have.

use lwm2m_senml::{Number, SenMLPack, SenMLRecord, SenMLValue};

use crate::model::LwM2mModel;
use crate::node::{LwM2mNode, LwM2mPath, LwM2mResource, ResourceType, ResourceValue};

use super::{CodecError, ContentFormat, TimestampedNode};

pub(super) fn encode_nodes(
    nodes: &[(LwM2mPath, Option<LwM2mNode>)],
    format: ContentFormat,
    model: &dyn LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    let mut pack = SenMLPack::new();
    for (path, node) in nodes {
        if let Some(node) = node {
            pack.add_records(node_to_records(node, path, model)?);
        }
    }
    serialize(&pack, format)
}

pub(super) fn encode_timestamped(
    nodes: &[TimestampedNode],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    let mut pack = SenMLPack::new();
    for timestamped in nodes {
        let mut records = node_to_records(&timestamped.node, path, model)?;
        if let Some(timestamp) = timestamped.timestamp {
            if let Some(first) = records.first_mut() {
                first.base_time = Some(timestamp as f64);
            }
        }
        pack.add_records(records);
    }
    serialize(&pack, format)
}

fn serialize(pack: &SenMLPack, format: ContentFormat) -> Result<Vec<u8>, CodecError> {
    let serialized = match format {
        ContentFormat::SenMlJson => pack.to_json(),
        ContentFormat::SenMlCbor => pack.to_cbor(),
    };
    serialized.map_err(|e| CodecError::Encode {
        path: String::new(),
        message: e.to_string(),
    })
}

fn node_to_records(
    node: &LwM2mNode,
    request: &LwM2mPath,
    model: &dyn LwM2mModel,
) -> Result<Vec<SenMLRecord>, CodecError> {
    let mut records = Vec::new();
    match node {
        LwM2mNode::Object(object) => {
            if !request.is_object() {
                return Err(CodecError::encode(
                    request,
                    "an object can only be encoded at an object path",
                ));
            }
            for instance in object.instances.values() {
                for resource in instance.resources.values() {
                    resource_to_records(
                        Some(format!("{}/{}", instance.id, resource.id())),
                        resource,
                        request,
                        model,
                        &mut records,
                    )?;
                }
            }
        }
        LwM2mNode::ObjectInstance(instance) => {
            for resource in instance.resources.values() {
                let prefix = if request.is_object() {
                    format!("{}/{}", instance.id, resource.id())
                } else if request.is_object_instance() {
                    resource.id().to_string()
                } else {
                    return Err(CodecError::encode(
                        request,
                        "an object instance can only be encoded at an object or instance path",
                    ));
                };
                resource_to_records(Some(prefix), resource, request, model, &mut records)?;
            }
        }
        LwM2mNode::Resource(resource) => {
            if !request.is_resource() {
                return Err(CodecError::encode(
                    request,
                    "a resource can only be encoded at a resource path",
                ));
            }
            resource_to_records(None, resource, request, model, &mut records)?;
        }
    }
    Ok(records)
}

fn resource_to_records(
    prefix: Option<String>,
    resource: &LwM2mResource,
    request: &LwM2mPath,
    model: &dyn LwM2mModel,
    records: &mut Vec<SenMLRecord>,
) -> Result<(), CodecError> {
    let declared = request
        .object_id()
        .and_then(|object_id| model.resource_model(object_id, resource.id()))
        .and_then(|resource_model| resource_model.kind)
        .unwrap_or_else(|| resource.kind());

    match resource {
        LwM2mResource::Single { value, .. } => {
            records.push(make_record(prefix, declared, value, request, records.is_empty())?);
        }
        LwM2mResource::Multiple { instances, .. } => {
            for (instance_id, value) in instances {
                let name = match &prefix {
                    Some(prefix) => format!("{}/{}", prefix, instance_id),
                    None => instance_id.to_string(),
                };
                records.push(make_record(
                    Some(name),
                    declared,
                    value,
                    request,
                    records.is_empty(),
                )?);
            }
        }
    }
    Ok(())
}

fn make_record(
    name: Option<String>,
    declared: ResourceType,
    value: &ResourceValue,
    request: &LwM2mPath,
    first: bool,
) -> Result<SenMLRecord, CodecError> {
    let mut record = SenMLRecord::new();
    let name = name.unwrap_or_default();

    if first {
        // Only the first record carries the request path, as base name.
        let mut base_name = request.to_string();
        if !name.is_empty() {
            base_name.push('/');
        }
        record.base_name = Some(base_name);
    }
    if !name.is_empty() {
        record.name = Some(name);
    }

    record.value = Some(wire_value(declared, value, request)?);
    Ok(record)
}

fn wire_value(
    declared: ResourceType,
    value: &ResourceValue,
    request: &LwM2mPath,
) -> Result<SenMLValue, CodecError> {
    match (declared, value) {
        (ResourceType::Integer, ResourceValue::Integer(v)) => {
            Ok(SenMLValue::Number(Number::Int(*v)))
        }
        (ResourceType::Float, ResourceValue::Float(v)) => {
            Ok(SenMLValue::Number(Number::Float(*v)))
        }
        (ResourceType::Float, ResourceValue::Integer(v)) => {
            Ok(SenMLValue::Number(Number::Int(*v)))
        }
        (ResourceType::Boolean, ResourceValue::Boolean(v)) => Ok(SenMLValue::Boolean(*v)),
        (ResourceType::String, ResourceValue::String(v)) => Ok(SenMLValue::String(v.clone())),
        // TIME values are epoch milliseconds in the tree, epoch seconds on
        // the wire.
        (ResourceType::Time, ResourceValue::Time(ms)) => {
            Ok(SenMLValue::Number(Number::Int(ms / 1000)))
        }
        (ResourceType::Time, ResourceValue::Integer(seconds)) => {
            Ok(SenMLValue::Number(Number::Int(*seconds)))
        }
        (ResourceType::Opaque, ResourceValue::Opaque(bytes)) => {
            Ok(SenMLValue::Opaque(bytes.clone()))
        }
        (ResourceType::ObjLink, ResourceValue::ObjectLink(link)) => {
            Ok(SenMLValue::ObjectLink(link.to_string()))
        }
        (ResourceType::None, _) => Err(CodecError::encode(
            request,
            "an executable resource cannot be encoded",
        )),
        (declared, value) => Err(CodecError::encode(
            request,
            format!("value of type {} cannot be encoded as {}", value.kind(), declared),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectModel, ResourceModel, StaticModel};
    use crate::node::{LwM2mObjectInstance, ObjectLink};

    fn device_model() -> StaticModel {
        StaticModel::with_objects(vec![ObjectModel::new(
            3,
            "Device",
            vec![
                ResourceModel::new(0, "Manufacturer", ResourceType::String),
                ResourceModel::new(6, "Available Power Sources", ResourceType::Integer).multiple(),
                ResourceModel::new(13, "Current Time", ResourceType::Time),
            ],
        )])
    }

    fn encode_json(node: &LwM2mNode, path: &str, model: &StaticModel) -> String {
        let path: LwM2mPath = path.parse().unwrap();
        let entries = [(path, Some(node.clone()))];
        let bytes = encode_nodes(&entries, ContentFormat::SenMlJson, model).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_encode_resource_base_name_has_no_trailing_slash() {
        let node = LwM2mNode::Resource(LwM2mResource::single(9, ResourceValue::Integer(95)));
        let json = encode_json(&node, "/3/0/9", &device_model());
        assert_eq!(json, r#"[{"bn":"/3/0/9","v":95}]"#);
    }

    #[test]
    fn test_encode_instance_first_record_carries_base_name() {
        let node = LwM2mNode::ObjectInstance(LwM2mObjectInstance::new(
            0,
            vec![
                LwM2mResource::single(0, ResourceValue::String("ACME".into())),
                LwM2mResource::single(9, ResourceValue::Integer(95)),
            ],
        ));
        let json = encode_json(&node, "/3/0", &device_model());
        assert_eq!(
            json,
            r#"[{"bn":"/3/0/","n":"0","vs":"ACME"},{"n":"9","v":95}]"#
        );
    }

    #[test]
    fn test_encode_multi_instance_resource() {
        let node = LwM2mNode::Resource(LwM2mResource::multiple(
            6,
            ResourceType::Integer,
            vec![(0, ResourceValue::Integer(1)), (1, ResourceValue::Integer(5))],
        ));
        let json = encode_json(&node, "/3/0/6", &device_model());
        assert_eq!(json, r#"[{"bn":"/3/0/6/","n":"0","v":1},{"n":"1","v":5}]"#);
    }

    #[test]
    fn test_encode_time_as_seconds() {
        let node = LwM2mNode::Resource(LwM2mResource::single(
            13,
            ResourceValue::Time(1_700_000_000_000),
        ));
        let json = encode_json(&node, "/3/0/13", &device_model());
        assert_eq!(json, r#"[{"bn":"/3/0/13","v":1700000000}]"#);
    }

    #[test]
    fn test_encode_objlnk() {
        let node = LwM2mNode::Resource(LwM2mResource::single(
            0,
            ResourceValue::ObjectLink(ObjectLink::new(1, 3)),
        ));
        let json = encode_json(&node, "/25/0/0", &StaticModel::new());
        assert_eq!(json, r#"[{"bn":"/25/0/0","vlo":"1:3"}]"#);
    }

    #[test]
    fn test_encode_composite_payload() {
        let battery = LwM2mNode::Resource(LwM2mResource::single(9, ResourceValue::Integer(95)));
        let temperature =
            LwM2mNode::Resource(LwM2mResource::single(5700, ResourceValue::Float(21.5)));
        let entries = [
            ("/3/0/9".parse().unwrap(), Some(battery)),
            ("/3303/0/5700".parse().unwrap(), Some(temperature)),
            ("/3/0/1".parse().unwrap(), None),
        ];
        let bytes =
            encode_nodes(&entries, ContentFormat::SenMlJson, &StaticModel::new()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"bn":"/3/0/9","v":95},{"bn":"/3303/0/5700","v":21.5}]"#
        );
    }

    #[test]
    fn test_encode_timestamped_series() {
        let path: LwM2mPath = "/3303/0/5700".parse().unwrap();
        let series = vec![
            TimestampedNode {
                timestamp: Some(1_700_000_010),
                node: LwM2mNode::Resource(LwM2mResource::single(
                    5700,
                    ResourceValue::Float(22.5),
                )),
            },
            TimestampedNode {
                timestamp: Some(1_700_000_000),
                node: LwM2mNode::Resource(LwM2mResource::single(
                    5700,
                    ResourceValue::Float(21.5),
                )),
            },
        ];
        let bytes = encode_timestamped(
            &series,
            ContentFormat::SenMlJson,
            &path,
            &StaticModel::new(),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"bn":"/3303/0/5700","bt":1700000010,"v":22.5},{"bn":"/3303/0/5700","bt":1700000000,"v":21.5}]"#
        );
    }

    #[test]
    fn test_encode_node_at_wrong_path_fails() {
        let node = LwM2mNode::Resource(LwM2mResource::single(9, ResourceValue::Integer(95)));
        let path: LwM2mPath = "/3/0".parse().unwrap();
        let entries = [(path, Some(node))];
        assert!(encode_nodes(&entries, ContentFormat::SenMlJson, &device_model()).is_err());
    }

    #[test]
    fn test_declared_type_mismatch_fails() {
        // Resource 0 is declared STRING by the model.
        let node = LwM2mNode::Resource(LwM2mResource::single(0, ResourceValue::Integer(1)));
        let path: LwM2mPath = "/3/0/0".parse().unwrap();
        let entries = [(path, Some(node))];
        let err = encode_nodes(&entries, ContentFormat::SenMlJson, &device_model()).unwrap_err();
        assert!(matches!(err, CodecError::Encode { .. }));
    }

    #[test]
    fn test_encode_decode_roundtrip_instance() {
        let model = device_model();
        let node = LwM2mNode::ObjectInstance(LwM2mObjectInstance::new(
            0,
            vec![
                LwM2mResource::single(0, ResourceValue::String("ACME".into())),
                LwM2mResource::multiple(
                    6,
                    ResourceType::Integer,
                    vec![(0, ResourceValue::Integer(1))],
                ),
            ],
        ));
        let path: LwM2mPath = "/3/0".parse().unwrap();
        let entries = [(path, Some(node.clone()))];
        let bytes = encode_nodes(&entries, ContentFormat::SenMlCbor, &model).unwrap();
        let decoded = crate::codec::decode_node(
            &bytes,
            ContentFormat::SenMlCbor,
            &path,
            &model,
            crate::node::NodeKind::ObjectInstance,
        )
        .unwrap();
        assert_eq!(decoded, node);
    }
}
