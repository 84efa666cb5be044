//! SenML payload to node-tree decoding
//!
//! Records arrive as a flat list of absolute names. Recovery of the tree
//! shape happens in stages: resolve base fields, validate every record
//! addresses a resource or resource instance under the requested path,
//! group by timestamp, group by object instance, then fold resource
//! instances back into multi-instance resources.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lwm2m_senml::{SenMLPack, SenMLValue, resolve_records};

use crate::model::LwM2mModel;
use crate::node::{
    LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mPath, LwM2mResource, NodeKind, ObjectLink,
    ResourceType, ResourceValue,
};

use super::{CodecError, ContentFormat, TimestampedNode};

/// A resolved record whose name parsed into a path.
struct PathRecord {
    path: LwM2mPath,
    time: Option<i64>,
    value: SenMLValue,
}

pub(super) fn decode_node(
    content: &[u8],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<LwM2mNode, CodecError> {
    let mut groups = decode_groups(content, format, path, model, kind)?;
    if groups.len() == 1 {
        // There is always at least one group, synthesized when empty.
        if let Some(first) = groups.pop() {
            if first.timestamp.is_none() {
                return Ok(first.node);
            }
        }
    }
    Err(CodecError::decode(
        path,
        "payload carries timestamps, use timestamped decoding",
    ))
}

pub(super) fn decode_timestamped(
    content: &[u8],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<Vec<TimestampedNode>, CodecError> {
    decode_groups(content, format, path, model, kind)
}

fn decode_groups(
    content: &[u8],
    format: ContentFormat,
    request: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<Vec<TimestampedNode>, CodecError> {
    let pack = parse_pack(content, format, request)?;

    let mut records = Vec::with_capacity(pack.len());
    for resolved in resolve_records(&pack) {
        let path: LwM2mPath = resolved
            .name
            .parse()
            .map_err(|e: crate::node::InvalidPathError| {
                CodecError::decode_at(resolved.name.clone(), e.reason)
            })?;
        if !path.is_resource() && !path.is_resource_instance() {
            return Err(CodecError::decode(
                &path,
                "a record must address a resource or a resource instance",
            ));
        }
        if !path.start_with(request) {
            return Err(CodecError::decode(
                &path,
                format!("record is outside the requested path {}", request),
            ));
        }
        let value = resolved
            .value
            .ok_or_else(|| CodecError::decode(&path, "record has no value"))?;
        records.push(PathRecord {
            path,
            time: resolved.time.map(|t| t as i64),
            value,
        });
    }

    // Group by timestamp. The untimed group comes first, then most recent
    // first, so singular decoding picks the freshest values.
    let mut groups: Vec<(Option<i64>, Vec<PathRecord>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(time, _)| *time == record.time) {
            Some((_, members)) => members.push(record),
            None => groups.push((record.time, vec![record])),
        }
    }
    groups.sort_by(|(a, _), (b, _)| timestamp_order(*a, *b));
    if groups.is_empty() {
        groups.push((None, Vec::new()));
    }

    groups
        .into_iter()
        .map(|(timestamp, members)| {
            Ok(TimestampedNode {
                timestamp,
                node: build_node(&members, request, model, kind)?,
            })
        })
        .collect()
}

fn parse_pack(
    content: &[u8],
    format: ContentFormat,
    request: &LwM2mPath,
) -> Result<SenMLPack, CodecError> {
    let parsed = match format {
        ContentFormat::SenMlJson => lwm2m_senml::json::from_json(content, false),
        ContentFormat::SenMlCbor => lwm2m_senml::cbor::from_cbor(content, false),
    };
    parsed.map_err(|e| CodecError::decode(request, e.to_string()))
}

fn timestamp_order(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
}

fn build_node(
    records: &[PathRecord],
    request: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<LwM2mNode, CodecError> {
    match kind {
        NodeKind::Object => {
            let object_id = request
                .object_id()
                .ok_or_else(|| CodecError::decode(request, "an object path is required"))?;
            let mut instances = BTreeMap::new();
            for (instance_id, members) in group_by_instance(records, request)? {
                instances.insert(
                    instance_id,
                    LwM2mObjectInstance {
                        id: instance_id,
                        resources: extract_resources(&members, request, model)?,
                    },
                );
            }
            Ok(LwM2mNode::Object(LwM2mObject {
                id: object_id,
                instances,
            }))
        }
        NodeKind::ObjectInstance => {
            let by_instance = group_by_instance(records, request)?;
            if by_instance.len() != 1 {
                return Err(CodecError::decode(
                    request,
                    format!(
                        "one object instance expected, payload describes {}",
                        by_instance.len()
                    ),
                ));
            }
            let mut instances = by_instance;
            // len() == 1 checked above
            match instances.pop_first() {
                Some((instance_id, members)) => {
                    Ok(LwM2mNode::ObjectInstance(LwM2mObjectInstance {
                        id: instance_id,
                        resources: extract_resources(&members, request, model)?,
                    }))
                }
                None => Err(CodecError::decode(request, "one object instance expected")),
            }
        }
        NodeKind::Resource => {
            let by_instance = group_by_instance(records, request)?;
            if by_instance.len() > 1 {
                return Err(CodecError::decode(
                    request,
                    "a resource payload must not span object instances",
                ));
            }
            let members = by_instance.into_values().next().unwrap_or_default();
            let mut resources = extract_resources(&members, request, model)?;
            if resources.len() != 1 {
                return Err(CodecError::decode(
                    request,
                    format!("one resource expected, payload describes {}", resources.len()),
                ));
            }
            match resources.pop_first() {
                Some((_, resource)) => Ok(LwM2mNode::Resource(resource)),
                None => Err(CodecError::decode(request, "one resource expected")),
            }
        }
    }
}

fn group_by_instance<'a>(
    records: &'a [PathRecord],
    request: &LwM2mPath,
) -> Result<BTreeMap<u16, Vec<&'a PathRecord>>, CodecError> {
    let mut by_instance: BTreeMap<u16, Vec<&PathRecord>> = BTreeMap::new();
    for record in records {
        let instance_id = record
            .path
            .object_instance_id()
            .ok_or_else(|| CodecError::decode(request, "record lacks an object instance id"))?;
        by_instance.entry(instance_id).or_default().push(record);
    }
    Ok(by_instance)
}

fn extract_resources(
    records: &[&PathRecord],
    request: &LwM2mPath,
    model: &dyn LwM2mModel,
) -> Result<BTreeMap<u16, LwM2mResource>, CodecError> {
    let mut resources: BTreeMap<u16, LwM2mResource> = BTreeMap::new();
    let mut multi: BTreeMap<u16, (LwM2mPath, BTreeMap<u16, SenMLValue>)> = BTreeMap::new();

    for record in records {
        let resource_id = record
            .path
            .resource_id()
            .ok_or_else(|| CodecError::decode(&record.path, "record lacks a resource id"))?;

        if let Some(resource_instance_id) = record.path.resource_instance_id() {
            let resource_path = record.path.to_resource_path().unwrap_or(record.path);
            let (_, instances) = multi
                .entry(resource_id)
                .or_insert_with(|| (resource_path, BTreeMap::new()));
            if instances
                .insert(resource_instance_id, record.value.clone())
                .is_some()
            {
                return Err(CodecError::decode(
                    &record.path,
                    format!(
                        "2 resource instances with the same identifier {}",
                        resource_instance_id
                    ),
                ));
            }
        } else {
            let kind = resource_type(&record.path, model, Some(&record.value));
            let value = parse_value(&record.value, kind, &record.path)?;
            if resources
                .insert(resource_id, LwM2mResource::single(resource_id, value))
                .is_some()
            {
                return Err(CodecError::decode(
                    &record.path,
                    format!("2 resources with the same identifier {}", resource_id),
                ));
            }
        }
    }

    for (resource_id, (resource_path, raw_instances)) in multi {
        let kind = resource_type(&resource_path, model, raw_instances.values().next());
        let mut instances = BTreeMap::new();
        for (resource_instance_id, raw) in raw_instances {
            instances.insert(resource_instance_id, parse_value(&raw, kind, &resource_path)?);
        }
        let previous = resources.insert(
            resource_id,
            LwM2mResource::Multiple {
                id: resource_id,
                kind,
                instances,
            },
        );
        if previous.is_some() {
            return Err(CodecError::decode(
                &resource_path,
                format!(
                    "resource {} appears both single valued and multi instance",
                    resource_id
                ),
            ));
        }
    }

    // An empty payload targeting a resource means an empty multi-instance
    // resource, unless the model declares the resource single valued.
    if resources.is_empty() && request.is_resource() {
        if let (Some(object_id), Some(resource_id)) = (request.object_id(), request.resource_id())
        {
            if model
                .resource_model(object_id, resource_id)
                .is_none_or(|declared| declared.multiple)
            {
                let kind = resource_type(request, model, None);
                resources.insert(resource_id, LwM2mResource::multiple(resource_id, kind, vec![]));
            } else {
                return Err(CodecError::decode(
                    request,
                    "no value for a single valued resource",
                ));
            }
        }
    }

    Ok(resources)
}

/// Type priority: the model's declared type wins, then the type the wire
/// representation implies, then STRING.
fn resource_type(
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
    sample: Option<&SenMLValue>,
) -> ResourceType {
    if let (Some(object_id), Some(resource_id)) = (path.object_id(), path.resource_id()) {
        if let Some(declared) = model
            .resource_model(object_id, resource_id)
            .and_then(|resource| resource.kind)
        {
            return declared;
        }
    }
    match sample {
        Some(SenMLValue::Number(_)) => ResourceType::Float,
        Some(SenMLValue::Boolean(_)) => ResourceType::Boolean,
        Some(SenMLValue::Opaque(_)) => ResourceType::Opaque,
        Some(SenMLValue::ObjectLink(_)) => ResourceType::ObjLink,
        Some(SenMLValue::String(_)) | None => ResourceType::String,
    }
}

fn parse_value(
    raw: &SenMLValue,
    expected: ResourceType,
    path: &LwM2mPath,
) -> Result<ResourceValue, CodecError> {
    match (expected, raw) {
        (ResourceType::Integer, SenMLValue::Number(n)) => n
            .as_i64()
            .map(ResourceValue::Integer)
            .ok_or_else(|| CodecError::invalid_value(path, format!("{} is not an integer", n))),
        (ResourceType::Float, SenMLValue::Number(n)) => Ok(ResourceValue::Float(n.as_f64())),
        (ResourceType::Boolean, SenMLValue::Boolean(b)) => Ok(ResourceValue::Boolean(*b)),
        (ResourceType::String, SenMLValue::String(s)) => Ok(ResourceValue::String(s.clone())),
        // SenML times are epoch seconds, LWM2M TIME values epoch milliseconds.
        (ResourceType::Time, SenMLValue::Number(n)) => n
            .as_i64()
            .map(|seconds| ResourceValue::Time(seconds * 1000))
            .ok_or_else(|| {
                CodecError::invalid_value(path, format!("{} is not a whole number of seconds", n))
            }),
        (ResourceType::Opaque, SenMLValue::Opaque(bytes)) => {
            Ok(ResourceValue::Opaque(bytes.clone()))
        }
        (ResourceType::Opaque, SenMLValue::String(s)) => lwm2m_senml::json::base64_decode(s)
            .map(ResourceValue::Opaque)
            .map_err(|e| CodecError::invalid_value(path, e)),
        (ResourceType::ObjLink, SenMLValue::ObjectLink(link))
        | (ResourceType::ObjLink, SenMLValue::String(link)) => link
            .parse::<ObjectLink>()
            .map(ResourceValue::ObjectLink)
            .map_err(|e| CodecError::invalid_value(path, e.message)),
        (ResourceType::None, _) => Err(CodecError::invalid_value(
            path,
            "an executable resource cannot carry a value",
        )),
        (expected, other) => Err(CodecError::invalid_value(
            path,
            format!("{:?} cannot be interpreted as {}", other, expected),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectModel, ResourceModel, StaticModel};

    fn device_model() -> StaticModel {
        StaticModel::with_objects(vec![ObjectModel::new(
            3,
            "Device",
            vec![
                ResourceModel::new(0, "Manufacturer", ResourceType::String),
                ResourceModel::new(6, "Available Power Sources", ResourceType::Integer).multiple(),
                ResourceModel::new(9, "Battery Level", ResourceType::Integer),
                ResourceModel::new(13, "Current Time", ResourceType::Time),
            ],
        )])
    }

    fn decode_json(
        payload: &str,
        path: &str,
        model: &StaticModel,
        kind: NodeKind,
    ) -> Result<LwM2mNode, CodecError> {
        let path: LwM2mPath = path.parse().unwrap();
        decode_node(payload.as_bytes(), ContentFormat::SenMlJson, &path, model, kind)
    }

    #[test]
    fn test_decode_single_resource() {
        let node = decode_json(
            r#"[{"bn":"/3/0/9","v":95}]"#,
            "/3/0/9",
            &device_model(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::single(9, ResourceValue::Integer(95)))
        );
    }

    #[test]
    fn test_decode_object_instance_groups_resources() {
        let node = decode_json(
            r#"[{"bn":"/3/0/","n":"0","vs":"ACME"},{"n":"9","v":95},{"n":"6/0","v":1},{"n":"6/1","v":5}]"#,
            "/3/0",
            &device_model(),
            NodeKind::ObjectInstance,
        )
        .unwrap();

        let instance = match node {
            LwM2mNode::ObjectInstance(instance) => instance,
            other => panic!("expected instance, got {:?}", other),
        };
        assert_eq!(instance.id, 0);
        assert_eq!(
            instance.resource(0),
            Some(&LwM2mResource::single(
                0,
                ResourceValue::String("ACME".into())
            ))
        );
        assert_eq!(
            instance.resource(6),
            Some(&LwM2mResource::multiple(
                6,
                ResourceType::Integer,
                vec![(0, ResourceValue::Integer(1)), (1, ResourceValue::Integer(5))],
            ))
        );
    }

    #[test]
    fn test_decode_object_with_two_instances() {
        let node = decode_json(
            r#"[{"bn":"/3/","n":"0/9","v":95},{"n":"1/9","v":47}]"#,
            "/3",
            &device_model(),
            NodeKind::Object,
        )
        .unwrap();

        let object = match node {
            LwM2mNode::Object(object) => object,
            other => panic!("expected object, got {:?}", other),
        };
        assert_eq!(object.id, 3);
        assert_eq!(object.instances.len(), 2);
        assert_eq!(
            object.instance(1).and_then(|i| i.resource(9)),
            Some(&LwM2mResource::single(9, ResourceValue::Integer(47)))
        );
    }

    #[test]
    fn test_time_seconds_become_milliseconds() {
        let node = decode_json(
            r#"[{"bn":"/3/0/13","v":1700000000}]"#,
            "/3/0/13",
            &device_model(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::single(
                13,
                ResourceValue::Time(1_700_000_000_000)
            ))
        );
    }

    #[test]
    fn test_untyped_number_falls_back_to_float() {
        let node = decode_json(
            r#"[{"bn":"/3303/0/5700","v":22}]"#,
            "/3303/0/5700",
            &StaticModel::new(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::single(5700, ResourceValue::Float(22.0)))
        );
    }

    #[test]
    fn test_record_outside_request_path_rejected() {
        let err = decode_json(
            r#"[{"bn":"/4/0/9","v":95}]"#,
            "/3/0",
            &device_model(),
            NodeKind::ObjectInstance,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_record_addressing_instance_rejected() {
        let err = decode_json(
            r#"[{"bn":"/3/0","v":95}]"#,
            "/3/0",
            &device_model(),
            NodeKind::ObjectInstance,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let err = decode_json(
            r#"[{"bn":"/3/0/","n":"9","v":95},{"n":"9","v":47}]"#,
            "/3/0",
            &device_model(),
            NodeKind::ObjectInstance,
        )
        .unwrap_err();
        assert!(err.to_string().contains("same identifier"));
    }

    #[test]
    fn test_single_and_multi_conflict_rejected() {
        let err = decode_json(
            r#"[{"bn":"/3/0/","n":"6","v":1},{"n":"6/0","v":2}]"#,
            "/3/0",
            &device_model(),
            NodeKind::ObjectInstance,
        )
        .unwrap_err();
        assert!(err.to_string().contains("single valued and multi instance"));
    }

    #[test]
    fn test_empty_payload_synthesizes_empty_multi_resource() {
        let node = decode_json("[]", "/3/0/6", &device_model(), NodeKind::Resource).unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::multiple(6, ResourceType::Integer, vec![]))
        );
    }

    #[test]
    fn test_empty_payload_for_single_valued_resource_rejected() {
        let err = decode_json("[]", "/3/0/9", &device_model(), NodeKind::Resource).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));

        // Without a model the resource shape is unknown and the empty
        // multi-instance reading stands.
        let node =
            decode_json("[]", "/3/0/9", &StaticModel::new(), NodeKind::Resource).unwrap();
        assert!(matches!(
            node,
            LwM2mNode::Resource(LwM2mResource::Multiple { .. })
        ));
    }

    #[test]
    fn test_timestamped_payload_rejected_by_singular_decode() {
        let err = decode_json(
            r#"[{"bn":"/3303/0/5700","bt":1700000000,"v":21.0},{"t":10,"v":22.0}]"#,
            "/3303/0/5700",
            &StaticModel::new(),
            NodeKind::Resource,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_timestamped_decode_most_recent_first() {
        let path: LwM2mPath = "/3303/0/5700".parse().unwrap();
        let payload =
            br#"[{"bn":"/3303/0/5700","bt":1700000000,"v":21.0},{"t":10,"v":22.0},{"t":5,"v":21.5}]"#;
        let series = decode_timestamped(
            payload,
            ContentFormat::SenMlJson,
            &path,
            &StaticModel::new(),
            NodeKind::Resource,
        )
        .unwrap();

        let timestamps: Vec<Option<i64>> = series.iter().map(|t| t.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![
                Some(1_700_000_010),
                Some(1_700_000_005),
                Some(1_700_000_000)
            ]
        );
        assert_eq!(
            series[0].node,
            LwM2mNode::Resource(LwM2mResource::single(5700, ResourceValue::Float(22.0)))
        );
    }

    #[test]
    fn test_untimed_group_first() {
        let path: LwM2mPath = "/3303/0/5700".parse().unwrap();
        let payload = br#"[{"bn":"/3303/0/5700","t":1700000000,"v":21.0},{"v":22.0}]"#;
        let series = decode_timestamped(
            payload,
            ContentFormat::SenMlJson,
            &path,
            &StaticModel::new(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(series[0].timestamp, None);
        assert_eq!(series[1].timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_objlnk_decoding() {
        let node = decode_json(
            r#"[{"bn":"/25/0/0","vlo":"1:3"}]"#,
            "/25/0/0",
            &StaticModel::new(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::single(
                0,
                ResourceValue::ObjectLink(ObjectLink::new(1, 3))
            ))
        );
    }

    #[test]
    fn test_cbor_decode() {
        use lwm2m_senml::{SenMLPack, SenMLRecord};

        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("9", 95i64).with_base_name("/3/0/"));
        let bytes = pack.to_cbor().unwrap();

        let path: LwM2mPath = "/3/0/9".parse().unwrap();
        let node = decode_node(
            &bytes,
            ContentFormat::SenMlCbor,
            &path,
            &device_model(),
            NodeKind::Resource,
        )
        .unwrap();
        assert_eq!(
            node,
            LwM2mNode::Resource(LwM2mResource::single(9, ResourceValue::Integer(95)))
        );
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let err = decode_json("not json", "/3/0", &device_model(), NodeKind::ObjectInstance)
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
