//! Node payload codecs
//!
//! Translation between [`LwM2mNode`](crate::node::LwM2mNode) trees and
//! SenML payloads, in both the JSON and CBOR representations. Decoding
//! needs the target path of the request that produced the payload, since
//! SenML records carry absolute names and the tree shape is recovered
//! relative to that path. An object model refines wire types; without one
//! the codec falls back to the type information each record carries.

mod decode;
mod encode;

use thiserror::Error;

use crate::node::{LwM2mNode, LwM2mPath, NodeKind};
use crate::model::LwM2mModel;

/// Negotiated payload representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// application/senml+json (CoAP content format 110)
    SenMlJson,
    /// application/senml+cbor (CoAP content format 112)
    SenMlCbor,
}

impl ContentFormat {
    /// The CoAP Content-Format registry code.
    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::SenMlJson => lwm2m_senml::content_format::SENML_JSON,
            ContentFormat::SenMlCbor => lwm2m_senml::content_format::SENML_CBOR,
        }
    }

    pub fn from_code(code: u16) -> Option<ContentFormat> {
        match code {
            lwm2m_senml::content_format::SENML_JSON => Some(ContentFormat::SenMlJson),
            lwm2m_senml::content_format::SENML_CBOR => Some(ContentFormat::SenMlCbor),
            _ => None,
        }
    }
}

/// A payload could not be decoded or a node could not be encoded.
///
/// Every variant names the path the failure relates to, so transport
/// layers can report which part of a composite payload was at fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Unable to decode payload [path:{path}]: {message}")]
    Decode { path: String, message: String },

    #[error("Unable to encode node [path:{path}]: {message}")]
    Encode { path: String, message: String },

    #[error("Invalid value [path:{path}]: {message}")]
    InvalidValue { path: String, message: String },
}

impl CodecError {
    pub(crate) fn decode<M: Into<String>>(path: &LwM2mPath, message: M) -> Self {
        CodecError::Decode {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn decode_at<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        CodecError::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn encode<M: Into<String>>(path: &LwM2mPath, message: M) -> Self {
        CodecError::Encode {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_value<M: Into<String>>(path: &LwM2mPath, message: M) -> Self {
        CodecError::InvalidValue {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// A node paired with the observation time its values were sampled at.
///
/// The timestamp is epoch seconds; `None` means "now" (the payload did
/// not carry explicit times).
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedNode {
    pub timestamp: Option<i64>,
    pub node: LwM2mNode,
}

/// Decode a payload into the node addressed by `path`.
///
/// The payload must describe exactly one point in time; historical
/// payloads are decoded with [`decode_timestamped`].
pub fn decode_node(
    content: &[u8],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<LwM2mNode, CodecError> {
    decode::decode_node(content, format, path, model, kind)
}

/// Decode a payload into a time series of nodes, most recent first.
pub fn decode_timestamped(
    content: &[u8],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
    kind: NodeKind,
) -> Result<Vec<TimestampedNode>, CodecError> {
    decode::decode_timestamped(content, format, path, model, kind)
}

/// Encode the node addressed by `path`.
pub fn encode_node(
    node: &LwM2mNode,
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    let entries = [(*path, Some(node.clone()))];
    encode::encode_nodes(&entries, format, model)
}

/// Encode several nodes into a single composite payload.
///
/// Entries with no node (for example unreadable paths of a composite
/// read) are skipped.
pub fn encode_nodes(
    nodes: &[(LwM2mPath, Option<LwM2mNode>)],
    format: ContentFormat,
    model: &dyn LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    encode::encode_nodes(nodes, format, model)
}

/// Encode a time series of nodes sampled at the same path.
pub fn encode_timestamped(
    nodes: &[TimestampedNode],
    format: ContentFormat,
    path: &LwM2mPath,
    model: &dyn LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    encode::encode_timestamped(nodes, format, path, model)
}
