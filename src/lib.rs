//! # LWM2M protocol core
//!
//! Transport-agnostic building blocks for the Lightweight M2M
//! device-management protocol:
//!
//! - [`client`]: the registration engine driving the client lifecycle
//!   (bootstrap, register, update, deregister) with retries and backoff.
//! - [`server`]: presence tracking and queue-mode gating for registered
//!   clients that sleep between their own requests.
//! - [`codec`]: translation between the LWM2M node tree and SenML
//!   payloads in JSON and CBOR.
//! - [`node`], [`model`], [`request`]: the shared protocol vocabulary.
//!
//! Networking is deliberately left out. Transports plug in through the
//! [`client::LwM2mRequestSender`], [`client::EndpointsManager`] and
//! [`server::DownlinkRequestSender`] traits.

pub mod client;
pub mod codec;
pub mod config;
pub mod model;
pub mod node;
pub mod request;
pub mod server;

pub use client::{BootstrapHandler, NoServerConfiguredError, RegistrationEngine};
pub use codec::{CodecError, ContentFormat, TimestampedNode};
pub use config::EngineConfig;
pub use model::{LwM2mModel, ObjectModel, ResourceModel, StaticModel};
pub use node::{
    InvalidPathError, LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mPath, LwM2mResource,
    NodeKind, ObjectLink, ResourceType, ResourceValue,
};
pub use request::{BindingMode, ResponseCode, SendError};
pub use server::{PresenceService, QueueModeRequestSender, Registration};

/// Lock a mutex, recovering the guard when a panicking holder poisoned
/// it. Engine state stays usable; the poisoning panic already surfaced
/// elsewhere.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
