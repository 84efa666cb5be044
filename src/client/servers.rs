//! Server descriptions and transport seams
//!
//! The registration engine drives the protocol but never touches the
//! network itself. It learns which servers exist from a
//! [`ServerInfoProvider`], asks an [`EndpointsManager`] for connections
//! to them and exchanges messages through a [`LwM2mRequestSender`].

use std::time::Duration;

use async_trait::async_trait;

use crate::request::{BindingMode, SendError, UplinkRequest, UplinkResponse};

/// A connected server endpoint, as handed out by the endpoints manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    pub uri: String,
    pub bootstrap: bool,
}

impl ServerIdentity {
    pub fn server<U: Into<String>>(uri: U) -> Self {
        Self {
            uri: uri.into(),
            bootstrap: false,
        }
    }

    pub fn bootstrap_server<U: Into<String>>(uri: U) -> Self {
        Self {
            uri: uri.into(),
            bootstrap: true,
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }
}

impl std::fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.bootstrap {
            write!(f, "bootstrap server {}", self.uri)
        } else {
            write!(f, "server {}", self.uri)
        }
    }
}

/// Provisioned knowledge about a bootstrap server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_uri: String,
}

/// Provisioned knowledge about a device-management server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmServerInfo {
    pub server_uri: String,
    /// Registration lifetime in seconds.
    pub lifetime: u64,
    pub binding: Vec<BindingMode>,
}

/// Everything the engine knows about configured servers, typically read
/// from the security and server objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServersInfo {
    pub bootstrap: Option<ServerInfo>,
    pub device_management: Vec<DmServerInfo>,
}

/// Source of server configuration.
///
/// Bootstrap rewrites the configuration, so the engine re-reads it at
/// the start of every registration attempt.
pub trait ServerInfoProvider: Send + Sync {
    fn servers_info(&self) -> ServersInfo;
}

/// Creates and recycles the transport endpoints the engine talks through.
#[async_trait]
pub trait EndpointsManager: Send + Sync {
    /// Open an endpoint to the bootstrap server.
    async fn create_bootstrap_endpoint(
        &self,
        info: &ServerInfo,
    ) -> Result<ServerIdentity, SendError>;

    /// Open an endpoint to a device-management server.
    async fn create_endpoint(&self, info: &DmServerInfo) -> Result<ServerIdentity, SendError>;

    /// Tear down and re-establish the connection to a server. Called
    /// before retrying a request that timed out, since a stale security
    /// association is the most common cause.
    async fn force_reconnection(&self, server: &ServerIdentity);
}

/// Sends uplink requests and waits for their responses.
#[async_trait]
pub trait LwM2mRequestSender: Send + Sync {
    /// `Ok(None)` means the request timed out; transport failures are
    /// reported as errors.
    async fn send(
        &self,
        server: &ServerIdentity,
        request: UplinkRequest,
        timeout: Duration,
    ) -> Result<Option<UplinkResponse>, SendError>;
}
