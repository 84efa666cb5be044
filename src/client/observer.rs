//! Client lifecycle observation

use crate::request::{RegisterRequest, UpdateRequest, UplinkResponse};

use super::servers::ServerIdentity;

/// Receives notifications about the registration engine's progress.
///
/// Every method has a no-op default, so implementations only override
/// the events they care about. Callbacks run on the engine's tasks and
/// must not block.
pub trait LwM2mClientObserver: Send + Sync {
    fn on_bootstrap_started(&self, _server: &ServerIdentity) {}

    fn on_bootstrap_success(&self, _server: &ServerIdentity) {}

    fn on_bootstrap_failure(&self, _server: &ServerIdentity, _response: &UplinkResponse) {}

    fn on_bootstrap_timeout(&self, _server: &ServerIdentity) {}

    fn on_registration_started(&self, _server: &ServerIdentity, _request: &RegisterRequest) {}

    fn on_registration_success(
        &self,
        _server: &ServerIdentity,
        _request: &RegisterRequest,
        _registration_id: &str,
    ) {
    }

    fn on_registration_failure(
        &self,
        _server: &ServerIdentity,
        _request: &RegisterRequest,
        _response: &UplinkResponse,
    ) {
    }

    fn on_registration_timeout(&self, _server: &ServerIdentity, _request: &RegisterRequest) {}

    fn on_update_started(&self, _server: &ServerIdentity, _request: &UpdateRequest) {}

    fn on_update_success(&self, _server: &ServerIdentity, _request: &UpdateRequest) {}

    fn on_update_failure(
        &self,
        _server: &ServerIdentity,
        _request: &UpdateRequest,
        _response: &UplinkResponse,
    ) {
    }

    fn on_update_timeout(&self, _server: &ServerIdentity, _request: &UpdateRequest) {}

    fn on_deregistration_success(&self, _server: &ServerIdentity, _registration_id: &str) {}

    fn on_deregistration_failure(&self, _server: &ServerIdentity, _response: &UplinkResponse) {}

    fn on_deregistration_timeout(&self, _server: &ServerIdentity) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LwM2mClientObserver for NoopObserver {}
