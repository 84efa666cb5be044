//! The registration engine
//!
//! Drives the client lifecycle: bootstrap when no usable server
//! configuration exists, register against each configured
//! device-management server, refresh the registration before its
//! lifetime lapses and deregister on shutdown. Each stage runs as a
//! scheduled tokio task; a shared async lock serializes their bodies so
//! the engine never runs two protocol exchanges at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::lock;
use crate::request::{
    BootstrapRequest, DeregisterRequest, RegisterRequest, RegistrationUpdate, ResponseCode,
    SendError, UpdateRequest, UplinkRequest, UplinkResponse,
};

use super::bootstrap::BootstrapHandler;
use super::observer::LwM2mClientObserver;
use super::servers::{
    DmServerInfo, EndpointsManager, LwM2mRequestSender, ServerIdentity, ServerInfoProvider,
};

/// A registration the engine currently maintains.
#[derive(Clone)]
struct RegisteredServer {
    server: Arc<ServerIdentity>,
    lifetime: u64,
}

/// A spawned lifecycle task. Cancelling only prevents a body that has
/// not started yet; rescheduling never interrupts a running exchange.
/// `stop` and `destroy` additionally abort the handle, which does cut a
/// running exchange short.
struct ScheduledTask {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct EngineState {
    started: bool,
    bootstrap_task: Option<ScheduledTask>,
    register_task: Option<ScheduledTask>,
    update_task: Option<ScheduledTask>,
}

impl EngineState {
    fn take_tasks(&mut self) -> Vec<ScheduledTask> {
        [
            self.bootstrap_task.take(),
            self.register_task.take(),
            self.update_task.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

enum BootstrapOutcome {
    Finished,
    Retry,
    NoServer,
}

/// The engine refuses to start without at least one configured server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no bootstrap or device management server configured for '{endpoint}'")]
pub struct NoServerConfiguredError {
    pub endpoint: String,
}

/// See the [module documentation](self).
pub struct RegistrationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    endpoint: String,
    object_links: Vec<String>,
    additional_attributes: Vec<(String, String)>,
    provider: Arc<dyn ServerInfoProvider>,
    sender: Arc<dyn LwM2mRequestSender>,
    endpoints: Arc<dyn EndpointsManager>,
    bootstrap_handler: Arc<BootstrapHandler>,
    observer: Arc<dyn LwM2mClientObserver>,
    config: EngineConfig,
    /// Registration id to the server that granted it.
    registered_servers: Mutex<HashMap<String, RegisteredServer>>,
    /// Changes to carry on the next update, set by a triggered update.
    pending_update: Mutex<Option<RegistrationUpdate>>,
    state: Mutex<EngineState>,
    /// Serializes task bodies; at most one protocol exchange at a time.
    task_lock: AsyncMutex<()>,
}

impl RegistrationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new<E: Into<String>>(
        endpoint: E,
        provider: Arc<dyn ServerInfoProvider>,
        sender: Arc<dyn LwM2mRequestSender>,
        endpoints: Arc<dyn EndpointsManager>,
        bootstrap_handler: Arc<BootstrapHandler>,
        observer: Arc<dyn LwM2mClientObserver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                endpoint: endpoint.into(),
                object_links: Vec::new(),
                additional_attributes: Vec::new(),
                provider,
                sender,
                endpoints,
                bootstrap_handler,
                observer,
                config,
                registered_servers: Mutex::new(HashMap::new()),
                pending_update: Mutex::new(None),
                state: Mutex::new(EngineState::default()),
                task_lock: AsyncMutex::new(()),
            }),
        }
    }

    /// Set the CoRE links advertised at registration. Must be called
    /// before [`start`](Self::start).
    pub fn with_object_links(mut self, links: Vec<String>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.object_links = links,
            None => warn!("object links can only be set before the engine is shared"),
        }
        self
    }

    /// Set additional register attributes. Must be called before
    /// [`start`](Self::start).
    pub fn with_additional_attributes(mut self, attributes: Vec<(String, String)>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.additional_attributes = attributes,
            None => warn!("attributes can only be set before the engine is shared"),
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// One of the currently held registration ids, if any.
    pub fn registration_id(&self) -> Option<String> {
        lock(&self.inner.registered_servers).keys().next().cloned()
    }

    pub fn registration_ids(&self) -> Vec<String> {
        lock(&self.inner.registered_servers).keys().cloned().collect()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.inner.state).started
    }

    /// Begin the lifecycle: register now, or bootstrap when no
    /// device-management server is configured. Fails when the provider
    /// yields neither kind of server.
    pub fn start(&self) -> Result<(), NoServerConfiguredError> {
        let info = self.inner.provider.servers_info();
        if info.bootstrap.is_none() && info.device_management.is_empty() {
            return Err(NoServerConfiguredError {
                endpoint: self.inner.endpoint.clone(),
            });
        }
        {
            let mut state = lock(&self.inner.state);
            if state.started {
                return Ok(());
            }
            state.started = true;
        }
        info!(endpoint = %self.inner.endpoint, "starting registration engine");
        self.inner.schedule_register(Duration::ZERO);
        Ok(())
    }

    /// Send a registration update ahead of schedule.
    pub fn trigger_registration_update(&self) {
        debug!("registration update triggered");
        self.inner.schedule_update(Duration::ZERO);
    }

    /// Send a registration update ahead of schedule, carrying changed
    /// registration fields.
    pub fn trigger_registration_update_with(&self, changes: RegistrationUpdate) {
        debug!("registration update with changes triggered");
        *lock(&self.inner.pending_update) = Some(changes);
        self.inner.schedule_update(Duration::ZERO);
    }

    /// Stop the lifecycle, optionally deregistering first.
    pub async fn stop(&self, deregister: bool) {
        let tasks = {
            let mut state = lock(&self.inner.state);
            if !state.started {
                return;
            }
            state.started = false;
            state.take_tasks()
        };
        for task in &tasks {
            task.cancel();
            task.handle.abort();
        }
        if deregister {
            self.inner.deregister_all().await;
        }
        info!(endpoint = %self.inner.endpoint, "registration engine stopped");
    }

    /// Stop and wait for the engine's tasks to wind down.
    pub async fn destroy(&self, deregister: bool) {
        let tasks = {
            let mut state = lock(&self.inner.state);
            state.started = false;
            state.take_tasks()
        };
        let handles: Vec<JoinHandle<()>> = tasks
            .into_iter()
            .map(|task| {
                task.cancel();
                task.handle.abort();
                task.handle
            })
            .collect();
        let wind_down = self.inner.config.bootstrap_session_timeout();
        if tokio::time::timeout(wind_down, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("engine tasks did not terminate in time");
        }
        if deregister {
            self.inner.deregister_all().await;
        }
    }
}

impl EngineInner {
    fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    fn spawn_task<F, Fut>(self: &Arc<Self>, delay: Duration, body: F) -> ScheduledTask
    where
        F: FnOnce(Arc<EngineInner>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::Relaxed) {
                return;
            }
            let _guard = inner.task_lock.lock().await;
            if flag.load(Ordering::Relaxed) || !inner.is_started() {
                return;
            }
            body(Arc::clone(&inner)).await;
        });
        ScheduledTask { cancelled, handle }
    }

    fn schedule_register(self: &Arc<Self>, delay: Duration) {
        let mut state = lock(&self.state);
        if !state.started {
            return;
        }
        if let Some(previous) = state.register_task.take() {
            previous.cancel();
        }
        state.register_task =
            Some(self.spawn_task(delay, |inner| async move { inner.register_all().await }));
    }

    fn schedule_update(self: &Arc<Self>, delay: Duration) {
        let mut state = lock(&self.state);
        if !state.started {
            return;
        }
        if let Some(previous) = state.update_task.take() {
            previous.cancel();
        }
        state.update_task =
            Some(self.spawn_task(delay, |inner| async move { inner.update_all().await }));
    }

    fn schedule_bootstrap(self: &Arc<Self>, delay: Duration) {
        let mut state = lock(&self.state);
        if !state.started {
            return;
        }
        if let Some(previous) = state.bootstrap_task.take() {
            previous.cancel();
        }
        state.bootstrap_task =
            Some(self.spawn_task(delay, |inner| async move { inner.bootstrap_once().await }));
    }

    async fn register_all(self: &Arc<Self>) {
        let info = self.provider.servers_info();
        if info.device_management.is_empty() {
            warn!("no device management server configured, trying bootstrap");
            self.schedule_bootstrap(Duration::ZERO);
            return;
        }
        let has_bootstrap = info.bootstrap.is_some();
        for dm in &info.device_management {
            if !self.is_started() {
                return;
            }
            self.register(dm, has_bootstrap).await;
        }
    }

    async fn register(self: &Arc<Self>, dm: &DmServerInfo, has_bootstrap: bool) {
        let server = match self.endpoints.create_endpoint(dm).await {
            Ok(server) => Arc::new(server),
            Err(e) => {
                error!(uri = %dm.server_uri, error = %e, "unable to create endpoint");
                self.schedule_register(self.config.retry_wait());
                return;
            }
        };
        let request = match RegisterRequest::new(&self.endpoint, dm.lifetime, dm.binding.clone()) {
            Ok(request) => request
                .with_object_links(self.object_links.clone())
                .with_additional_attributes(self.additional_attributes.clone()),
            Err(e) => {
                error!(error = %e, "invalid registration parameters");
                return;
            }
        };

        info!(%server, "registering");
        self.observer.on_registration_started(&server, &request);

        match self
            .send_with_retry(&server, UplinkRequest::Register(request.clone()))
            .await
        {
            Ok(Some(response)) if response.is_success() => match &response.registration_id {
                Some(id) => {
                    info!(%server, registration_id = %id, "registered");
                    lock(&self.registered_servers).insert(
                        id.clone(),
                        RegisteredServer {
                            server: Arc::clone(&server),
                            lifetime: dm.lifetime,
                        },
                    );
                    self.observer.on_registration_success(&server, &request, id);
                    self.schedule_update(self.config.next_update_delay(dm.lifetime));
                }
                None => {
                    error!(%server, "registration accepted without a registration id");
                    self.observer
                        .on_registration_failure(&server, &request, &response);
                    self.after_registration_failure(has_bootstrap);
                }
            },
            Ok(Some(response)) => {
                warn!(%server, code = %response.code, "registration rejected");
                self.observer
                    .on_registration_failure(&server, &request, &response);
                self.after_registration_failure(has_bootstrap);
            }
            Ok(None) => {
                warn!(%server, "registration timeout");
                self.observer.on_registration_timeout(&server, &request);
                self.after_registration_failure(has_bootstrap);
            }
            Err(e) => {
                error!(%server, error = %e, "unable to send registration");
                self.after_registration_failure(has_bootstrap);
            }
        }
    }

    fn after_registration_failure(self: &Arc<Self>, has_bootstrap: bool) {
        if has_bootstrap {
            self.schedule_bootstrap(Duration::ZERO);
        } else {
            self.schedule_register(self.config.retry_wait());
        }
    }

    async fn update_all(self: &Arc<Self>) {
        let registrations: Vec<(String, RegisteredServer)> = lock(&self.registered_servers)
            .iter()
            .map(|(id, registered)| (id.clone(), registered.clone()))
            .collect();
        if registrations.is_empty() {
            debug!("no registration to update");
            return;
        }
        for (id, registered) in registrations {
            if !self.is_started() {
                return;
            }
            self.update(&registered, &id).await;
        }
    }

    async fn update(self: &Arc<Self>, registered: &RegisteredServer, registration_id: &str) {
        let server = &registered.server;
        let request = match UpdateRequest::new(registration_id) {
            Ok(request) => match lock(&self.pending_update).take() {
                Some(changes) => request.with_changes(changes),
                None => request,
            },
            Err(e) => {
                error!(error = %e, "invalid update parameters");
                return;
            }
        };

        if self.config.reconnect_on_update {
            self.endpoints.force_reconnection(server).await;
        }
        debug!(%server, registration_id, "updating registration");
        self.observer.on_update_started(server, &request);

        match self
            .send_with_retry(server, UplinkRequest::Update(request.clone()))
            .await
        {
            Ok(Some(response)) if response.is_success() => {
                debug!(%server, "registration updated");
                self.observer.on_update_success(server, &request);
                // A changed lifetime replaces the registered one.
                let lifetime = match request.lifetime {
                    Some(lifetime) => {
                        if let Some(entry) =
                            lock(&self.registered_servers).get_mut(registration_id)
                        {
                            entry.lifetime = lifetime;
                        }
                        lifetime
                    }
                    None => registered.lifetime,
                };
                self.schedule_update(self.config.next_update_delay(lifetime));
            }
            Ok(Some(response)) => {
                warn!(%server, code = %response.code, "update rejected, registration lost");
                self.observer.on_update_failure(server, &request, &response);
                lock(&self.registered_servers).remove(registration_id);
                self.schedule_register(Duration::ZERO);
            }
            Ok(None) => {
                warn!(%server, "update timeout, registration considered lost");
                self.observer.on_update_timeout(server, &request);
                lock(&self.registered_servers).remove(registration_id);
                self.schedule_register(Duration::ZERO);
            }
            Err(e) => {
                error!(%server, error = %e, "unable to send update");
                self.schedule_register(self.config.retry_wait());
            }
        }
    }

    async fn bootstrap_once(self: &Arc<Self>) {
        if !self.bootstrap_handler.try_init_session() {
            warn!("bootstrap session already in progress");
            return;
        }
        let outcome = self.bootstrap().await;
        // The claim is released whatever happened, so a later attempt can
        // start a fresh session.
        self.bootstrap_handler.close_session();
        match outcome {
            BootstrapOutcome::Finished => self.schedule_register(Duration::ZERO),
            BootstrapOutcome::Retry => self.schedule_bootstrap(self.config.retry_wait()),
            // With no bootstrap server left to try, fall back to a fresh
            // register attempt after the backoff.
            BootstrapOutcome::NoServer => self.schedule_register(self.config.retry_wait()),
        }
    }

    async fn bootstrap(&self) -> BootstrapOutcome {
        let info = self.provider.servers_info();
        let bootstrap_info = match info.bootstrap {
            Some(bootstrap_info) => bootstrap_info,
            None => {
                error!("unable to bootstrap, no bootstrap server configured");
                return BootstrapOutcome::NoServer;
            }
        };

        // The bootstrap server rewrites the configuration, so existing
        // registrations are void.
        lock(&self.registered_servers).clear();

        let server = match self.endpoints.create_bootstrap_endpoint(&bootstrap_info).await {
            Ok(server) => server,
            Err(e) => {
                error!(uri = %bootstrap_info.server_uri, error = %e, "unable to create bootstrap endpoint");
                return BootstrapOutcome::Retry;
            }
        };
        let request = match BootstrapRequest::new(&self.endpoint) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "invalid bootstrap parameters");
                return BootstrapOutcome::Retry;
            }
        };

        info!(%server, "starting bootstrap session");
        self.observer.on_bootstrap_started(&server);

        match self
            .sender
            .send(
                &server,
                UplinkRequest::Bootstrap(request),
                self.config.request_timeout(),
            )
            .await
        {
            Ok(Some(response)) if response.is_success() => {
                debug!(%server, "bootstrap accepted, waiting for the session to finish");
                if self
                    .bootstrap_handler
                    .wait_finished(self.config.bootstrap_session_timeout())
                    .await
                {
                    info!(%server, "bootstrap finished");
                    self.observer.on_bootstrap_success(&server);
                    BootstrapOutcome::Finished
                } else {
                    warn!(%server, "bootstrap session timeout");
                    self.observer.on_bootstrap_timeout(&server);
                    BootstrapOutcome::Retry
                }
            }
            Ok(Some(response)) => {
                warn!(%server, code = %response.code, "bootstrap rejected");
                self.observer.on_bootstrap_failure(&server, &response);
                BootstrapOutcome::Retry
            }
            Ok(None) => {
                warn!(%server, "bootstrap timeout");
                self.observer.on_bootstrap_timeout(&server);
                BootstrapOutcome::Retry
            }
            Err(e) => {
                error!(%server, error = %e, "unable to send bootstrap request");
                BootstrapOutcome::Retry
            }
        }
    }

    /// Send with one retry over a fresh connection. Most request
    /// timeouts come from a stale security association, which the
    /// reconnection clears.
    async fn send_with_retry(
        &self,
        server: &ServerIdentity,
        request: UplinkRequest,
    ) -> Result<Option<UplinkResponse>, SendError> {
        let timeout = self.config.request_timeout();
        match self.sender.send(server, request.clone(), timeout).await? {
            Some(response) => Ok(Some(response)),
            None => {
                debug!(%server, kind = request.name(), "timeout, retrying over a fresh connection");
                self.endpoints.force_reconnection(server).await;
                self.sender.send(server, request, timeout).await
            }
        }
    }

    async fn deregister_all(&self) {
        let registrations: Vec<(String, RegisteredServer)> =
            lock(&self.registered_servers).drain().collect();
        for (id, registered) in registrations {
            self.deregister(&registered.server, &id).await;
        }
    }

    async fn deregister(&self, server: &ServerIdentity, registration_id: &str) {
        let request = match DeregisterRequest::new(registration_id) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "invalid deregistration parameters");
                return;
            }
        };
        info!(%server, registration_id, "deregistering");
        match self
            .sender
            .send(
                server,
                UplinkRequest::Deregister(request),
                self.config.deregistration_timeout(),
            )
            .await
        {
            // NOT_FOUND means the registration already lapsed, which is
            // just as final as a successful delete.
            Ok(Some(response))
                if response.is_success() || response.code == ResponseCode::NotFound =>
            {
                info!(%server, "deregistered");
                self.observer.on_deregistration_success(server, registration_id);
            }
            Ok(Some(response)) => {
                warn!(%server, code = %response.code, "deregistration rejected");
                self.observer.on_deregistration_failure(server, &response);
            }
            Ok(None) => {
                warn!(%server, "deregistration timeout");
                self.observer.on_deregistration_timeout(server);
            }
            Err(e) => {
                error!(%server, error = %e, "unable to send deregistration");
            }
        }
    }
}
