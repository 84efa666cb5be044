//! Queue-mode presence tracking
//!
//! A queue-mode client is AWAKE from the moment any message arrives from
//! it until its awake window elapses without traffic, and SLEEPING
//! otherwise. Every observed message re-arms the window. Timers carry a
//! generation number; a timer whose generation no longer matches the
//! tracked state belongs to a superseded window and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::lock;

use super::registration::Registration;

/// Notified when a tracked client changes presence state.
///
/// Callbacks run on the service's timer tasks and must not block.
pub trait PresenceListener: Send + Sync {
    fn on_awake(&self, registration: &Registration);
    fn on_sleeping(&self, registration: &Registration);
}

/// How long a client stays reachable after its last message.
pub trait ClientAwakeTimeProvider: Send + Sync {
    fn client_awake_time(&self, registration: &Registration) -> Duration;
}

/// The same awake window for every client, 93 seconds by default.
#[derive(Debug, Clone, Copy)]
pub struct StaticClientAwakeTimeProvider {
    awake_time: Duration,
}

impl StaticClientAwakeTimeProvider {
    pub fn new(awake_time: Duration) -> Self {
        Self { awake_time }
    }
}

impl Default for StaticClientAwakeTimeProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(93_000))
    }
}

impl ClientAwakeTimeProvider for StaticClientAwakeTimeProvider {
    fn client_awake_time(&self, _registration: &Registration) -> Duration {
        self.awake_time
    }
}

struct PresenceState {
    registration: Registration,
    awake: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct PresenceInner {
    awake_time: Arc<dyn ClientAwakeTimeProvider>,
    listeners: Mutex<Vec<Arc<dyn PresenceListener>>>,
    states: Mutex<HashMap<String, PresenceState>>,
}

/// Tracks the presence of queue-mode clients, keyed by endpoint name.
#[derive(Clone)]
pub struct PresenceService {
    inner: Arc<PresenceInner>,
}

impl Default for PresenceService {
    fn default() -> Self {
        Self::new(Arc::new(StaticClientAwakeTimeProvider::default()))
    }
}

impl PresenceService {
    pub fn new(awake_time: Arc<dyn ClientAwakeTimeProvider>) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                awake_time,
                listeners: Mutex::new(Vec::new()),
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn PresenceListener>) {
        lock(&self.inner.listeners).push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PresenceListener>) {
        lock(&self.inner.listeners).retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Whether the client is currently reachable. Unknown endpoints are
    /// sleeping.
    pub fn is_client_awake(&self, endpoint: &str) -> bool {
        lock(&self.inner.states)
            .get(endpoint)
            .map(|state| state.awake)
            .is_some_and(|awake| awake)
    }

    /// Record traffic from the client: mark it awake and re-arm its
    /// awake window. Listeners are only notified on a sleep-to-awake
    /// transition, but the window restarts either way.
    pub fn set_awake(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            return;
        }

        let was_awake;
        {
            let mut states = lock(&self.inner.states);
            let state = states
                .entry(registration.endpoint.clone())
                .or_insert_with(|| PresenceState {
                    registration: registration.clone(),
                    awake: false,
                    generation: 0,
                    timer: None,
                });
            state.registration = registration.clone();
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            was_awake = state.awake;
            state.awake = true;

            let generation = state.generation;
            let window = self.inner.awake_time.client_awake_time(registration);
            let inner = Arc::clone(&self.inner);
            let endpoint = registration.endpoint.clone();
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                inner.awake_window_elapsed(&endpoint, generation);
            }));
        }

        if !was_awake {
            debug!(endpoint = %registration.endpoint, "client is awake");
            self.inner.notify_awake(registration);
        }
    }

    /// Mark the client sleeping before its window elapses, typically
    /// because a request to it timed out.
    pub fn set_sleeping(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            return;
        }

        let went_sleeping;
        {
            let mut states = lock(&self.inner.states);
            match states.get_mut(&registration.endpoint) {
                Some(state) if state.awake => {
                    state.awake = false;
                    state.generation += 1;
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                    went_sleeping = true;
                }
                _ => went_sleeping = false,
            }
        }

        if went_sleeping {
            debug!(endpoint = %registration.endpoint, "client is sleeping");
            self.inner.notify_sleeping(registration);
        }
    }

    /// A request to the client timed out while it was supposedly awake.
    pub fn client_not_responding(&self, registration: &Registration) {
        self.set_sleeping(registration);
    }

    /// Forget the client entirely, without a sleeping notification.
    /// Called when its registration ends.
    pub fn stop_presence_tracking(&self, registration: &Registration) {
        let mut states = lock(&self.inner.states);
        if let Some(state) = states.remove(&registration.endpoint) {
            if let Some(timer) = state.timer {
                timer.abort();
            }
        }
    }
}

impl PresenceInner {
    fn awake_window_elapsed(self: Arc<Self>, endpoint: &str, generation: u64) {
        let registration;
        {
            let mut states = lock(&self.states);
            match states.get_mut(endpoint) {
                // A generation mismatch means the window was re-armed or
                // ended after this timer was started.
                Some(state) if state.awake && state.generation == generation => {
                    state.awake = false;
                    state.timer = None;
                    registration = state.registration.clone();
                }
                _ => return,
            }
        }
        debug!(endpoint, "client awake window elapsed");
        self.notify_sleeping(&registration);
    }

    fn notify_awake(&self, registration: &Registration) {
        for listener in lock(&self.listeners).iter() {
            listener.on_awake(registration);
        }
    }

    fn notify_sleeping(&self, registration: &Registration) {
        for listener in lock(&self.listeners).iter() {
            listener.on_sleeping(registration);
        }
    }
}
