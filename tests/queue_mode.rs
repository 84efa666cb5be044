//! End to end queue-mode behavior: presence tracking driven by client
//! traffic, and the gating sender honoring it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use lwm2m::node::LwM2mPath;
use lwm2m::request::{
    BindingMode, DownlinkRequest, DownlinkResponse, ResponseCode, SendError,
};
use lwm2m::server::{
    DownlinkRequestSender, PresenceListener, PresenceService, QueueModeRequestSender,
    Registration, StaticClientAwakeTimeProvider,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

struct CountingSender {
    deliveries: Mutex<usize>,
    timeout_next: Mutex<bool>,
}

impl CountingSender {
    fn new() -> Self {
        Self {
            deliveries: Mutex::new(0),
            timeout_next: Mutex::new(false),
        }
    }
}

#[async_trait]
impl DownlinkRequestSender for CountingSender {
    async fn send(
        &self,
        _registration: &Registration,
        _request: DownlinkRequest,
        _timeout: Duration,
    ) -> Result<Option<DownlinkResponse>, SendError> {
        *lock(&self.deliveries) += 1;
        if std::mem::take(&mut *lock(&self.timeout_next)) {
            return Ok(None);
        }
        Ok(Some(DownlinkResponse {
            code: ResponseCode::Content,
            node: None,
        }))
    }
}

#[derive(Default)]
struct Transitions {
    events: Mutex<Vec<String>>,
}

impl PresenceListener for Transitions {
    fn on_awake(&self, registration: &Registration) {
        lock(&self.events).push(format!("awake:{}", registration.endpoint));
    }

    fn on_sleeping(&self, registration: &Registration) {
        lock(&self.events).push(format!("sleeping:{}", registration.endpoint));
    }
}

fn queue_client(endpoint: &str) -> Registration {
    Registration::new(
        format!("reg-{}", endpoint),
        endpoint,
        "192.0.2.1:5683".parse().unwrap(),
        300,
        vec![BindingMode::U, BindingMode::Q],
    )
}

fn read(path: &str) -> DownlinkRequest {
    DownlinkRequest::Read {
        path: path.parse::<LwM2mPath>().unwrap(),
    }
}

#[tokio::test(start_paused = true)]
async fn requests_flow_only_while_the_client_is_awake() {
    let presence = PresenceService::new(Arc::new(StaticClientAwakeTimeProvider::new(
        Duration::from_secs(10),
    )));
    let transitions = Arc::new(Transitions::default());
    presence.add_listener(transitions.clone());

    let sender = QueueModeRequestSender::new(CountingSender::new(), presence.clone());
    let client = queue_client("node-1");

    // The client registers; the server observes the traffic.
    presence.set_awake(&client);

    let delivered = sender
        .send(&client, read("/3/0/9"), Duration::from_secs(2))
        .await;
    assert!(matches!(delivered, Ok(Some(_))));

    // The response re-armed the window; the original one would have
    // elapsed at 10s.
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert!(presence.is_client_awake("node-1"));

    // No traffic for a full window: the client is sleeping and requests
    // fail fast without reaching the transport.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!presence.is_client_awake("node-1"));

    let refused = sender
        .send(&client, read("/3/0/9"), Duration::from_secs(2))
        .await;
    assert_eq!(
        refused,
        Err(SendError::ClientSleeping {
            endpoint: "node-1".to_string()
        })
    );

    // The client sends a registration update and is reachable again.
    presence.set_awake(&client);
    let delivered = sender
        .send(&client, read("/3/0/9"), Duration::from_secs(2))
        .await;
    assert!(matches!(delivered, Ok(Some(_))));

    assert_eq!(
        lock(&transitions.events).clone(),
        vec!["awake:node-1", "sleeping:node-1", "awake:node-1"]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_while_awake_puts_the_client_to_sleep() {
    let presence = PresenceService::default();
    let transitions = Arc::new(Transitions::default());
    presence.add_listener(transitions.clone());

    let inner = CountingSender::new();
    *lock(&inner.timeout_next) = true;
    let sender = QueueModeRequestSender::new(inner, presence.clone());
    let client = queue_client("node-1");

    presence.set_awake(&client);
    let result = sender
        .send(&client, read("/3/0/9"), Duration::from_secs(2))
        .await;
    assert_eq!(result, Ok(None));
    assert!(!presence.is_client_awake("node-1"));

    // The elapsed window timer must not add a second sleeping event.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(
        lock(&transitions.events).clone(),
        vec!["awake:node-1", "sleeping:node-1"]
    );
}

#[tokio::test(start_paused = true)]
async fn deregistration_stops_tracking_silently() {
    let presence = PresenceService::default();
    let transitions = Arc::new(Transitions::default());
    presence.add_listener(transitions.clone());
    let client = queue_client("node-1");

    presence.set_awake(&client);
    presence.stop_presence_tracking(&client);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(lock(&transitions.events).clone(), vec!["awake:node-1"]);
    assert!(!presence.is_client_awake("node-1"));
}
