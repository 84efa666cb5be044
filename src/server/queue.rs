//! Queue-mode aware request sending
//!
//! Wraps a downlink sender so requests to a sleeping queue-mode client
//! fail fast instead of timing out on the wire, and so request outcomes
//! feed back into presence tracking: a response proves the client is
//! awake, a timeout proves it is not.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::request::{DownlinkRequest, DownlinkResponse, SendError};

use super::presence::PresenceService;
use super::registration::Registration;

/// Delivers downlink requests to a registered client.
#[async_trait]
pub trait DownlinkRequestSender: Send + Sync {
    /// `Ok(None)` means the request timed out.
    async fn send(
        &self,
        registration: &Registration,
        request: DownlinkRequest,
        timeout: Duration,
    ) -> Result<Option<DownlinkResponse>, SendError>;
}

/// Gates a downlink sender on client presence.
///
/// Requests to clients that do not use queue mode pass straight through.
pub struct QueueModeRequestSender<S> {
    delegate: S,
    presence: PresenceService,
}

impl<S> QueueModeRequestSender<S> {
    pub fn new(delegate: S, presence: PresenceService) -> Self {
        Self { delegate, presence }
    }
}

#[async_trait]
impl<S: DownlinkRequestSender> DownlinkRequestSender for QueueModeRequestSender<S> {
    async fn send(
        &self,
        registration: &Registration,
        request: DownlinkRequest,
        timeout: Duration,
    ) -> Result<Option<DownlinkResponse>, SendError> {
        if !registration.uses_queue_mode() {
            return self.delegate.send(registration, request, timeout).await;
        }

        if !self.presence.is_client_awake(&registration.endpoint) {
            debug!(endpoint = %registration.endpoint, "client is sleeping, request not sent");
            return Err(SendError::ClientSleeping {
                endpoint: registration.endpoint.clone(),
            });
        }

        let result = self.delegate.send(registration, request, timeout).await;
        match &result {
            // A response is traffic from the client, it re-arms the
            // awake window.
            Ok(Some(_)) => self.presence.set_awake(registration),
            Ok(None) => self.presence.client_not_responding(registration),
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock;
    use crate::node::LwM2mPath;
    use crate::request::{BindingMode, ResponseCode};
    use std::sync::{Arc, Mutex};

    struct ScriptedSender {
        responses: Mutex<Vec<Result<Option<DownlinkResponse>, SendError>>>,
        sent: Arc<Mutex<usize>>,
    }

    impl ScriptedSender {
        fn new(responses: Vec<Result<Option<DownlinkResponse>, SendError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                sent: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl DownlinkRequestSender for ScriptedSender {
        async fn send(
            &self,
            _registration: &Registration,
            _request: DownlinkRequest,
            _timeout: Duration,
        ) -> Result<Option<DownlinkResponse>, SendError> {
            *lock(&self.sent) += 1;
            let mut responses = lock(&self.responses);
            if responses.is_empty() {
                Ok(Some(DownlinkResponse {
                    code: ResponseCode::Content,
                    node: None,
                }))
            } else {
                responses.remove(0)
            }
        }
    }

    fn registration(binding: Vec<BindingMode>) -> Registration {
        Registration::new(
            "reg-1",
            "node-1",
            "192.0.2.1:5683".parse().unwrap(),
            300,
            binding,
        )
    }

    fn read_request() -> DownlinkRequest {
        DownlinkRequest::Read {
            path: "/3/0/9".parse::<LwM2mPath>().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_sleeping_client_fails_fast() {
        let presence = PresenceService::default();
        let sender = QueueModeRequestSender::new(ScriptedSender::new(vec![]), presence);
        let registration = registration(vec![BindingMode::U, BindingMode::Q]);

        let sent = sender.delegate.sent.clone();
        let result = sender
            .send(&registration, read_request(), Duration::from_secs(2))
            .await;

        assert_eq!(
            result,
            Err(SendError::ClientSleeping {
                endpoint: "node-1".to_string()
            })
        );
        // The delegate must not have been asked to do any network I/O.
        assert_eq!(*lock(&sent), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_marks_client_awake() {
        let presence = PresenceService::default();
        let sender =
            QueueModeRequestSender::new(ScriptedSender::new(vec![]), presence.clone());
        let registration = registration(vec![BindingMode::U, BindingMode::Q]);

        presence.set_awake(&registration);
        tokio::time::sleep(Duration::from_millis(60_000)).await;

        let result = sender
            .send(&registration, read_request(), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Ok(Some(_))));

        // The response re-armed the awake window past the original 93s.
        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert!(presence.is_client_awake("node-1"));
    }

    #[tokio::test]
    async fn test_timeout_marks_client_sleeping() {
        let presence = PresenceService::default();
        let sender = QueueModeRequestSender::new(
            ScriptedSender::new(vec![Ok(None)]),
            presence.clone(),
        );
        let registration = registration(vec![BindingMode::U, BindingMode::Q]);

        presence.set_awake(&registration);
        let result = sender
            .send(&registration, read_request(), Duration::from_secs(2))
            .await;

        assert_eq!(result, Ok(None));
        assert!(!presence.is_client_awake("node-1"));
    }

    #[tokio::test]
    async fn test_non_queue_mode_client_passes_through() {
        let presence = PresenceService::default();
        let sender = QueueModeRequestSender::new(ScriptedSender::new(vec![]), presence);
        let registration = registration(vec![BindingMode::U]);

        let sent = sender.delegate.sent.clone();
        let result = sender
            .send(&registration, read_request(), Duration::from_secs(2))
            .await;

        assert!(matches!(result, Ok(Some(_))));
        assert_eq!(*lock(&sent), 1);
    }
}
