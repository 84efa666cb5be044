//! Protocol requests and responses
//!
//! Uplink messages travel from the client to a server (bootstrap,
//! register, update, deregister); downlink messages travel from a server
//! to a client (read, write, execute, observe). Requests validate their
//! fields at construction so transports only ever see well-formed
//! messages.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::node::{LwM2mNode, LwM2mPath};

/// CoAP-style response code, as seen by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    InternalServerError,
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResponseCode::Created
                | ResponseCode::Deleted
                | ResponseCode::Changed
                | ResponseCode::Content
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseCode::Created => "2.01 Created",
            ResponseCode::Deleted => "2.02 Deleted",
            ResponseCode::Changed => "2.04 Changed",
            ResponseCode::Content => "2.05 Content",
            ResponseCode::BadRequest => "4.00 Bad Request",
            ResponseCode::Unauthorized => "4.01 Unauthorized",
            ResponseCode::Forbidden => "4.03 Forbidden",
            ResponseCode::NotFound => "4.04 Not Found",
            ResponseCode::MethodNotAllowed => "4.05 Method Not Allowed",
            ResponseCode::NotAcceptable => "4.06 Not Acceptable",
            ResponseCode::InternalServerError => "5.00 Internal Server Error",
        };
        write!(f, "{}", text)
    }
}

/// How the client is reachable between its own requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingMode {
    /// UDP
    U,
    /// Queue mode: the client sleeps between registration updates.
    Q,
    /// SMS
    S,
}

/// A request or response field was rejected at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request: {message}")]
pub struct InvalidRequestError {
    pub message: String,
}

impl InvalidRequestError {
    fn new<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a binding string such as `"U"` or `"UQ"`.
pub fn parse_binding(s: &str) -> Result<Vec<BindingMode>, InvalidRequestError> {
    if s.is_empty() {
        return Err(InvalidRequestError::new("binding must not be empty"));
    }
    s.chars()
        .map(|c| match c {
            'U' => Ok(BindingMode::U),
            'Q' => Ok(BindingMode::Q),
            'S' => Ok(BindingMode::S),
            other => Err(InvalidRequestError::new(format!(
                "unknown binding mode '{}'",
                other
            ))),
        })
        .collect()
}

impl FromStr for BindingMode {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "U" => Ok(BindingMode::U),
            "Q" => Ok(BindingMode::Q),
            "S" => Ok(BindingMode::S),
            other => Err(InvalidRequestError::new(format!(
                "unknown binding mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            BindingMode::U => 'U',
            BindingMode::Q => 'Q',
            BindingMode::S => 'S',
        };
        write!(f, "{}", c)
    }
}

/// Request the bootstrap server to (re)provision this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub endpoint: String,
}

impl BootstrapRequest {
    pub fn new<E: Into<String>>(endpoint: E) -> Result<Self, InvalidRequestError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(InvalidRequestError::new("endpoint must not be empty"));
        }
        Ok(Self { endpoint })
    }
}

/// Announce this client to a device-management server.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub endpoint: String,
    /// Registration lifetime in seconds.
    pub lifetime: u64,
    pub binding: Vec<BindingMode>,
    pub sms_number: Option<String>,
    /// CoRE link descriptions of the objects the client exposes.
    pub object_links: Vec<String>,
    pub additional_attributes: Vec<(String, String)>,
}

impl RegisterRequest {
    pub fn new<E: Into<String>>(
        endpoint: E,
        lifetime: u64,
        binding: Vec<BindingMode>,
    ) -> Result<Self, InvalidRequestError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(InvalidRequestError::new("endpoint must not be empty"));
        }
        if lifetime == 0 {
            return Err(InvalidRequestError::new("lifetime must be positive"));
        }
        if binding.is_empty() {
            return Err(InvalidRequestError::new("binding must not be empty"));
        }
        Ok(Self {
            endpoint,
            lifetime,
            binding,
            sms_number: None,
            object_links: Vec::new(),
            additional_attributes: Vec::new(),
        })
    }

    pub fn with_object_links(mut self, links: Vec<String>) -> Self {
        self.object_links = links;
        self
    }

    pub fn with_additional_attributes(mut self, attributes: Vec<(String, String)>) -> Self {
        self.additional_attributes = attributes;
        self
    }
}

/// Refresh an existing registration; only changed fields are carried.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub registration_id: String,
    pub lifetime: Option<u64>,
    pub binding: Option<Vec<BindingMode>>,
    pub sms_number: Option<String>,
    pub object_links: Option<Vec<String>>,
}

impl UpdateRequest {
    pub fn new<I: Into<String>>(registration_id: I) -> Result<Self, InvalidRequestError> {
        let registration_id = registration_id.into();
        if registration_id.is_empty() {
            return Err(InvalidRequestError::new(
                "registration id must not be empty",
            ));
        }
        Ok(Self {
            registration_id,
            lifetime: None,
            binding: None,
            sms_number: None,
            object_links: None,
        })
    }

    pub fn with_changes(mut self, changes: RegistrationUpdate) -> Self {
        self.lifetime = changes.lifetime;
        self.binding = changes.binding;
        self.sms_number = changes.sms_number;
        self.object_links = changes.object_links;
        self
    }
}

/// Fields to change at the next registration update; `None` means
/// "unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationUpdate {
    pub lifetime: Option<u64>,
    pub binding: Option<Vec<BindingMode>>,
    pub sms_number: Option<String>,
    pub object_links: Option<Vec<String>>,
}

/// Remove an existing registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterRequest {
    pub registration_id: String,
}

impl DeregisterRequest {
    pub fn new<I: Into<String>>(registration_id: I) -> Result<Self, InvalidRequestError> {
        let registration_id = registration_id.into();
        if registration_id.is_empty() {
            return Err(InvalidRequestError::new(
                "registration id must not be empty",
            ));
        }
        Ok(Self { registration_id })
    }
}

/// Any client-to-server request.
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkRequest {
    Bootstrap(BootstrapRequest),
    Register(RegisterRequest),
    Update(UpdateRequest),
    Deregister(DeregisterRequest),
}

impl UplinkRequest {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            UplinkRequest::Bootstrap(_) => "bootstrap",
            UplinkRequest::Register(_) => "register",
            UplinkRequest::Update(_) => "update",
            UplinkRequest::Deregister(_) => "deregister",
        }
    }
}

/// Response to an uplink request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkResponse {
    pub code: ResponseCode,
    /// Registration identifier assigned by a successful register.
    pub registration_id: Option<String>,
    pub error_message: Option<String>,
}

impl UplinkResponse {
    pub fn success(code: ResponseCode) -> Self {
        Self {
            code,
            registration_id: None,
            error_message: None,
        }
    }

    pub fn registered<I: Into<String>>(registration_id: I) -> Self {
        Self {
            code: ResponseCode::Created,
            registration_id: Some(registration_id.into()),
            error_message: None,
        }
    }

    pub fn error<M: Into<String>>(code: ResponseCode, message: M) -> Self {
        Self {
            code,
            registration_id: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Any server-to-client request.
#[derive(Debug, Clone, PartialEq)]
pub enum DownlinkRequest {
    Read { path: LwM2mPath },
    Write { path: LwM2mPath, node: LwM2mNode },
    Execute { path: LwM2mPath, arguments: Option<String> },
    Observe { path: LwM2mPath },
}

impl DownlinkRequest {
    pub fn path(&self) -> &LwM2mPath {
        match self {
            DownlinkRequest::Read { path }
            | DownlinkRequest::Write { path, .. }
            | DownlinkRequest::Execute { path, .. }
            | DownlinkRequest::Observe { path } => path,
        }
    }
}

/// Response to a downlink request.
#[derive(Debug, Clone, PartialEq)]
pub struct DownlinkResponse {
    pub code: ResponseCode,
    pub node: Option<LwM2mNode>,
}

/// A request could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Unable to send request: {message}")]
    Transport { message: String },

    /// Raised without any network I/O when a queue-mode client is not
    /// currently awake.
    #[error("Client '{endpoint}' is sleeping")]
    ClientSleeping { endpoint: String },
}

impl SendError {
    pub fn transport<M: Into<String>>(message: M) -> Self {
        SendError::Transport {
            message: message.into(),
        }
    }
}
