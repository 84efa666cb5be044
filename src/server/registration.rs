//! Server-side view of a registered client

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::request::BindingMode;

/// What the server knows about a registered client.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: String,
    pub endpoint: String,
    pub address: SocketAddr,
    /// Registration lifetime in seconds.
    pub lifetime: u64,
    pub binding: Vec<BindingMode>,
    pub sms_number: Option<String>,
    pub object_links: Vec<String>,
    pub additional_attributes: HashMap<String, String>,
}

impl Registration {
    pub fn new<I, E>(
        id: I,
        endpoint: E,
        address: SocketAddr,
        lifetime: u64,
        binding: Vec<BindingMode>,
    ) -> Self
    where
        I: Into<String>,
        E: Into<String>,
    {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            address,
            lifetime,
            binding,
            sms_number: None,
            object_links: Vec::new(),
            additional_attributes: HashMap::new(),
        }
    }

    /// Queue-mode clients sleep between their own requests and can only
    /// be reached while awake.
    pub fn uses_queue_mode(&self) -> bool {
        self.binding.contains(&BindingMode::Q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(binding: Vec<BindingMode>) -> Registration {
        Registration::new(
            "reg-1",
            "node-1",
            "192.0.2.1:5683".parse().unwrap(),
            300,
            binding,
        )
    }

    #[test]
    fn test_queue_mode_detection() {
        assert!(registration(vec![BindingMode::U, BindingMode::Q]).uses_queue_mode());
        assert!(!registration(vec![BindingMode::U]).uses_queue_mode());
    }
}
