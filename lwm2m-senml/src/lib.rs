//! # SenML for LWM2M
//!
//! Records, packs and wire codecs for [RFC 8428](https://tools.ietf.org/html/rfc8428)
//! Sensor Measurement Lists, as used by the LWM2M device-management
//! protocol for payload encoding.
//!
//! This crate is protocol-agnostic: it handles the flat record format,
//! the JSON and CBOR wire representations (including LWM2M's integer CBOR
//! keys), and base-name/base-time resolution. Mapping resolved records to
//! the LWM2M object/instance/resource tree lives in the `lwm2m` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use lwm2m_senml::{SenMLPack, SenMLRecord};
//!
//! let mut pack = SenMLPack::new();
//! pack.add_record(SenMLRecord::with_number("0", 22.5).with_base_name("/3303/0/"));
//! pack.add_record(SenMLRecord::with_number("5700", 21.9));
//!
//! let json = pack.to_json().unwrap();
//! let restored = SenMLPack::from_json(&json).unwrap();
//! assert_eq!(pack, restored);
//! ```

pub mod error;
pub mod pack;
pub mod record;
pub mod resolve;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "cbor")]
pub mod cbor;

// Re-export main types
pub use error::{Result, SenMLError};
pub use pack::SenMLPack;
pub use record::{Number, SenMLRecord, SenMLValue};
pub use resolve::{ResolvedRecord, resolve_records};

/// SenML Content-Format identifiers for CoAP
pub mod content_format {
    /// application/senml+json
    pub const SENML_JSON: u16 = 110;
    /// application/sensml+json
    pub const SENSML_JSON: u16 = 111;
    /// application/senml+cbor
    pub const SENML_CBOR: u16 = 112;
    /// application/sensml+cbor
    pub const SENSML_CBOR: u16 = 113;
}
