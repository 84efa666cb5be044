//! Client-side protocol machinery
//!
//! The [`engine::RegistrationEngine`] owns the lifecycle; the traits in
//! [`servers`] are the seams a transport implements to plug it into a
//! real network stack.

pub mod bootstrap;
pub mod engine;
pub mod observer;
pub mod servers;

pub use bootstrap::BootstrapHandler;
pub use engine::{NoServerConfiguredError, RegistrationEngine};
pub use observer::{LwM2mClientObserver, NoopObserver};
pub use servers::{
    DmServerInfo, EndpointsManager, LwM2mRequestSender, ServerIdentity, ServerInfo,
    ServerInfoProvider, ServersInfo,
};
