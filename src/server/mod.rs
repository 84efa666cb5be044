//! Server-side protocol machinery
//!
//! Presence tracking and queue-mode gating for registered clients. Glue
//! code wires registration events into the presence service: call
//! [`PresenceService::set_awake`] whenever a message arrives from a
//! queue-mode client and [`PresenceService::stop_presence_tracking`]
//! when its registration ends.

pub mod presence;
pub mod queue;
pub mod registration;

pub use presence::{
    ClientAwakeTimeProvider, PresenceListener, PresenceService, StaticClientAwakeTimeProvider,
};
pub use queue::{DownlinkRequestSender, QueueModeRequestSender};
pub use registration::Registration;
