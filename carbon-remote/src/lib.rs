//! Local-domain remote-event transport: the VEP container framing, the
//! `RemoteEvent` packet body it carries, and the gateway service that binds
//! a UNIX-domain socket per process RID and bridges inbound traffic back
//! into that process's `carbon-core` event loop.

pub mod config;
pub mod remote_event;
pub mod service;
pub mod vep;

pub use config::RemoteEventServiceConfig;
pub use remote_event::RemoteEvent;
pub use service::{init_remote_event_service, RemoteEventService};
pub use vep::{Container, Packet};
