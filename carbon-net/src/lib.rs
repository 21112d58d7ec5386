//! Socket-facing worker pool and persistent client built on `carbon-core`'s
//! event loop. Two shapes cover the design's outbound-traffic needs:
//!
//! - [`Connector`]: a fixed pool of worker loops, one connect-send-\[recv\]-
//!   close transaction per request, `Busy` the instant the pool is full.
//! - [`NetClient`]: one persistent connection draining a FIFO verb queue,
//!   for callers that talk to the same peer repeatedly.

pub mod connector;
pub mod endpoint;
pub mod net_client;

pub use connector::{Connector, ConnectorConfig, EVENT_CONNECTOR_DONE};
pub use endpoint::{prepare_unix_socket_path, Conn, Endpoint};
pub use net_client::{NetClient, NetClientState, EVENT_NET_CLIENT_DONE};
