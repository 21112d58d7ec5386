//! Facade over the rest of the workspace: re-exports `carbon-core`,
//! `carbon-net`, `carbon-remote` and `carbon-shell`, and adds the bits every
//! standalone process needs and none of those crates own individually —
//! signal handling, exit-code bookkeeping, and top-level configuration.

pub mod app;
pub mod config;
pub mod logging;

pub use carbon_core::*;
pub use carbon_net::{prepare_unix_socket_path, Conn, Connector, ConnectorConfig, Endpoint};
pub use carbon_remote::{init_remote_event_service, RemoteEvent, RemoteEventService, RemoteEventServiceConfig};
pub use carbon_shell::{ShellExecuteServer, EVENT_SHELL_EXECUTE, EVENT_SHELL_EXECUTE_REPLY, SHELL_EXECUTE_RID};

pub use app::{install_panic_hook, Application};
pub use config::CarbonConfig;
