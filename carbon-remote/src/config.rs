//! Configuration for a process's remote-event service.
//!
//! Mirrors the plain-struct-with-`Default` style the rest of this workspace
//! uses rather than a config-file crate: one constructor reads the single
//! environment override the design calls out (`REMOTE_EVENT_ROOT_PATH`, §6.2),
//! everything else is a literal default.

use std::path::PathBuf;

use carbon_net::ConnectorConfig;

const ROOT_PATH_ENV: &str = "REMOTE_EVENT_ROOT_PATH";
const DEFAULT_ROOT_PATH: &str = "/tmp";

/// Socket root plus the outbound worker pool sizing for one process's
/// [`RemoteEventService`](crate::service::RemoteEventService).
#[derive(Debug, Clone)]
pub struct RemoteEventServiceConfig {
    /// Directory `{rid}` sockets are created under. Defaults to `/tmp`,
    /// overridable via `REMOTE_EVENT_ROOT_PATH`.
    pub root_path: PathBuf,
    /// Outbound connector sizing/timeouts; defaults to 100 workers per §4.6.
    pub connector: ConnectorConfig,
}

impl Default for RemoteEventServiceConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::var_os(ROOT_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_PATH)),
            connector: ConnectorConfig::default(),
        }
    }
}

impl RemoteEventServiceConfig {
    #[must_use]
    pub fn socket_path(&self, rid: &str) -> PathBuf { self.root_path.join(rid) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(remote_event_root_path_env)]
    fn default_root_is_tmp_without_env_override() {
        std::env::remove_var(ROOT_PATH_ENV);
        assert_eq!(RemoteEventServiceConfig::default().root_path, PathBuf::from("/tmp"));
    }

    #[test]
    #[serial_test::serial(remote_event_root_path_env)]
    fn env_override_replaces_the_default_root() {
        std::env::set_var(ROOT_PATH_ENV, "/var/carbon-test");
        assert_eq!(RemoteEventServiceConfig::default().root_path, PathBuf::from("/var/carbon-test"));
        std::env::remove_var(ROOT_PATH_ENV);
    }
}
