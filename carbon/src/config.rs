//! Top-level process configuration: aggregates the per-crate config structs
//! so a binary has one value to build and pass around instead of threading
//! three independently-defaulted ones.

use carbon_net::ConnectorConfig;
use carbon_remote::RemoteEventServiceConfig;

/// Everything a `carbon` process needs to stand up its event loop, its
/// remote-event gateway, and (optionally) the outbound connector a
/// standalone client uses without a gateway of its own.
#[derive(Debug, Clone, Default)]
pub struct CarbonConfig {
    /// This process's own RID, used as the remote-event socket's file name
    /// and as the `reply_rid` stamped on outbound events.
    pub rid: String,
    pub remote_event: RemoteEventServiceConfig,
}

impl CarbonConfig {
    #[must_use]
    pub fn new(rid: impl Into<String>) -> Self {
        Self { rid: rid.into(), remote_event: RemoteEventServiceConfig::default() }
    }

    /// Connector sizing/timeouts inherited from the remote-event config,
    /// exposed directly for callers that only need an outbound `Connector`
    /// (e.g. a client with no gateway of its own).
    #[must_use]
    pub fn connector(&self) -> ConnectorConfig { self.remote_event.connector }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_carries_the_given_rid() {
        let cfg = CarbonConfig::new("carbon.test.app");
        assert_eq!(cfg.rid, "carbon.test.app");
    }
}
