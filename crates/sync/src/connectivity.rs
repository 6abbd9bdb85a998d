//! Reachability of the remote system.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::config::SyncConfig;

/// Boundary input: whether the remote system is currently callable.
///
/// The signal may flip between calls; the engine makes no atomicity
/// assumption across a single logical operation.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe backed by the remote API's health endpoint.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpProbe {
    pub fn new(config: &SyncConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            health_url: config.health_url(),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::debug!("health check failed: {err}");
                false
            }
        }
    }
}

/// Manually switched probe: forced-offline mode and tests.
#[derive(Debug)]
pub struct ManualProbe {
    online: AtomicBool,
}

impl ManualProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Mark the client as offline.
    pub fn set_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    /// Mark the client as online.
    pub fn set_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for ManualProbe {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_probe_flips_between_calls() {
        let probe = ManualProbe::new(true);
        assert!(probe.is_reachable().await);

        probe.set_offline();
        assert!(!probe.is_reachable().await);

        probe.set_online();
        assert!(probe.is_reachable().await);
    }
}
