//! Remote registry client and snapshot source
//!
//! The registry holds the currently advertised registrations. Reads feed
//! the registry poller; writes replace the full desired set and carry an
//! idempotency key derived from the snapshot fingerprint, so retrying the
//! same desired state is deduplicated server-side.

use crate::poller::SnapshotSource;
use async_trait::async_trait;
use registrar_core::{snapshot_fingerprint, CoreError, Registration, Result, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const REGISTRATIONS_PATH: &str = "/v1/registrations";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Current registrations as the registry sees them.
    async fn fetch_current(&self) -> Result<Snapshot>;

    /// Replace the registry's advertised set wholesale. All-or-nothing:
    /// there is no partial write to roll back.
    async fn write_desired(&self, desired: &[Registration]) -> Result<()>;
}

pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn registrations_url(&self) -> String {
        format!("{}{}", self.base_url, REGISTRATIONS_PATH)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch_current(&self) -> Result<Snapshot> {
        let response = self.http.get(self.registrations_url()).send().await?;
        if !response.status().is_success() {
            return Err(CoreError::RegistryStatus(response.status()));
        }
        let snapshot: Snapshot = response.json().await?;
        debug!("Registry reports {} registrations", snapshot.len());
        Ok(snapshot)
    }

    async fn write_desired(&self, desired: &[Registration]) -> Result<()> {
        let key = format!("{:016x}", snapshot_fingerprint(desired));
        let response = self
            .http
            .put(self.registrations_url())
            .header("Idempotency-Key", &key)
            .json(&desired)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CoreError::RegistryStatus(response.status()));
        }
        info!("Replaced registry state: {} registrations (key {})", desired.len(), key);
        Ok(())
    }
}

/// Stand-in used when no registry endpoint is configured: reports an empty
/// registry and logs what a write would have replaced.
#[derive(Default)]
pub struct LogOnlyRegistryClient;

#[async_trait]
impl RegistryClient for LogOnlyRegistryClient {
    async fn fetch_current(&self) -> Result<Snapshot> {
        Ok(Snapshot::new())
    }

    async fn write_desired(&self, desired: &[Registration]) -> Result<()> {
        info!(
            "Registry write (dry run): {} registrations, fingerprint {:016x}",
            desired.len(),
            snapshot_fingerprint(desired)
        );
        Ok(())
    }
}

/// Adapts the registry's read side to the poller contract.
pub struct RegistrySource {
    client: Arc<dyn RegistryClient>,
}

impl RegistrySource {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotSource for RegistrySource {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        self.client.fetch_current().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let client = HttpRegistryClient::new("http://registry.local:7070/").unwrap();
        assert_eq!(
            client.registrations_url(),
            "http://registry.local:7070/v1/registrations"
        );
    }

    #[tokio::test]
    async fn test_log_only_client_reports_empty_registry() {
        let client = LogOnlyRegistryClient;
        assert!(client.fetch_current().await.unwrap().is_empty());
        assert!(client.write_desired(&[]).await.is_ok());
    }
}
