//! Media-relay control API access.
//!
//! [`RelayApi`] is the seam the reconciler and coordinator depend on;
//! [`MediaRelayClient`] is the HTTP implementation.

pub mod client;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::RelayResult;

pub use client::MediaRelayClient;
pub use types::{PathConfigBody, RelayPathDetail, RelayPathList, RelayPathSummary, RelaySource};

#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Names (and coarse state) of every path the relay knows about
    async fn list_paths(&self) -> RelayResult<Vec<RelayPathSummary>>;

    /// Detailed runtime state of one path
    async fn get_path(&self, name: &str) -> RelayResult<RelayPathDetail>;

    /// Stored configuration of one path; 404 when it has none
    async fn get_path_config(&self, name: &str) -> RelayResult<serde_json::Value>;

    async fn add_path_config(&self, name: &str) -> RelayResult<()>;

    async fn patch_path_config(&self, name: &str) -> RelayResult<()>;

    async fn delete_path_config(&self, name: &str) -> RelayResult<()>;

    async fn delete_path(&self, name: &str) -> RelayResult<()>;

    /// Cheap authenticated call used as a liveness check
    async fn health_check(&self) -> RelayResult<()>;

    /// Make sure the relay accepts publishers on `name`: patch an existing
    /// configuration or add a new one when the relay has none
    async fn ensure_path_config(&self, name: &str) -> RelayResult<()> {
        match self.get_path_config(name).await {
            Ok(_) => {
                debug!("Relay path config exists for {}, patching", name);
                self.patch_path_config(name).await
            }
            Err(e) if e.is_not_found() => {
                info!("Adding relay path config for {}", name);
                self.add_path_config(name).await
            }
            Err(e) => Err(e),
        }
    }

    /// Drop both the configuration and the runtime path; missing entries are fine
    async fn remove_path(&self, name: &str) -> RelayResult<()> {
        for result in [self.delete_path_config(name).await, self.delete_path(name).await] {
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("Relay had no entry for {}: {}", name, e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
