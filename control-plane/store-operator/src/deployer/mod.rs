//! Workload deployer: install, upgrade and remove a packaged release.

mod helm;
mod values;

use async_trait::async_trait;

pub use helm::HelmDeployer;
pub use values::{
    IngressValues, MariaDbAuth, MariaDbPrimary, MariaDbValues, ProbeValues,
    ServiceValues, Toggle, WordPressValues,
};

#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
    #[error("release {0} not found")]
    NotFound(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run deployer: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid deployer payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Release lifecycle against the downstream deployment system. All state
/// lives in that system's release history; implementations hold none.
#[async_trait]
pub trait WorkloadDeployer: Send + Sync {
    /// Upgrade when the release has history, install otherwise. Blocks until
    /// the workload is up or the deployer's timeout elapses.
    async fn install_or_upgrade(
        &self,
        release: &str,
        namespace: &str,
        template: &str,
        values: &serde_json::Value,
    ) -> Result<(), DeployerError>;

    /// Remove the release. A release that does not exist is not an error.
    async fn uninstall(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<(), DeployerError>;

    /// Latest revision number, `None` when there is no such release.
    async fn revision(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<i64>, DeployerError>;
}
