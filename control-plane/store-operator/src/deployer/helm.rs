use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{DeployerError, WorkloadDeployer};
use crate::config::HelmConfig;

/// [`WorkloadDeployer`] that drives the `helm` CLI.
#[derive(Clone, Debug)]
pub struct HelmDeployer {
    bin: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    revision: i64,
}

impl HelmDeployer {
    pub fn new(cfg: &HelmConfig) -> Self {
        Self {
            bin: cfg.bin.clone(),
            timeout: cfg.timeout.into(),
        }
    }

    fn timeout_arg(&self) -> String {
        format!("{}s", self.timeout.as_secs().max(1))
    }

    fn history_args(release: &str, namespace: &str) -> Vec<String> {
        [
            "history", release, "--namespace", namespace, "--max", "1",
            "--output", "json",
        ]
        .map(String::from)
        .to_vec()
    }

    fn deploy_args(
        &self,
        upgrade: bool,
        release: &str,
        namespace: &str,
        template: &str,
    ) -> Vec<String> {
        let verb = if upgrade { "upgrade" } else { "install" };
        let timeout = self.timeout_arg();
        [
            verb, release, template, "--namespace", namespace, "--wait",
            "--timeout", timeout.as_str(), "--values", "-",
        ]
        .map(String::from)
        .to_vec()
    }

    fn uninstall_args(release: &str, namespace: &str) -> Vec<String> {
        ["uninstall", release, "--namespace", namespace]
            .map(String::from)
            .to_vec()
    }

    /// Run helm, feeding `stdin` if given. Returns stdout on success.
    async fn run(
        &self,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<String, DeployerError> {
        debug!(bin = %self.bin, ?args, "running helm");
        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            // Close stdin so helm sees EOF on the values stream.
            drop(pipe);
        }
        let out = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if out.status.success() {
            return Ok(stdout);
        }
        if is_release_not_found(&stderr) {
            return Err(DeployerError::NotFound(
                args.get(1).cloned().unwrap_or_default(),
            ));
        }
        Err(DeployerError::CommandFailed {
            command: format!("{} {}", self.bin, args.join(" ")),
            status: out.status.to_string(),
            stderr,
        })
    }
}

fn is_release_not_found(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("release: not found")
}

fn parse_latest_revision(json: &str) -> Result<Option<i64>, DeployerError> {
    let entries: Vec<HistoryEntry> = serde_json::from_str(json.trim())?;
    Ok(entries.iter().map(|e| e.revision).max())
}

#[async_trait]
impl WorkloadDeployer for HelmDeployer {
    #[instrument(skip(self, values))]
    async fn install_or_upgrade(
        &self,
        release: &str,
        namespace: &str,
        template: &str,
        values: &serde_json::Value,
    ) -> Result<(), DeployerError> {
        let upgrade = self.revision(release, namespace).await?.is_some();
        if upgrade {
            info!("release exists, upgrading");
        } else {
            info!("release absent, installing");
        }
        let payload = serde_json::to_vec(values)?;
        let args = self.deploy_args(upgrade, release, namespace, template);
        self.run(&args, Some(&payload)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn uninstall(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<(), DeployerError> {
        match self.run(&Self::uninstall_args(release, namespace), None).await {
            Ok(_) | Err(DeployerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn revision(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<i64>, DeployerError> {
        match self.run(&Self::history_args(release, namespace), None).await {
            Ok(out) => parse_latest_revision(&out),
            Err(DeployerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
