#![allow(dead_code)]

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use kube::{Api, Client};
use store_operator::crd::Store;
use tokio::task::JoinHandle;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

/// Write a stand-in for the helm CLI: `history` reports no release,
/// `install`/`upgrade` consume the values and fail, everything else
/// (uninstall) succeeds.
pub fn failing_helm_stub() -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}.sh", uniq("fake-helm")));
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         case \"$1\" in\n\
         history) echo 'Error: release: not found' >&2; exit 1;;\n\
         install|upgrade) cat >/dev/null; echo 'Error: chart unavailable' >&2; exit 1;;\n\
         *) exit 0;;\n\
         esac\n",
    )
    .expect("write helm stub");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod helm stub");
    path
}

/// Poll `check` once a second until it returns true or `secs` elapse.
pub async fn wait_until<F, Fut>(secs: u64, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..secs {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    false
}

// RAII guard: abort the controller and delete the Store.
pub struct ControllerGuard {
    ns: String,
    name: String,
    client: Client,
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(ns: &str, name: &str, client: Client) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            client,
            ctrl: None,
        }
    }

    pub fn with_controller(mut self, ctrl: JoinHandle<()>) -> Self {
        self.ctrl = Some(ctrl);
        self
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
        let api: Api<Store> = Api::namespaced(self.client.clone(), &self.ns);
        let name = self.name.clone();
        let _ = tokio::spawn(async move {
            let _ = api.delete(&name, &Default::default()).await;
        });
    }
}
