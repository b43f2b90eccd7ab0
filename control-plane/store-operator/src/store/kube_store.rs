use async_trait::async_trait;
use kube::Client;
use kube::api::{DeleteParams, ListParams, PostParams};
use tracing::trace;

use super::{Managed, ResourceStore, StoreError, StoreResult, object_name};

/// [`ResourceStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn into_store_err(e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(ae) => match (ae.code, ae.reason.as_str()) {
            (409, "AlreadyExists") => StoreError::AlreadyExists(ae.message),
            (409, _) => StoreError::Conflict(ae.message),
            (404, _) => StoreError::NotFound(ae.message),
            (code, _) => StoreError::Api {
                code,
                message: ae.message,
            },
        },
        kube::Error::SerdeError(e) => StoreError::Serialization(e),
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<Option<K>> {
        trace!(kind = %K::kind(&()), ?ns, %name, "get");
        K::scoped_api(self.client.clone(), ns)
            .get_opt(name)
            .await
            .map_err(into_store_err)
    }

    async fn create<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        trace!(kind = %K::kind(&()), ?ns, "create");
        K::scoped_api(self.client.clone(), ns)
            .create(&PostParams::default(), obj)
            .await
            .map_err(into_store_err)
    }

    async fn replace<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        let name = object_name(obj)?;
        trace!(kind = %K::kind(&()), ?ns, %name, "replace");
        K::scoped_api(self.client.clone(), ns)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(into_store_err)
    }

    async fn replace_status<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        let name = object_name(obj)?;
        trace!(kind = %K::kind(&()), ?ns, %name, "replace_status");
        let data = serde_json::to_vec(obj)?;
        K::scoped_api(self.client.clone(), ns)
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(into_store_err)
    }

    async fn delete<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<()> {
        trace!(kind = %K::kind(&()), ?ns, %name, "delete");
        match K::scoped_api(self.client.clone(), ns)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(into_store_err)
        {
            Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list<K: Managed>(
        &self,
        ns: Option<&str>,
        selector: &str,
    ) -> StoreResult<Vec<K>> {
        trace!(kind = %K::kind(&()), ?ns, %selector, "list");
        let lp = ListParams::default().labels(selector);
        K::scoped_api(self.client.clone(), ns)
            .list(&lp)
            .await
            .map(|l| l.items)
            .map_err(into_store_err)
    }
}
