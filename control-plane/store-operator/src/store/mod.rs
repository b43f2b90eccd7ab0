//! Resource-store seam. Every read and write the controller performs on
//! cluster objects goes through [`ResourceStore`], so the reconciler can run
//! against the API server or against the in-memory store used by tests.

mod kube_store;
#[cfg(test)]
pub mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LimitRange, Namespace, PersistentVolumeClaim, Pod, ResourceQuota, Secret,
};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::crd::Store;

pub use kube_store::KubeResourceStore;
#[cfg(test)]
pub use memory::MemoryResourceStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic-concurrency failure: the object changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Connectivity or other failure below the API layer.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// A cluster object kind the controller manages. `scoped_api` knows whether
/// the kind lives in a namespace.
pub trait Managed:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn scoped_api(client: Client, ns: Option<&str>) -> Api<Self>;
}

macro_rules! namespaced_kinds {
    ($($kind:ty),* $(,)?) => {
        $(
            impl Managed for $kind {
                fn scoped_api(client: Client, ns: Option<&str>) -> Api<Self> {
                    match ns {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::default_namespaced(client),
                    }
                }
            }
        )*
    };
}

namespaced_kinds!(
    Store,
    Secret,
    ResourceQuota,
    LimitRange,
    NetworkPolicy,
    PersistentVolumeClaim,
    Pod,
);

impl Managed for Namespace {
    fn scoped_api(client: Client, _ns: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// get / create / replace / delete / list over cluster objects.
///
/// `get` maps not-found to `Ok(None)` and `delete` treats not-found as
/// success; all other failures are returned to the caller.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<Option<K>>;

    async fn create<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K>;

    /// Full-object overwrite. A `resourceVersion` in `obj` makes the write
    /// conditional on the object not having changed since it was read.
    async fn replace<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K>;

    /// Overwrite the status subresource only.
    async fn replace_status<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K>;

    async fn delete<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<()>;

    /// List objects matching an equality label selector (`k=v,k2=v2`).
    async fn list<K: Managed>(
        &self,
        ns: Option<&str>,
        selector: &str,
    ) -> StoreResult<Vec<K>>;
}

pub(crate) fn object_name<K: Resource<DynamicType = ()>>(
    obj: &K,
) -> StoreResult<String> {
    obj.meta().name.clone().ok_or_else(|| StoreError::Api {
        code: 422,
        message: format!("{} without metadata.name", K::kind(&())),
    })
}
