//! Per-store credentials. Generated once, stored in a Secret next to the
//! Store (owned by it), and returned unchanged on every later pass.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{info, instrument};

use crate::crd::Store;
use crate::store::{ResourceStore, StoreError};
use crate::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, STORE_LABEL};

pub const KEY_DB_ROOT: &str = "mariadb-root-password";
pub const KEY_DB_USER: &str = "mariadb-user-password";
pub const KEY_ADMIN: &str = "wordpress-password";

const DB_ROOT_LEN: usize = 20;
const DB_USER_LEN: usize = 20;
const ADMIN_LEN: usize = 16;

#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub db_root_password: String,
    pub db_user_password: String,
    pub admin_password: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("secret {secret} is missing key {key}")]
    MissingKey { secret: String, key: &'static str },
    #[error("secret {secret} key {key} is not valid UTF-8")]
    InvalidValue { secret: String, key: &'static str },
    #[error("store {0} has no uid yet; cannot set owner reference")]
    NoOwnerUid(String),
}

pub fn secret_name(store_name: &str) -> String {
    format!("{store_name}-creds")
}

/// Alphanumeric secret drawn from the thread-local CSPRNG.
pub fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl StoreCredentials {
    pub fn generate() -> Self {
        Self {
            db_root_password: generate_password(DB_ROOT_LEN),
            db_user_password: generate_password(DB_USER_LEN),
            admin_password: generate_password(ADMIN_LEN),
        }
    }

    fn to_data(&self) -> BTreeMap<String, ByteString> {
        [
            (KEY_DB_ROOT, &self.db_root_password),
            (KEY_DB_USER, &self.db_user_password),
            (KEY_ADMIN, &self.admin_password),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect()
    }

    fn from_secret(secret: &Secret) -> Result<Self, CredentialError> {
        let name = secret.name_any();
        let read = |key: &'static str| -> Result<String, CredentialError> {
            let raw = secret
                .data
                .as_ref()
                .and_then(|d| d.get(key))
                .ok_or_else(|| CredentialError::MissingKey {
                    secret: name.clone(),
                    key,
                })?;
            String::from_utf8(raw.0.clone()).map_err(|_| {
                CredentialError::InvalidValue {
                    secret: name.clone(),
                    key,
                }
            })
        };
        Ok(Self {
            db_root_password: read(KEY_DB_ROOT)?,
            db_user_password: read(KEY_DB_USER)?,
            admin_password: read(KEY_ADMIN)?,
        })
    }
}

/// Return the store's credentials, creating the secret on first use.
///
/// The secret lives in the Store's own namespace, not the target
/// namespace, and carries a controller owner reference to the Store so it
/// is garbage-collected with it.
#[instrument(skip_all, fields(ns = %store.namespace().unwrap_or_default(), name = %store.name_any()))]
pub async fn ensure_credentials<R: ResourceStore>(
    rs: &R,
    store: &Store,
) -> Result<StoreCredentials, CredentialError> {
    let ns = store.namespace();
    let name = secret_name(&store.name_any());
    if let Some(existing) = rs.get::<Secret>(ns.as_deref(), &name).await? {
        return StoreCredentials::from_secret(&existing);
    }

    let owner = store
        .controller_owner_ref(&())
        .ok_or_else(|| CredentialError::NoOwnerUid(store.name_any()))?;
    let creds = StoreCredentials::generate();
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: ns.clone(),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                (STORE_LABEL.to_string(), store.name_any()),
            ])),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        type_: Some("Opaque".into()),
        data: Some(creds.to_data()),
        ..Default::default()
    };
    match rs.create(ns.as_deref(), &secret).await {
        Ok(_) => {
            info!(secret = %name, "credentials generated");
            Ok(creds)
        }
        // Lost a race with another writer; theirs wins.
        Err(StoreError::AlreadyExists(_)) => {
            let existing = rs
                .get::<Secret>(ns.as_deref(), &name)
                .await?
                .ok_or_else(|| StoreError::NotFound(name.clone()))?;
            StoreCredentials::from_secret(&existing)
        }
        Err(e) => Err(e.into()),
    }
}
