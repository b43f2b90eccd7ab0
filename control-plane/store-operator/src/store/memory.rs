//! In-memory [`ResourceStore`] with API-server-like semantics: resource
//! versions with conflict detection, a status subresource, finalizers that
//! hold deletion, namespace cascade and owner-reference garbage collection.
//! Faults can be injected per verb and kind.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::{Managed, ResourceStore, StoreError, StoreResult, object_name};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Replace,
    ReplaceStatus,
    Delete,
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Transport,
    Conflict,
}

impl Fault {
    fn into_error(self, verb: Verb, kind: &str) -> StoreError {
        match self {
            Fault::Transport => StoreError::Transport(format!(
                "injected {verb:?} failure for {kind}"
            )),
            Fault::Conflict => StoreError::Conflict(format!(
                "injected {verb:?} conflict for {kind}"
            )),
        }
    }
}

/// (kind, namespace, name); namespace is empty for cluster-scoped kinds.
type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    version: u64,
    faults: HashMap<(Verb, String), VecDeque<Fault>>,
    calls: HashMap<(Verb, String), usize>,
    retain_on_delete: HashSet<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn enter(&mut self, verb: Verb, kind: &str) -> StoreResult<()> {
        *self.calls.entry((verb, kind.to_string())).or_default() += 1;
        if let Some(q) = self.faults.get_mut(&(verb, kind.to_string())) {
            if let Some(f) = q.pop_front() {
                return Err(f.into_error(verb, kind));
            }
        }
        Ok(())
    }

    fn remove_cascading(&mut self, key: &Key) {
        let Some(removed) = self.objects.remove(key) else {
            return;
        };
        if key.0 == "Namespace" {
            let ns = key.2.clone();
            let inner: Vec<Key> = self
                .objects
                .keys()
                .filter(|(_, n, _)| *n == ns)
                .cloned()
                .collect();
            for k in inner {
                self.remove_cascading(&k);
            }
        }
        if let Some(uid) = removed
            .pointer("/metadata/uid")
            .and_then(|u| u.as_str())
            .map(str::to_string)
        {
            let owned: Vec<Key> = self
                .objects
                .iter()
                .filter(|(_, v)| owned_by(v, &uid))
                .map(|(k, _)| k.clone())
                .collect();
            for k in owned {
                self.remove_cascading(&k);
            }
        }
    }
}

fn owned_by(obj: &Value, uid: &str) -> bool {
    obj.pointer("/metadata/ownerReferences")
        .and_then(|r| r.as_array())
        .map(|refs| {
            refs.iter()
                .any(|r| r.get("uid").and_then(|u| u.as_str()) == Some(uid))
        })
        .unwrap_or(false)
}

fn has_finalizers(obj: &Value) -> bool {
    obj.pointer("/metadata/finalizers")
        .and_then(|f| f.as_array())
        .map(|f| !f.is_empty())
        .unwrap_or(false)
}

fn labels_match(obj: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            obj.pointer("/metadata/labels")
                .and_then(|l| l.get(k.trim()))
                .and_then(|x| x.as_str())
                == Some(v.trim())
        })
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn kind_of<K: Managed>() -> String {
    K::kind(&()).to_string()
}

fn key_for<K: Managed>(ns: Option<&str>, name: &str) -> Key {
    let kind = kind_of::<K>();
    let ns = if kind == "Namespace" {
        String::new()
    } else {
        ns.unwrap_or("default").to_string()
    };
    (kind, ns, name.to_string())
}

fn meta_mut(v: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !v.get("metadata").map(Value::is_object).unwrap_or(false) {
        v["metadata"] = json!({});
    }
    match v.get_mut("metadata") {
        Some(Value::Object(m)) => m,
        _ => unreachable!("metadata was just set to an object"),
    }
}

#[derive(Clone, Default)]
pub struct MemoryResourceStore {
    state: Arc<RwLock<State>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `verb` on `kind` with `fault`.
    pub async fn inject(
        &self,
        verb: Verb,
        kind: &str,
        fault: Fault,
        times: usize,
    ) {
        let mut st = self.state.write().await;
        let q = st.faults.entry((verb, kind.to_string())).or_default();
        q.extend(std::iter::repeat_n(fault, times));
    }

    /// Number of calls made for `verb` on `kind`, including failed ones.
    pub async fn calls(&self, verb: Verb, kind: &str) -> usize {
        let st = self.state.read().await;
        st.calls
            .get(&(verb, kind.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Deleting objects of `kind` only marks them as terminating until
    /// [`Self::purge`] is called.
    pub async fn retain_on_delete(&self, kind: &str) {
        self.state
            .write()
            .await
            .retain_on_delete
            .insert(kind.to_string());
    }

    /// Physically remove an object, cascading like the API server would.
    pub async fn purge<K: Managed>(&self, ns: Option<&str>, name: &str) {
        let key = key_for::<K>(ns, name);
        self.state.write().await.remove_cascading(&key);
    }

    pub async fn count<K: Managed>(&self) -> usize {
        let kind = kind_of::<K>();
        let st = self.state.read().await;
        st.objects.keys().filter(|(k, _, _)| *k == kind).count()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<Option<K>> {
        let key = key_for::<K>(ns, name);
        let mut st = self.state.write().await;
        st.enter(Verb::Get, &key.0)?;
        match st.objects.get(&key) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        let name = object_name(obj)?;
        let key = key_for::<K>(ns, &name);
        let mut st = self.state.write().await;
        st.enter(Verb::Create, &key.0)?;
        if st.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "{} {}/{}",
                key.0, key.1, key.2
            )));
        }
        let mut v = serde_json::to_value(obj)?;
        let rv = st.next_version();
        let meta = meta_mut(&mut v);
        if !key.1.is_empty() {
            meta.insert("namespace".into(), json!(key.1));
        }
        meta.insert("resourceVersion".into(), json!(rv));
        meta.insert("uid".into(), json!(format!("uid-{rv}")));
        meta.insert("creationTimestamp".into(), json!(now()));
        meta.insert("generation".into(), json!(1));
        meta.remove("deletionTimestamp");
        st.objects.insert(key, v.clone());
        Ok(serde_json::from_value(v)?)
    }

    async fn replace<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        let name = object_name(obj)?;
        let key = key_for::<K>(ns, &name);
        let mut st = self.state.write().await;
        st.enter(Verb::Replace, &key.0)?;
        let current = st.objects.get(&key).cloned().ok_or_else(|| {
            StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2))
        })?;
        check_version(&current, obj)?;

        let mut v = serde_json::to_value(obj)?;
        match current.get("status") {
            Some(s) => v["status"] = s.clone(),
            None => {
                if let Some(m) = v.as_object_mut() {
                    m.remove("status");
                }
            }
        }
        let mut generation = current
            .pointer("/metadata/generation")
            .and_then(|g| g.as_i64())
            .unwrap_or(1);
        if current.get("spec") != v.get("spec") {
            generation += 1;
        }
        let rv = st.next_version();
        let meta = meta_mut(&mut v);
        for field in ["uid", "creationTimestamp", "deletionTimestamp", "namespace"]
        {
            match current.pointer(&format!("/metadata/{field}")) {
                Some(x) => meta.insert(field.into(), x.clone()),
                None => meta.remove(field),
            };
        }
        meta.insert("resourceVersion".into(), json!(rv));
        meta.insert("generation".into(), json!(generation));

        let finished = v.pointer("/metadata/deletionTimestamp").is_some()
            && !has_finalizers(&v);
        if finished {
            st.objects.insert(key.clone(), v.clone());
            st.remove_cascading(&key);
        } else {
            st.objects.insert(key, v.clone());
        }
        Ok(serde_json::from_value(v)?)
    }

    async fn replace_status<K: Managed>(
        &self,
        ns: Option<&str>,
        obj: &K,
    ) -> StoreResult<K> {
        let name = object_name(obj)?;
        let key = key_for::<K>(ns, &name);
        let mut st = self.state.write().await;
        st.enter(Verb::ReplaceStatus, &key.0)?;
        let mut current = st.objects.get(&key).cloned().ok_or_else(|| {
            StoreError::NotFound(format!("{} {}/{}", key.0, key.1, key.2))
        })?;
        check_version(&current, obj)?;

        let v = serde_json::to_value(obj)?;
        match v.get("status") {
            Some(s) => current["status"] = s.clone(),
            None => {
                if let Some(m) = current.as_object_mut() {
                    m.remove("status");
                }
            }
        }
        let rv = st.next_version();
        meta_mut(&mut current).insert("resourceVersion".into(), json!(rv));
        st.objects.insert(key, current.clone());
        Ok(serde_json::from_value(current)?)
    }

    async fn delete<K: Managed>(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> StoreResult<()> {
        let key = key_for::<K>(ns, name);
        let mut st = self.state.write().await;
        st.enter(Verb::Delete, &key.0)?;
        let Some(mut current) = st.objects.get(&key).cloned() else {
            return Ok(());
        };
        let retained = st.retain_on_delete.contains(&key.0);
        if has_finalizers(&current) || retained {
            if current.pointer("/metadata/deletionTimestamp").is_none() {
                let rv = st.next_version();
                let meta = meta_mut(&mut current);
                meta.insert("deletionTimestamp".into(), json!(now()));
                meta.insert("resourceVersion".into(), json!(rv));
                if key.0 == "Namespace" {
                    current["status"] = json!({"phase": "Terminating"});
                }
                st.objects.insert(key, current);
            }
            return Ok(());
        }
        st.remove_cascading(&key);
        Ok(())
    }

    async fn list<K: Managed>(
        &self,
        ns: Option<&str>,
        selector: &str,
    ) -> StoreResult<Vec<K>> {
        let kind = kind_of::<K>();
        let mut st = self.state.write().await;
        st.enter(Verb::List, &kind)?;
        let mut out = Vec::new();
        for ((k, n, _), v) in st.objects.iter() {
            if *k != kind {
                continue;
            }
            if let Some(ns) = ns {
                if kind != "Namespace" && n != ns {
                    continue;
                }
            }
            if labels_match(v, selector) {
                out.push(serde_json::from_value(v.clone())?);
            }
        }
        Ok(out)
    }
}

fn check_version<K: Managed>(current: &Value, incoming: &K) -> StoreResult<()> {
    let stored = current
        .pointer("/metadata/resourceVersion")
        .and_then(|r| r.as_str());
    match incoming.meta().resource_version.as_deref() {
        Some(rv) if Some(rv) != stored => Err(StoreError::Conflict(format!(
            "{} {:?}: resourceVersion {} is stale",
            K::kind(&()),
            incoming.meta().name,
            rv
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{STORE_FINALIZER, Store, StorePhase, StoreSpec};
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
    use kube::api::ObjectMeta;

    impl Managed for ConfigMap {
        fn scoped_api(
            client: kube::Client,
            ns: Option<&str>,
        ) -> kube::Api<Self> {
            kube::Api::namespaced(client, ns.unwrap_or("default"))
        }
    }

    fn store(name: &str) -> Store {
        Store::new(
            name,
            StoreSpec {
                engine: "woo".into(),
                plan: "small".into(),
            },
        )
    }

    #[tokio::test]
    async fn stale_resource_version_conflicts() {
        let mem = MemoryResourceStore::new();
        let created = mem.create(Some("default"), &store("a")).await.unwrap();
        let mut first = created.clone();
        first.spec.plan = "medium".into();
        let updated = mem.replace(Some("default"), &first).await.unwrap();
        assert_eq!(updated.metadata.generation, Some(2));

        let mut stale = created;
        stale.spec.plan = "large".into();
        let err = mem.replace(Some("default"), &stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn status_and_main_resource_are_written_separately() {
        let mem = MemoryResourceStore::new();
        let mut s = mem.create(Some("default"), &store("a")).await.unwrap();
        s.status = Some(crate::crd::StoreStatus {
            phase: Some(StorePhase::Ready),
            ..Default::default()
        });
        // Main-resource writes ignore status.
        let s = mem.replace(Some("default"), &s).await.unwrap();
        assert_eq!(s.phase(), None);

        let mut s2 = s.clone();
        s2.status = Some(crate::crd::StoreStatus {
            phase: Some(StorePhase::Provisioning),
            ..Default::default()
        });
        s2.spec.plan = "large".into();
        let s2 = mem.replace_status(Some("default"), &s2).await.unwrap();
        assert_eq!(s2.phase(), Some(StorePhase::Provisioning));
        assert_eq!(s2.spec.plan, "small");
    }

    #[tokio::test]
    async fn finalizer_holds_deletion_until_removed() {
        let mem = MemoryResourceStore::new();
        let mut s = store("a");
        s.metadata.finalizers = Some(vec![STORE_FINALIZER.into()]);
        mem.create(Some("default"), &s).await.unwrap();
        mem.delete::<Store>(Some("default"), "a").await.unwrap();

        let mut held: Store =
            mem.get(Some("default"), "a").await.unwrap().unwrap();
        assert!(held.is_deleting());
        held.metadata.finalizers = Some(vec![]);
        mem.replace(Some("default"), &held).await.unwrap();
        assert!(
            mem.get::<Store>(Some("default"), "a")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn namespace_removal_cascades_and_owner_gc() {
        let mem = MemoryResourceStore::new();
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("store-a".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        mem.create(None, &ns).await.unwrap();
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("inner".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        mem.create(Some("store-a"), &cm).await.unwrap();
        mem.delete::<Namespace>(None, "store-a").await.unwrap();
        assert_eq!(mem.count::<ConfigMap>().await, 0);

        let owner = mem.create(Some("default"), &store("a")).await.unwrap();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("a-creds".into()),
                owner_references: Some(vec![
                    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
                        api_version: "infra.store.io/v1alpha1".into(),
                        kind: "Store".into(),
                        name: "a".into(),
                        uid: owner.metadata.uid.clone().unwrap(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            },
            ..Default::default()
        };
        mem.create(Some("default"), &secret).await.unwrap();
        mem.delete::<Store>(Some("default"), "a").await.unwrap();
        assert_eq!(mem.count::<Secret>().await, 0);
    }

    #[tokio::test]
    async fn injected_faults_fire_in_order() {
        let mem = MemoryResourceStore::new();
        mem.inject(Verb::Get, "Namespace", Fault::Transport, 2).await;
        for _ in 0..2 {
            let err = mem.get::<Namespace>(None, "x").await.unwrap_err();
            assert!(matches!(err, StoreError::Transport(_)));
        }
        assert!(mem.get::<Namespace>(None, "x").await.unwrap().is_none());
        assert_eq!(mem.calls(Verb::Get, "Namespace").await, 3);
    }
}
