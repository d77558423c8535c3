//! Shared harness for the engine integration tests.
//!
//! Every simulated device gets its own local store and identity; devices
//! talk to one shared in-memory remote store.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use plan_sync_core::memory::{InMemoryLocalStore, InMemoryRemoteStore, SwitchableIdentity};
use plan_sync_core::{
    collections, CollectionPath, Day, Document, Exercise, NewPlan, PlanEngine, PortResult, Query,
    RemoteStore, ShareIndexEntry, ShareRecord, ShareStatus, WriteBatch,
};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};

pub struct Device {
    pub engine: PlanEngine,
    pub local: Arc<InMemoryLocalStore>,
    pub identity: Arc<SwitchableIdentity>,
}

impl Device {
    pub fn new(remote: &Arc<InMemoryRemoteStore>, user: Option<&str>) -> Self {
        Self::with_remote(remote.clone(), user)
    }

    pub fn with_remote(remote: Arc<dyn RemoteStore>, user: Option<&str>) -> Self {
        let local = Arc::new(InMemoryLocalStore::new());
        let identity = Arc::new(SwitchableIdentity::new(user.map(str::to_string)));
        let engine = PlanEngine::new(local.clone(), remote, identity.clone());
        Self {
            engine,
            local,
            identity,
        }
    }
}

pub fn remote() -> Arc<InMemoryRemoteStore> {
    Arc::new(InMemoryRemoteStore::new())
}

type WriteHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Wraps a shared in-memory store and runs a one-shot action right before
/// the next write reaches it. Stands in for another actor racing an operation.
pub struct HookedRemote {
    inner: Arc<InMemoryRemoteStore>,
    hook: Mutex<Option<WriteHook>>,
}

impl HookedRemote {
    pub fn new(inner: &Arc<InMemoryRemoteStore>) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            hook: Mutex::new(None),
        })
    }

    pub fn before_next_write<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: WriteHook = Box::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) });
        *self.hook.lock().unwrap() = Some(hook);
    }

    async fn fire(&self) {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook().await;
        }
    }
}

#[async_trait]
impl RemoteStore for HookedRemote {
    fn new_id(&self, path: &CollectionPath) -> String {
        self.inner.new_id(path)
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> PortResult<Option<Document>> {
        self.inner.get(path, id).await
    }

    async fn query(&self, path: &CollectionPath, query: &Query) -> PortResult<Vec<Document>> {
        self.inner.query(path, query).await
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> PortResult<()> {
        self.fire().await;
        self.inner.set(path, id, data).await
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Map<String, Value>,
    ) -> PortResult<()> {
        self.fire().await;
        self.inner.update(path, id, fields).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> PortResult<()> {
        self.fire().await;
        self.inner.delete(path, id).await
    }

    async fn commit(&self, batch: WriteBatch) -> PortResult<()> {
        self.fire().await;
        self.inner.commit(batch).await
    }
}

pub fn exercise(name: &str) -> Exercise {
    Exercise(json!({ "name": name, "sets": 3, "reps": 10 }))
}

pub fn training_day(name: &str) -> Day {
    Day {
        day_name: name.to_string(),
        is_rest_day: false,
        exercises: vec![exercise("Squat")],
    }
}

pub fn rest_day(name: &str) -> Day {
    Day {
        day_name: name.to_string(),
        is_rest_day: true,
        exercises: vec![],
    }
}

pub fn plan_named(name: &str) -> NewPlan {
    NewPlan {
        name: name.to_string(),
        days: vec![training_day("Monday"), rest_day("Tuesday")],
    }
}

pub fn plans_of(owner: &str) -> CollectionPath {
    CollectionPath::partition(owner, collections::WORKOUT_PLANS)
}

pub fn shares_of(owner: &str) -> CollectionPath {
    CollectionPath::partition(owner, collections::SHARED_PLANS)
}

pub fn share_index() -> CollectionPath {
    CollectionPath::global(collections::SHARE_INDEX)
}

/// Asserts that index entries and live share records pair up exactly.
pub fn assert_index_pairing(remote: &InMemoryRemoteStore, sharers: &[&str]) {
    let entries: Vec<ShareIndexEntry> = remote
        .documents(&share_index())
        .into_iter()
        .map(|doc| serde_json::from_value(doc.data).unwrap())
        .collect();

    for entry in &entries {
        let record: ShareRecord = remote
            .documents(&shares_of(&entry.sharer_user_id))
            .into_iter()
            .map(|doc| serde_json::from_value::<ShareRecord>(doc.data).unwrap())
            .find(|r| r.plan_id == entry.plan_id && r.shared_with == entry.user_id)
            .unwrap_or_else(|| panic!("index entry {:?} has no share record", entry));
        assert_ne!(record.status, ShareStatus::Rejected, "index outlived {:?}", record);
    }

    for sharer in sharers {
        for doc in remote.documents(&shares_of(sharer)) {
            let record: ShareRecord = serde_json::from_value(doc.data).unwrap();
            let indexed = entries.iter().any(|e| {
                e.user_id == record.shared_with
                    && e.sharer_user_id == record.shared_by
                    && e.plan_id == record.plan_id
            });
            let live = record.status != ShareStatus::Rejected;
            assert_eq!(indexed, live, "pairing broken for {:?}", record);
        }
    }
}
