//! crates/plan_sync_core/src/memory.rs
//!
//! In-process implementations of the ports. They back the engine's tests and
//! let embedders run the engine without any external infrastructure.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::domain::UserId;
use crate::ports::{
    CollectionPath, Document, IdentityProvider, LocalStore, PortError, PortResult, Query,
    RemoteStore, WriteBatch, WriteOp,
};

//=========================================================================================
// Identity
//=========================================================================================

/// An identity fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<UserId>,
}

impl StaticIdentity {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self { user_id }
    }

    pub fn signed_out() -> Self {
        Self { user_id: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }
}

/// An identity that can sign in and out while the engine is running.
#[derive(Debug, Default)]
pub struct SwitchableIdentity {
    user_id: RwLock<Option<UserId>>,
}

impl SwitchableIdentity {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self {
            user_id: RwLock::new(user_id),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        if let Ok(mut current) = self.user_id.write() {
            *current = Some(user_id.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut current) = self.user_id.write() {
            *current = None;
        }
    }
}

#[async_trait]
impl IdentityProvider for SwitchableIdentity {
    async fn current_user_id(&self) -> Option<UserId> {
        self.user_id.read().ok().and_then(|id| id.clone())
    }
}

//=========================================================================================
// Local Store
//=========================================================================================

#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    lists: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lists(&self) -> PortResult<MutexGuard<'_, HashMap<String, Vec<Value>>>> {
        self.lists
            .lock()
            .map_err(|e| PortError::Unexpected(format!("local store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn read_list(&self, key: &str) -> PortResult<Vec<Value>> {
        Ok(self.lists()?.get(key).cloned().unwrap_or_default())
    }

    async fn write_list(&self, key: &str, items: Vec<Value>) -> PortResult<()> {
        self.lists()?.insert(key.to_string(), items);
        Ok(())
    }
}

//=========================================================================================
// Remote Store
//=========================================================================================

type Collections = BTreeMap<CollectionPath, BTreeMap<String, Value>>;

/// A partitioned document store held in memory.
///
/// Reachability can be toggled to simulate losing the network, and individual
/// document ids can be made to fail on write.
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    collections: Mutex<Collections>,
    reachable: AtomicBool,
    failing_ids: Mutex<HashSet<String>>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            failing_ids: Mutex::new(HashSet::new()),
        }
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every later write touching document `id` fails with an unexpected error.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        if let Ok(mut ids) = self.failing_ids.lock() {
            ids.insert(id.into());
        }
    }

    pub fn clear_write_failures(&self) {
        if let Ok(mut ids) = self.failing_ids.lock() {
            ids.clear();
        }
    }

    /// Snapshot of one collection, ordered by document id.
    pub fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.collections
            .lock()
            .map(|c| {
                c.get(path)
                    .map(|docs| {
                        docs.iter()
                            .map(|(id, data)| Document {
                                id: id.clone(),
                                data: data.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn ensure_reachable(&self) -> PortResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Unavailable("remote store is offline".to_string()))
        }
    }

    fn ensure_writable(&self, id: &str) -> PortResult<()> {
        let failing = self
            .failing_ids
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if failing.contains(id) {
            return Err(PortError::Unexpected(format!("write rejected for {}", id)));
        }
        Ok(())
    }

    fn collections(&self) -> PortResult<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|e| PortError::Unexpected(format!("remote store lock poisoned: {}", e)))
    }
}

fn merge_fields(target: &mut Value, fields: &Map<String, Value>) {
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    fn new_id(&self, _path: &CollectionPath) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> PortResult<Option<Document>> {
        self.ensure_reachable()?;
        let collections = self.collections()?;
        Ok(collections
            .get(path)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, path: &CollectionPath, query: &Query) -> PortResult<Vec<Document>> {
        self.ensure_reachable()?;
        let collections = self.collections()?;
        let Some(docs) = collections.get(path) else {
            return Ok(Vec::new());
        };
        let matching = docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            });
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> PortResult<()> {
        self.ensure_reachable()?;
        self.ensure_writable(id)?;
        self.collections()?
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Map<String, Value>,
    ) -> PortResult<()> {
        self.ensure_reachable()?;
        self.ensure_writable(id)?;
        let mut collections = self.collections()?;
        let doc = collections
            .get_mut(path)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", path, id)))?;
        merge_fields(doc, &fields);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> PortResult<()> {
        self.ensure_reachable()?;
        self.ensure_writable(id)?;
        if let Some(docs) = self.collections()?.get_mut(path) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> PortResult<()> {
        self.ensure_reachable()?;
        let mut collections = self.collections()?;

        // Validate everything first so a rejected batch leaves no trace.
        for op in &batch.ops {
            let (path, id) = match op {
                WriteOp::Set { path, id, .. }
                | WriteOp::Update { path, id, .. }
                | WriteOp::Delete { path, id } => (path, id),
            };
            self.ensure_writable(id)?;
            if let WriteOp::Update { .. } = op {
                let exists = collections
                    .get(path)
                    .map(|docs| docs.contains_key(id))
                    .unwrap_or(false);
                if !exists {
                    return Err(PortError::NotFound(format!("{}/{}", path, id)));
                }
            }
        }

        let mut staged = collections.clone();
        for op in batch.ops {
            match op {
                WriteOp::Set { path, id, data } => {
                    staged.entry(path).or_default().insert(id, data);
                }
                WriteOp::Update { path, id, fields } => {
                    if let Some(doc) = staged.get_mut(&path).and_then(|d| d.get_mut(&id)) {
                        merge_fields(doc, &fields);
                    }
                }
                WriteOp::Delete { path, id } => {
                    if let Some(docs) = staged.get_mut(&path) {
                        docs.remove(&id);
                    }
                }
            }
        }
        *collections = staged;
        Ok(())
    }
}
