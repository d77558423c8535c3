//! services/plan_sync/src/adapters/offline_remote.rs
//!
//! A `RemoteStore` that is never reachable. The binary falls back to it when no
//! database is configured or the database cannot be reached, so every engine
//! operation takes its local-cache path.

use async_trait::async_trait;
use plan_sync_core::ports::{
    CollectionPath, Document, PortError, PortResult, Query, RemoteStore, WriteBatch,
};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct OfflineRemoteStore;

fn offline() -> PortError {
    PortError::Unavailable("remote store is not configured".to_string())
}

#[async_trait]
impl RemoteStore for OfflineRemoteStore {
    fn new_id(&self, _path: &CollectionPath) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn get(&self, _path: &CollectionPath, _id: &str) -> PortResult<Option<Document>> {
        Err(offline())
    }

    async fn query(&self, _path: &CollectionPath, _query: &Query) -> PortResult<Vec<Document>> {
        Err(offline())
    }

    async fn set(&self, _path: &CollectionPath, _id: &str, _data: Value) -> PortResult<()> {
        Err(offline())
    }

    async fn update(
        &self,
        _path: &CollectionPath,
        _id: &str,
        _fields: Map<String, Value>,
    ) -> PortResult<()> {
        Err(offline())
    }

    async fn delete(&self, _path: &CollectionPath, _id: &str) -> PortResult<()> {
        Err(offline())
    }

    async fn commit(&self, _batch: WriteBatch) -> PortResult<()> {
        Err(offline())
    }
}
