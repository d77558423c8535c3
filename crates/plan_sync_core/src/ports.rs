//! crates/plan_sync_core/src/ports.rs
//!
//! Defines the contracts (traits) the engine depends on.
//! These traits form the boundary of the hexagonal architecture: the engine
//! never knows whether the remote store is a hosted document database or a
//! SQL table, nor how the local cache is persisted on the device.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::UserId;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The store could not be reached or refused the caller's credentials.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PortError::Unavailable(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` while signed out.
    async fn current_user_id(&self) -> Option<UserId>;
}

//=========================================================================================
// Local Store
//=========================================================================================

/// A durable, always-available cache of whole JSON collections.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Reads a collection. A collection that was never written reads as empty.
    async fn read_list(&self, key: &str) -> PortResult<Vec<Value>>;

    /// Replaces a collection.
    async fn write_list(&self, key: &str, items: Vec<Value>) -> PortResult<()>;
}

//=========================================================================================
// Remote Store
//=========================================================================================

/// Which slice of the remote store a collection lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Owned by one user.
    Partition(UserId),
    /// Not owner-scoped.
    Global,
}

/// Address of one collection in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    pub scope: Scope,
    pub name: String,
}

impl CollectionPath {
    pub fn partition(owner: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Partition(owner.into()),
            name: name.into(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Global,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            Scope::Partition(owner) => write!(f, "users/{}/{}", owner, self.name),
            Scope::Global => write!(f, "{}", self.name),
        }
    }
}

/// A stored document: its id plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Equality filters on top-level fields, all of which must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks a document body against every filter.
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace the whole document.
    Set {
        path: CollectionPath,
        id: String,
        data: Value,
    },
    /// Merge top-level fields into an existing document.
    Update {
        path: CollectionPath,
        id: String,
        fields: Map<String, Value>,
    },
    /// Remove the document. Removing a missing document is not an error.
    Delete { path: CollectionPath, id: String },
}

/// A group of writes that the store applies all together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: CollectionPath, id: impl Into<String>, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set {
            path,
            id: id.into(),
            data,
        });
        self
    }

    pub fn update(
        &mut self,
        path: CollectionPath,
        id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Update {
            path,
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, path: CollectionPath, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { path, id: id.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// A partitioned, authenticated document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Mints a fresh document id for `path` without touching the network.
    fn new_id(&self, path: &CollectionPath) -> String;

    async fn get(&self, path: &CollectionPath, id: &str) -> PortResult<Option<Document>>;

    async fn query(&self, path: &CollectionPath, query: &Query) -> PortResult<Vec<Document>>;

    /// Creates or replaces a document. Idempotent for a given id and body.
    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> PortResult<()>;

    /// Merges fields into an existing document; `NotFound` if it does not exist.
    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Map<String, Value>,
    ) -> PortResult<()>;

    /// Removes a document. Removing a missing document succeeds.
    async fn delete(&self, path: &CollectionPath, id: &str) -> PortResult<()>;

    /// Applies every write in `batch` atomically.
    async fn commit(&self, batch: WriteBatch) -> PortResult<()>;
}
