//! services/plan_sync/src/adapters/pg_remote.rs
//!
//! This module contains the PostgreSQL adapter, the concrete implementation
//! of the `RemoteStore` port from the `core` crate. Every collection of every
//! partition lives in a single `documents` table holding JSONB bodies.

use async_trait::async_trait;
use plan_sync_core::ports::{
    CollectionPath, Document, PortError, PortResult, Query, RemoteStore, Scope, WriteBatch,
    WriteOp,
};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgExecutor;
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A remote document store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    /// Creates a new `PgRemoteStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to apply the document table schema at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// True for failures that mean "cannot reach the database right now".
pub fn is_connectivity_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn map_sqlx_error(e: sqlx::Error) -> PortError {
    if is_connectivity_error(&e) {
        return PortError::Unavailable(e.to_string());
    }
    if let sqlx::Error::Database(db) = &e {
        // invalid_authorization_specification / invalid_password
        if matches!(db.code().as_deref(), Some("28000") | Some("28P01")) {
            return PortError::Unauthorized;
        }
    }
    PortError::Unexpected(e.to_string())
}

fn scope_key(path: &CollectionPath) -> String {
    match &path.scope {
        Scope::Partition(owner) => format!("users/{}", owner),
        Scope::Global => "global".to_string(),
    }
}

/// Folds equality filters into one JSONB containment document.
fn containment(query: &Query) -> Value {
    let mut filter = Map::new();
    for (field, value) in &query.filters {
        filter.insert(field.clone(), value.clone());
    }
    Value::Object(filter)
}

//=========================================================================================
// Statement Helpers (shared by single writes and batches)
//=========================================================================================

async fn upsert<'e, E: PgExecutor<'e>>(
    executor: E,
    path: &CollectionPath,
    id: &str,
    data: &Value,
) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO documents (scope, collection, id, data) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (scope, collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
    )
    .bind(scope_key(path))
    .bind(&path.name)
    .bind(id)
    .bind(Json(data))
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

async fn merge<'e, E: PgExecutor<'e>>(
    executor: E,
    path: &CollectionPath,
    id: &str,
    fields: &Map<String, Value>,
) -> PortResult<()> {
    let result = sqlx::query(
        "UPDATE documents SET data = data || $4, updated_at = NOW() \
         WHERE scope = $1 AND collection = $2 AND id = $3",
    )
    .bind(scope_key(path))
    .bind(&path.name)
    .bind(id)
    .bind(Json(fields))
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(PortError::NotFound(format!("{}/{}", path, id)));
    }
    Ok(())
}

async fn remove<'e, E: PgExecutor<'e>>(executor: E, path: &CollectionPath, id: &str) -> PortResult<()> {
    sqlx::query("DELETE FROM documents WHERE scope = $1 AND collection = $2 AND id = $3")
        .bind(scope_key(path))
        .bind(&path.name)
        .bind(id)
        .execute(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for PgRemoteStore {
    fn new_id(&self, _path: &CollectionPath) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> PortResult<Option<Document>> {
        let row = sqlx::query_as::<_, (Json<Value>,)>(
            "SELECT data FROM documents WHERE scope = $1 AND collection = $2 AND id = $3",
        )
        .bind(scope_key(path))
        .bind(&path.name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(Json(data),)| Document {
            id: id.to_string(),
            data,
        }))
    }

    async fn query(&self, path: &CollectionPath, query: &Query) -> PortResult<Vec<Document>> {
        let limit = query.limit.map(|l| l as i64);
        let rows = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents \
             WHERE scope = $1 AND collection = $2 AND data @> $3 \
             ORDER BY id LIMIT $4",
        )
        .bind(scope_key(path))
        .bind(&path.name)
        .bind(Json(containment(query)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Query on {} returned {} documents", path, rows.len());
        Ok(rows
            .into_iter()
            .map(|(id, Json(data))| Document { id, data })
            .collect())
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> PortResult<()> {
        upsert(&self.pool, path, id, &data).await
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Map<String, Value>,
    ) -> PortResult<()> {
        merge(&self.pool, path, id, &fields).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> PortResult<()> {
        remove(&self.pool, path, id).await
    }

    async fn commit(&self, batch: WriteBatch) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        // Any early return drops `tx`, which rolls the whole batch back.
        for op in &batch.ops {
            match op {
                WriteOp::Set { path, id, data } => upsert(&mut *tx, path, id, data).await?,
                WriteOp::Update { path, id, fields } => merge(&mut *tx, path, id, fields).await?,
                WriteOp::Delete { path, id } => remove(&mut *tx, path, id).await?,
            }
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        debug!("Committed batch of {} writes", batch.len());
        Ok(())
    }
}
