//! crates/plan_sync_core/src/share_index.rs
//!
//! The global side index that answers "what was shared with me" with a
//! single query instead of a scan over every sharer's partition.
//!
//! Invariant: an entry `(recipient, sharer, plan)` exists exactly while the
//! sharer's partition holds a Pending or Accepted share record for the same
//! triple. Entries are only ever written or removed inside the same atomic
//! batch that writes or terminates that record, so neither can be observed
//! without the other.

use std::sync::Arc;

use crate::domain::ShareIndexEntry;
use crate::engine::collections;
use crate::error::{EngineError, EngineResult};
use crate::ports::{CollectionPath, Query, RemoteStore, WriteBatch};

pub struct ShareIndex {
    remote: Arc<dyn RemoteStore>,
    path: CollectionPath,
}

impl ShareIndex {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            path: CollectionPath::global(collections::SHARE_INDEX),
        }
    }

    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Stages the creation (or replacement) of `entry`.
    pub fn put(&self, batch: &mut WriteBatch, entry: &ShareIndexEntry) -> EngineResult<()> {
        batch.set(self.path.clone(), entry.id(), serde_json::to_value(entry)?);
        Ok(())
    }

    /// Stages the removal of an entry. Removing an absent entry is a no-op.
    pub fn remove(&self, batch: &mut WriteBatch, recipient: &str, sharer: &str, plan_id: &str) {
        batch.delete(
            self.path.clone(),
            ShareIndexEntry::document_id(recipient, sharer, plan_id),
        );
    }

    /// Every share addressed to `recipient`.
    pub async fn entries_for(&self, recipient: &str) -> EngineResult<Vec<ShareIndexEntry>> {
        let docs = self
            .remote
            .query(&self.path, &Query::all().where_eq("userId", recipient))
            .await?;
        docs.into_iter()
            .map(|doc| {
                serde_json::from_value::<ShareIndexEntry>(doc.data).map_err(EngineError::from)
            })
            .collect()
    }

    /// The share of `plan_id` addressed to `recipient`, if any.
    pub async fn entry_for(
        &self,
        recipient: &str,
        plan_id: &str,
    ) -> EngineResult<Option<ShareIndexEntry>> {
        let docs = self
            .remote
            .query(
                &self.path,
                &Query::all()
                    .where_eq("userId", recipient)
                    .where_eq("planId", plan_id)
                    .limit(1),
            )
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc.data)?)),
            None => Ok(None),
        }
    }
}
