//! crates/plan_sync_core/src/sharing.rs
//!
//! Share lifecycle: share, accept, reject, unshare, and the two-hop
//! "shared with me" lookup through the side index.
//!
//! Sharing has no local fallback. Every mutation is a single atomic batch
//! against the remote store, and an unreachable store surfaces to the caller.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::domain::{
    is_local_id, PlanId, ShareIndexEntry, ShareRecord, ShareStatus, SharedPlan, UserId,
    WorkoutPlan,
};
use crate::engine::{plan_from_document, plans_path, shares_path, PlanEngine};
use crate::error::{EngineError, EngineResult};
use crate::ports::{PortError, Query, WriteBatch};

/// The sharing fields of a plan, as written back after membership changes.
fn sharing_fields(plan: &WorkoutPlan) -> EngineResult<Map<String, Value>> {
    let mut fields = Map::new();
    fields.insert("sharedWith".to_string(), serde_json::to_value(&plan.shared_with)?);
    fields.insert("isShared".to_string(), json!(plan.is_shared));
    Ok(fields)
}

fn status_fields(status: ShareStatus, at: DateTime<Utc>) -> EngineResult<Map<String, Value>> {
    let mut fields = Map::new();
    fields.insert("status".to_string(), serde_json::to_value(status)?);
    fields.insert("respondedAt".to_string(), serde_json::to_value(at)?);
    Ok(fields)
}

/// A response whose share record vanished after lookup lost a race with `unshare`.
fn withdrawn_as_conflict(e: PortError) -> EngineError {
    match e {
        PortError::NotFound(what) => {
            debug!("Share target disappeared before the response landed: {}", what);
            EngineError::ConflictAlreadyProcessed
        }
        other => other.into(),
    }
}

impl PlanEngine {
    /// Shares one of the caller's plans with `target_user`.
    pub async fn share(&self, plan_id: &str, target_user: &str) -> EngineResult<()> {
        let me = self.require_user().await?;
        let target = target_user.trim();
        if target.is_empty() {
            return Err(EngineError::InvalidInput("share target must not be empty".to_string()));
        }
        if target == me {
            return Err(EngineError::InvalidInput("cannot share a plan with yourself".to_string()));
        }
        if is_local_id(plan_id) {
            return Err(EngineError::InvalidInput(format!(
                "plan {} must be synced before it can be shared",
                plan_id
            )));
        }

        let mut plan = self.remote_owned_plan(&me, plan_id).await?;
        if !plan.add_recipient(target) {
            return Err(EngineError::ConflictAlreadyProcessed);
        }

        let now = Utc::now();
        let record = ShareRecord {
            plan_id: plan_id.to_string(),
            shared_by: me.clone(),
            shared_with: target.to_string(),
            shared_at: now,
            status: ShareStatus::Pending,
            responded_at: None,
        };
        let entry = ShareIndexEntry {
            user_id: target.to_string(),
            sharer_user_id: me.clone(),
            plan_id: plan_id.to_string(),
            shared_at: now,
        };

        let mut batch = WriteBatch::new();
        batch.set(
            shares_path(&me),
            ShareRecord::document_id(plan_id, target),
            serde_json::to_value(&record)?,
        );
        self.share_index.put(&mut batch, &entry)?;
        batch.update(plans_path(&me), plan_id, sharing_fields(&plan)?);
        self.remote.commit(batch).await?;

        info!("Shared plan {} with {}", plan_id, target);
        self.refresh_local_mirror(std::slice::from_ref(&plan)).await;
        Ok(())
    }

    /// Withdraws a share. Safe to repeat; missing records and entries are ignored.
    pub async fn unshare(&self, plan_id: &str, target_user: &str) -> EngineResult<()> {
        let me = self.require_user().await?;
        let mut plan = self.remote_owned_plan(&me, plan_id).await?;
        plan.remove_recipient(target_user);

        let mut batch = WriteBatch::new();
        batch.delete(shares_path(&me), ShareRecord::document_id(plan_id, target_user));
        self.share_index.remove(&mut batch, target_user, &me, plan_id);
        batch.update(plans_path(&me), plan_id, sharing_fields(&plan)?);
        self.remote.commit(batch).await?;

        info!("Unshared plan {} from {}", plan_id, target_user);
        self.refresh_local_mirror(std::slice::from_ref(&plan)).await;
        Ok(())
    }

    /// Accepts a pending share addressed to the caller.
    pub async fn accept(&self, plan_id: &str) -> EngineResult<()> {
        let me = self.require_user().await?;
        let entry = self.pending_share_for(&me, plan_id).await?;

        let mut batch = WriteBatch::new();
        batch.update(
            shares_path(&entry.sharer_user_id),
            ShareRecord::document_id(plan_id, &me),
            status_fields(ShareStatus::Accepted, Utc::now())?,
        );
        self.remote.commit(batch).await.map_err(withdrawn_as_conflict)?;

        info!("{} accepted plan {} from {}", me, plan_id, entry.sharer_user_id);
        Ok(())
    }

    /// Rejects a pending share and drops the caller from the plan's recipients.
    pub async fn reject(&self, plan_id: &str) -> EngineResult<()> {
        let me = self.require_user().await?;
        let entry = self.pending_share_for(&me, plan_id).await?;
        let sharer = entry.sharer_user_id.as_str();

        let mut batch = WriteBatch::new();
        batch.update(
            shares_path(sharer),
            ShareRecord::document_id(plan_id, &me),
            status_fields(ShareStatus::Rejected, Utc::now())?,
        );
        self.share_index.remove(&mut batch, &me, sharer, plan_id);

        match self.remote.get(&plans_path(sharer), plan_id).await? {
            Some(doc) => {
                let mut plan = plan_from_document(doc)?;
                plan.remove_recipient(&me);
                batch.update(plans_path(sharer), plan_id, sharing_fields(&plan)?);
            }
            None => warn!("Plan {} of {} vanished before rejection", plan_id, sharer),
        }
        self.remote.commit(batch).await.map_err(withdrawn_as_conflict)?;

        info!("{} rejected plan {} from {}", me, plan_id, sharer);
        Ok(())
    }

    /// Plans other users shared with the caller that are pending or accepted.
    pub async fn list_shared_with_me(&self) -> EngineResult<Vec<SharedPlan>> {
        let me = self.require_user().await?;
        let entries = self.share_index.entries_for(&me).await?;

        let mut by_sharer: BTreeMap<UserId, BTreeSet<PlanId>> = BTreeMap::new();
        for entry in entries {
            by_sharer
                .entry(entry.sharer_user_id)
                .or_default()
                .insert(entry.plan_id);
        }
        debug!("{} has shares from {} users", me, by_sharer.len());

        let lookups = by_sharer
            .iter()
            .map(|(sharer, plan_ids)| self.shared_plans_from(sharer, &me, plan_ids));
        let mut shared: Vec<SharedPlan> =
            try_join_all(lookups).await?.into_iter().flatten().collect();
        shared.sort_by(|a, b| b.share.shared_at.cmp(&a.share.shared_at));
        Ok(shared)
    }

    /// Every share record of one of the caller's plans.
    pub async fn list_outgoing_shares(&self, plan_id: &str) -> EngineResult<Vec<ShareRecord>> {
        let me = self.require_user().await?;
        self.remote_owned_plan(&me, plan_id).await?;

        let docs = self
            .remote
            .query(&shares_path(&me), &Query::all().where_eq("planId", plan_id))
            .await?;
        let mut records = docs
            .into_iter()
            .map(|doc| serde_json::from_value::<ShareRecord>(doc.data).map_err(EngineError::from))
            .collect::<EngineResult<Vec<_>>>()?;
        records.sort_by(|a, b| a.shared_at.cmp(&b.shared_at));
        Ok(records)
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    /// Deletes a plan and all of its share records and index entries in one batch.
    ///
    /// Returns the number of documents the batch touched.
    pub(crate) async fn delete_plan_cascade(&self, owner: &str, plan_id: &str) -> EngineResult<usize> {
        let docs = self
            .remote
            .query(&shares_path(owner), &Query::all().where_eq("planId", plan_id))
            .await?;

        let mut batch = WriteBatch::new();
        for doc in docs {
            match serde_json::from_value::<ShareRecord>(doc.data) {
                Ok(record) => {
                    self.share_index
                        .remove(&mut batch, &record.shared_with, owner, plan_id);
                }
                Err(e) => warn!("Share record {} unreadable, deleting it anyway: {}", doc.id, e),
            }
            batch.delete(shares_path(owner), doc.id);
        }
        batch.delete(plans_path(owner), plan_id);

        let writes = batch.len();
        self.remote.commit(batch).await?;
        Ok(writes)
    }

    /// Loads a plan from the caller's own partition for an owner-only operation.
    async fn remote_owned_plan(&self, me: &str, plan_id: &str) -> EngineResult<WorkoutPlan> {
        match self.remote.get(&plans_path(me), plan_id).await? {
            Some(doc) => {
                let plan = plan_from_document(doc)?;
                if plan.owner_id != me {
                    return Err(EngineError::Unauthorized(format!(
                        "{} does not own plan {}",
                        me, plan_id
                    )));
                }
                Ok(plan)
            }
            None => match self.share_index.entry_for(me, plan_id).await? {
                Some(entry) => Err(EngineError::Unauthorized(format!(
                    "plan {} belongs to {}",
                    plan_id, entry.sharer_user_id
                ))),
                None => Err(EngineError::NotFound(format!("plan {}", plan_id))),
            },
        }
    }

    /// Finds the caller's pending share of `plan_id` via index → sharer → record.
    async fn pending_share_for(&self, me: &str, plan_id: &str) -> EngineResult<ShareIndexEntry> {
        let entry = self
            .share_index
            .entry_for(me, plan_id)
            .await?
            .ok_or(EngineError::ConflictAlreadyProcessed)?;

        let doc = self
            .remote
            .get(
                &shares_path(&entry.sharer_user_id),
                &ShareRecord::document_id(plan_id, me),
            )
            .await?
            .ok_or(EngineError::ConflictAlreadyProcessed)?;
        let record: ShareRecord = serde_json::from_value(doc.data)?;
        if record.status.is_terminal() {
            return Err(EngineError::ConflictAlreadyProcessed);
        }
        Ok(entry)
    }

    /// Resolves the shares one sharer addressed to `me`, restricted to indexed plans.
    async fn shared_plans_from(
        &self,
        sharer: &str,
        me: &str,
        plan_ids: &BTreeSet<PlanId>,
    ) -> EngineResult<Vec<SharedPlan>> {
        let docs = self
            .remote
            .query(&shares_path(sharer), &Query::all().where_eq("sharedWith", me))
            .await?;

        let mut shared = Vec::new();
        for doc in docs {
            let record: ShareRecord = match serde_json::from_value(doc.data) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable share record {}: {}", doc.id, e);
                    continue;
                }
            };
            if record.status == ShareStatus::Rejected || !plan_ids.contains(&record.plan_id) {
                continue;
            }
            match self.remote.get(&plans_path(sharer), &record.plan_id).await? {
                Some(plan_doc) => shared.push(SharedPlan {
                    plan: plan_from_document(plan_doc)?,
                    share: record,
                }),
                None => warn!("Shared plan {} of {} no longer exists", record.plan_id, sharer),
            }
        }
        Ok(shared)
    }
}
