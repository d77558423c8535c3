//! crates/plan_sync_core/src/sync.rs
//!
//! Pushes work done offline up to the remote store once a user is signed in.
//!
//! Local-only plans are de-duplicated against the remote partition by plan
//! name. Two different local plans that share a name with one remote plan
//! are therefore never both pushed; that limitation is accepted.

use serde_json::{json, Map};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::domain::{SyncReport, WorkoutPlan, LOCAL_OWNER_PLACEHOLDER};
use crate::engine::{plans_path, PlanEngine};
use crate::error::{EngineError, EngineResult};
use crate::ports::Query;

impl PlanEngine {
    /// Reconciles local-only plans, offline edits and offline deletes.
    pub async fn sync_local_to_remote(&self) -> EngineResult<SyncReport> {
        let Some(me) = self.current_user().await else {
            debug!("No signed-in user, nothing to sync");
            return Ok(SyncReport::default());
        };
        let path = plans_path(&me);

        let remote_docs = self.remote.query(&path, &Query::all()).await?;
        let mut remote_names: HashSet<String> = remote_docs
            .iter()
            .filter_map(|doc| doc.data.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect();

        let mut report = SyncReport::default();
        let local = self.local_plans().await?;

        let claimable =
            |p: &&WorkoutPlan| p.owner_id == me || p.owner_id == LOCAL_OWNER_PLACEHOLDER;
        for plan in local.iter().filter(|p| p.is_local_only()).filter(claimable) {
            if remote_names.contains(&plan.name) {
                debug!("Plan '{}' already exists remotely, skipping {}", plan.name, plan.id);
                report.skipped_duplicate_name += 1;
                continue;
            }
            match self.push_local_only(plan, &me).await {
                Ok(remote_id) => {
                    info!("Synced local plan {} as {}", plan.id, remote_id);
                    remote_names.insert(plan.name.clone());
                    report.pushed += 1;
                }
                Err(e) => {
                    error!("Failed to sync local plan {}: {}", plan.id, e);
                    report.failed += 1;
                }
            }
        }

        for plan in local
            .iter()
            .filter(|p| !p.is_local_only() && p.pending_sync && p.owner_id == me)
        {
            match self.push_pending_edit(plan).await {
                Ok(()) => report.updated += 1,
                Err(EngineError::NotFound(_)) => {
                    // Deleted on another device; the delete wins over the offline edit.
                    warn!("Plan {} was deleted remotely, discarding its offline edit", plan.id);
                    match self.remove_local(&plan.id).await {
                        Ok(_) => report.discarded += 1,
                        Err(e) => {
                            error!("Failed to drop local copy of plan {}: {}", plan.id, e);
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to sync edit of plan {}: {}", plan.id, e);
                    report.failed += 1;
                }
            }
        }

        for tombstone in self.pending_deletes().await? {
            if tombstone.owner_id != me {
                continue;
            }
            match self.delete_plan_cascade(&tombstone.owner_id, &tombstone.id).await {
                Ok(_) => {
                    let id = tombstone.id.clone();
                    self.modify_pending_deletes(|tombstones| tombstones.retain(|t| t.id != id))
                        .await?;
                    self.remove_local(&tombstone.id).await?;
                    report.deleted += 1;
                }
                Err(e) => {
                    error!("Failed to replay delete of plan {}: {}", tombstone.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Sync finished: {} pushed, {} skipped by name, {} updated, {} deleted, {} discarded, {} failed",
            report.pushed,
            report.skipped_duplicate_name,
            report.updated,
            report.deleted,
            report.discarded,
            report.failed
        );
        Ok(report)
    }

    /// Writes a fresh remote copy of a local-only plan, then re-keys the local
    /// copy to the new remote id so it stays behind as the backup.
    ///
    /// The re-key works on whatever is cached when the push returns: an edit
    /// made meanwhile stays pending, and a local delete made meanwhile removes
    /// the fresh remote copy again.
    async fn push_local_only(&self, plan: &WorkoutPlan, me: &str) -> EngineResult<String> {
        let path = plans_path(me);
        let mut pushed = plan.clone();
        pushed.id = self.remote.new_id(&path);
        pushed.owner_id = me.to_string();
        pushed.pending_sync = false;
        let remote_id = pushed.id.clone();

        self.remote
            .set(&path, &remote_id, serde_json::to_value(&pushed)?)
            .await?;

        let local_id = plan.id.clone();
        let pushed_version = plan.last_modified;
        let backup_id = remote_id.clone();
        let owner = me.to_string();
        let rekeyed = self
            .modify_local_plans(move |plans| {
                let pos = plans.iter().position(|p| p.id == local_id)?;
                let mut backup = plans.remove(pos);
                backup.pending_sync = backup.last_modified > pushed_version;
                backup.id = backup_id;
                backup.owner_id = owner;
                plans.push(backup);
                Some(())
            })
            .await;

        match rekeyed {
            Ok(Some(())) => {}
            Ok(None) => {
                warn!("Local plan {} was deleted during sync, removing {}", plan.id, remote_id);
                self.delete_plan_cascade(me, &remote_id).await?;
            }
            Err(e) => {
                warn!("Plan {} synced but the local backup was not re-keyed: {}", remote_id, e);
            }
        }
        Ok(remote_id)
    }

    /// Pushes the content of a remote-backed plan edited offline.
    async fn push_pending_edit(&self, plan: &WorkoutPlan) -> EngineResult<()> {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(plan.name));
        fields.insert("days".to_string(), serde_json::to_value(&plan.days)?);
        fields.insert("lastModified".to_string(), serde_json::to_value(plan.last_modified)?);

        self.remote
            .update(&plans_path(&plan.owner_id), &plan.id, fields)
            .await?;

        let id = plan.id.clone();
        let synced_at = plan.last_modified;
        self.modify_local_plans(move |plans| {
            if let Some(cached) = plans.iter_mut().find(|p| p.id == id) {
                // A newer offline edit made during the push stays pending.
                if cached.last_modified <= synced_at {
                    cached.pending_sync = false;
                }
            }
        })
        .await
    }
}
