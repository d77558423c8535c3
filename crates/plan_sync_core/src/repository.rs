//! crates/plan_sync_core/src/repository.rs
//!
//! CRUD over workout plans with the remote-first, local-fallback policy.
//!
//! The remote store is authoritative whenever a user is signed in and the
//! store answers. Otherwise the local store takes the write and the plan is
//! flagged for the sync engine. The local store is kept as a superset cache
//! of everything the remote store returned.

use chrono::Utc;
use serde_json::{json, Map};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    is_local_id, NewPlan, PendingDelete, PlanId, PlanPatch, UserId, WorkoutPlan, LOCAL_ID_PREFIX,
    LOCAL_OWNER_PLACEHOLDER,
};
use crate::engine::{plan_from_document, plans_path, PlanEngine};
use crate::error::{EngineError, EngineResult};
use crate::ports::{PortError, Query};

impl PlanEngine {
    /// Creates a plan owned by the current user and returns its id.
    ///
    /// Ids minted while the remote store is out of reach carry the
    /// `local_` prefix.
    pub async fn create(&self, new_plan: NewPlan) -> EngineResult<PlanId> {
        if new_plan.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("plan name must not be empty".to_string()));
        }

        let now = Utc::now();
        let user = self.current_user().await;

        if let Some(owner) = &user {
            let path = plans_path(owner);
            let plan = WorkoutPlan {
                id: self.remote.new_id(&path),
                owner_id: owner.clone(),
                name: new_plan.name.clone(),
                days: new_plan.days.clone(),
                is_shared: false,
                shared_with: Vec::new(),
                created_at: now,
                last_modified: now,
                pending_sync: false,
            };
            match self.remote.set(&path, &plan.id, serde_json::to_value(&plan)?).await {
                Ok(()) => {
                    info!("Created plan {} in the remote store for {}", plan.id, owner);
                    self.cache_locally(&plan).await;
                    return Ok(plan.id);
                }
                Err(e) => warn!("Remote create failed, keeping the plan locally: {}", e),
            }
        }

        let plan = WorkoutPlan {
            id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple()),
            owner_id: user.unwrap_or_else(|| LOCAL_OWNER_PLACEHOLDER.to_string()),
            name: new_plan.name,
            days: new_plan.days,
            is_shared: false,
            shared_with: Vec::new(),
            created_at: now,
            last_modified: now,
            pending_sync: true,
        };
        let id = plan.id.clone();
        self.upsert_local(plan).await?;
        info!("Created local-only plan {}", id);
        Ok(id)
    }

    /// Fetches a plan, preferring the remote copy when it is reachable.
    pub async fn get(&self, id: &str) -> EngineResult<WorkoutPlan> {
        if self.is_pending_delete(id).await? {
            return Err(EngineError::NotFound(format!("plan {}", id)));
        }

        let local = self.local_plan(id).await?;
        if let Some(plan) = &local {
            if plan.is_local_only() || plan.pending_sync {
                return Ok(plan.clone());
            }
        }

        if !is_local_id(id) {
            if let Some(user) = self.current_user().await {
                match self.remote.get(&plans_path(&user), id).await {
                    Ok(Some(doc)) => {
                        let plan = plan_from_document(doc)?;
                        self.refresh_local_mirror(std::slice::from_ref(&plan)).await;
                        return Ok(plan);
                    }
                    Ok(None) => debug!("Plan {} not in the remote partition of {}", id, user),
                    Err(e) => warn!("Remote read of plan {} failed, using local copy: {}", id, e),
                }
            }
        }

        local.ok_or_else(|| EngineError::NotFound(format!("plan {}", id)))
    }

    /// Applies `patch` to a plan the caller owns and stamps `lastModified`.
    pub async fn update(&self, id: &str, patch: PlanPatch) -> EngineResult<()> {
        let mut plan = self.owned_plan(id).await?;
        let user = self.authorize_owner(&plan).await?;

        patch.apply_to(&mut plan);
        plan.last_modified = Utc::now();

        if !plan.is_local_only() && user.is_some() {
            let mut fields = Map::new();
            fields.insert("name".to_string(), json!(plan.name));
            fields.insert("days".to_string(), serde_json::to_value(&plan.days)?);
            fields.insert(
                "lastModified".to_string(),
                serde_json::to_value(plan.last_modified)?,
            );
            match self.remote.update(&plans_path(&plan.owner_id), id, fields).await {
                Ok(()) => {
                    plan.pending_sync = false;
                    self.cache_locally(&plan).await;
                    debug!("Updated plan {} in the remote store", id);
                    return Ok(());
                }
                Err(PortError::NotFound(_)) => {
                    return Err(EngineError::NotFound(format!("plan {}", id)));
                }
                Err(e) => warn!("Remote update of plan {} failed, editing locally: {}", id, e),
            }
        }

        plan.pending_sync = true;
        self.upsert_local(plan).await?;
        info!("Stored edit of plan {} locally, pending sync", id);
        Ok(())
    }

    /// Deletes a plan the caller owns along with every share of it.
    pub async fn delete(&self, id: &str) -> EngineResult<()> {
        let plan = self.owned_plan(id).await?;
        let user = self.authorize_owner(&plan).await?;

        if !plan.is_local_only() && user.is_some() {
            match self.delete_plan_cascade(&plan.owner_id, id).await {
                Ok(writes) => info!("Deleted plan {} remotely ({} documents)", id, writes),
                Err(EngineError::StoreUnavailable(why)) => {
                    warn!("Remote delete of plan {} deferred: {}", id, why);
                    let tombstone = PendingDelete {
                        id: id.to_string(),
                        owner_id: plan.owner_id.clone(),
                        deleted_at: Utc::now(),
                    };
                    self.modify_pending_deletes(move |tombstones| {
                        if !tombstones.iter().any(|t| t.id == tombstone.id) {
                            tombstones.push(tombstone);
                        }
                    })
                    .await?;
                }
                Err(e) => return Err(e),
            }
        }

        self.remove_local(id).await?;
        Ok(())
    }

    /// Lists the caller's plans from both stores, de-duplicated by id.
    pub async fn list_own(&self) -> EngineResult<Vec<WorkoutPlan>> {
        let user = self.current_user().await;
        let tombstones: HashSet<PlanId> = self
            .pending_deletes()
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let mut remote_plans = Vec::new();
        let mut remote_listed = false;
        if let Some(user) = &user {
            match self.remote.query(&plans_path(user), &Query::all()).await {
                Ok(docs) => {
                    remote_listed = true;
                    for doc in docs {
                        let doc_id = doc.id.clone();
                        match plan_from_document(doc) {
                            Ok(plan) if tombstones.contains(&plan.id) => {}
                            Ok(plan) => remote_plans.push(plan),
                            Err(e) => warn!("Skipping unreadable remote plan {}: {}", doc_id, e),
                        }
                    }
                    self.refresh_local_mirror(&remote_plans).await;
                }
                Err(e) => warn!("Listing remote plans failed, serving local plans only: {}", e),
            }
        }

        let mut merged: HashMap<PlanId, WorkoutPlan> = remote_plans
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        for plan in self.local_plans().await? {
            if !owned_by(&plan, user.as_deref()) || tombstones.contains(&plan.id) {
                continue;
            }
            let in_remote = merged.contains_key(&plan.id);
            // A synced copy the reachable remote no longer lists was deleted elsewhere.
            if remote_listed && !in_remote && !plan.is_local_only() && !plan.pending_sync {
                continue;
            }
            if !in_remote || plan.pending_sync {
                merged.insert(plan.id.clone(), plan);
            }
        }

        let mut plans: Vec<WorkoutPlan> = merged.into_values().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(plans)
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    /// Resolves a plan for an owner-only operation.
    ///
    /// A plan that is only visible to the caller through a share reports
    /// `Unauthorized` rather than `NotFound`.
    async fn owned_plan(&self, id: &str) -> EngineResult<WorkoutPlan> {
        match self.get(id).await {
            Err(EngineError::NotFound(what)) => {
                if let Some(user) = self.current_user().await {
                    if let Ok(Some(entry)) = self.share_index.entry_for(&user, id).await {
                        return Err(EngineError::Unauthorized(format!(
                            "plan {} belongs to {}",
                            id, entry.sharer_user_id
                        )));
                    }
                }
                Err(EngineError::NotFound(what))
            }
            other => other,
        }
    }

    /// Checks that the caller may modify `plan` and returns the signed-in user.
    ///
    /// While signed out only plans created on this device before sign-in
    /// may be modified.
    pub(crate) async fn authorize_owner(&self, plan: &WorkoutPlan) -> EngineResult<Option<UserId>> {
        let placeholder_owned = plan.owner_id == LOCAL_OWNER_PLACEHOLDER;
        match self.current_user().await {
            Some(user) if plan.owner_id == user || placeholder_owned => Ok(Some(user)),
            Some(user) => Err(EngineError::Unauthorized(format!(
                "{} does not own plan {}",
                user, plan.id
            ))),
            None if placeholder_owned || plan.is_local_only() => Ok(None),
            None => Err(EngineError::Unauthorized(format!(
                "sign in to modify plan {}",
                plan.id
            ))),
        }
    }

    async fn is_pending_delete(&self, id: &str) -> EngineResult<bool> {
        Ok(self.pending_deletes().await?.iter().any(|t| t.id == id))
    }
}

fn owned_by(plan: &WorkoutPlan, user: Option<&str>) -> bool {
    plan.owner_id == LOCAL_OWNER_PLACEHOLDER || Some(plan.owner_id.as_str()) == user
}
