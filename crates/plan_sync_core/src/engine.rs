//! crates/plan_sync_core/src/engine.rs
//!
//! The engine object and the plumbing its operations share: collection
//! names, identity resolution and read-modify-write access to the local cache.
//!
//! The operations themselves live next to their concerns in `repository`,
//! `sharing`, `migration`, `sync` and `query`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{PendingDelete, UserId, WorkoutPlan};
use crate::error::{EngineError, EngineResult};
use crate::ports::{CollectionPath, Document, IdentityProvider, LocalStore, RemoteStore};
use crate::share_index::ShareIndex;

/// Names of the collections the engine reads and writes.
pub mod collections {
    /// Per-owner plans, and the local cache of them.
    pub const WORKOUT_PLANS: &str = "workoutPlans";
    /// Per-sharer share records.
    pub const SHARED_PLANS: &str = "sharedPlans";
    /// Global reverse-lookup index of shares keyed by recipient.
    pub const SHARE_INDEX: &str = "sharedWithUsers";
    /// Deprecated flat collection holding every user's plans.
    pub const LEGACY_WORKOUT_PLANS: &str = "workoutPlans";
    /// Completion markers of one-shot remote migrations.
    pub const MIGRATIONS: &str = "migrations";
    /// Local tombstones of deletes that still need to reach the remote store.
    pub const PENDING_DELETES: &str = "pendingDeletes";
}

pub(crate) fn plans_path(owner: &str) -> CollectionPath {
    CollectionPath::partition(owner, collections::WORKOUT_PLANS)
}

pub(crate) fn shares_path(owner: &str) -> CollectionPath {
    CollectionPath::partition(owner, collections::SHARED_PLANS)
}

/// Parses a stored plan. The document id wins over any `id` field in the body.
pub(crate) fn plan_from_document(doc: Document) -> EngineResult<WorkoutPlan> {
    let mut plan: WorkoutPlan = serde_json::from_value(doc.data)?;
    plan.id = doc.id;
    Ok(plan)
}

/// Manages workout plans across the local cache and the remote store.
///
/// Built once by the composition root and shared by reference; every
/// operation is safe to call concurrently.
pub struct PlanEngine {
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) share_index: ShareIndex,
    /// Serializes read-modify-write cycles over local collections.
    local_lock: Mutex<()>,
}

impl PlanEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let share_index = ShareIndex::new(remote.clone());
        Self {
            local,
            remote,
            identity,
            share_index,
            local_lock: Mutex::new(()),
        }
    }

    //=====================================================================================
    // Identity
    //=====================================================================================

    pub(crate) async fn current_user(&self) -> Option<UserId> {
        self.identity.current_user_id().await
    }

    /// Operations without a local fallback need a signed-in user.
    pub(crate) async fn require_user(&self) -> EngineResult<UserId> {
        self.current_user()
            .await
            .ok_or_else(|| EngineError::StoreUnavailable("no authenticated identity".to_string()))
    }

    //=====================================================================================
    // Local Plans
    //=====================================================================================

    pub(crate) async fn local_plans(&self) -> EngineResult<Vec<WorkoutPlan>> {
        let items = self.local.read_list(collections::WORKOUT_PLANS).await?;
        Ok(decode_plans(items))
    }

    pub(crate) async fn local_plan(&self, id: &str) -> EngineResult<Option<WorkoutPlan>> {
        Ok(self.local_plans().await?.into_iter().find(|p| p.id == id))
    }

    /// Runs `edit` over the cached plans and writes the result back.
    pub(crate) async fn modify_local_plans<F, R>(&self, edit: F) -> EngineResult<R>
    where
        F: FnOnce(&mut Vec<WorkoutPlan>) -> R,
    {
        self.modify_local_list(collections::WORKOUT_PLANS, edit).await
    }

    /// Read-modify-write of one local collection under the local lock.
    ///
    /// Only entries that decode as `T` are handed to `edit`; the rest are
    /// written back untouched after them.
    async fn modify_local_list<T, F, R>(&self, key: &str, edit: F) -> EngineResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> R,
    {
        let _guard = self.local_lock.lock().await;
        let mut items = Vec::new();
        let mut unreadable = Vec::new();
        for raw in self.local.read_list(key).await? {
            match serde_json::from_value::<T>(raw.clone()) {
                Ok(item) => items.push(item),
                Err(e) => {
                    debug!("Carrying over unreadable entry of '{}': {}", key, e);
                    unreadable.push(raw);
                }
            }
        }

        let result = edit(&mut items);
        let mut values = items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        values.extend(unreadable);
        self.local.write_list(key, values).await?;
        Ok(result)
    }

    /// Inserts or replaces the cached copy of `plan`.
    pub(crate) async fn upsert_local(&self, plan: WorkoutPlan) -> EngineResult<()> {
        self.modify_local_plans(move |plans| match plans.iter_mut().find(|p| p.id == plan.id) {
            Some(existing) => *existing = plan,
            None => plans.push(plan),
        })
        .await
    }

    pub(crate) async fn remove_local(&self, id: &str) -> EngineResult<bool> {
        self.modify_local_plans(|plans| {
            let before = plans.len();
            plans.retain(|p| p.id != id);
            before != plans.len()
        })
        .await
    }

    /// Best-effort backup of a plan the remote store just accepted.
    pub(crate) async fn cache_locally(&self, plan: &WorkoutPlan) {
        if let Err(e) = self.upsert_local(plan.clone()).await {
            warn!("Failed to mirror plan {} into the local store: {}", plan.id, e);
        }
    }

    /// Best-effort refresh of cached copies from remote reads.
    ///
    /// Copies holding unsynced local edits are left alone.
    pub(crate) async fn refresh_local_mirror(&self, fresh: &[WorkoutPlan]) {
        if fresh.is_empty() {
            return;
        }
        let result = self
            .modify_local_plans(|plans| {
                let mut index: HashMap<String, usize> = plans
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.id.clone(), i))
                    .collect();
                for plan in fresh {
                    let slot = index.get(&plan.id).copied();
                    match slot {
                        Some(i) if plans[i].pending_sync => {}
                        Some(i) => plans[i] = plan.clone(),
                        None => {
                            index.insert(plan.id.clone(), plans.len());
                            plans.push(plan.clone());
                        }
                    }
                }
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to refresh the local plan mirror: {}", e);
        }
    }

    //=====================================================================================
    // Local Tombstones
    //=====================================================================================

    pub(crate) async fn pending_deletes(&self) -> EngineResult<Vec<PendingDelete>> {
        let items = self.local.read_list(collections::PENDING_DELETES).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(tombstone) => Some(tombstone),
                Err(e) => {
                    warn!("Skipping unreadable pending delete: {}", e);
                    None
                }
            })
            .collect())
    }

    pub(crate) async fn modify_pending_deletes<F>(&self, edit: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Vec<PendingDelete>),
    {
        self.modify_local_list(collections::PENDING_DELETES, edit).await
    }
}

fn decode_plans(items: Vec<Value>) -> Vec<WorkoutPlan> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<WorkoutPlan>(item) {
            Ok(plan) => Some(plan),
            Err(e) => {
                debug!("Skipping unreadable cached plan: {}", e);
                None
            }
        })
        .collect()
}
