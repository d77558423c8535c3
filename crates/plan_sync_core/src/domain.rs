//! crates/plan_sync_core/src/domain.rs
//!
//! Defines the core data structures managed by the engine.
//! Every persisted shape serializes to camelCase JSON, which is the form both
//! stores hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a user as handed out by the authentication subsystem.
pub type UserId = String;

/// Identifier of a workout plan, unique within its owner's partition.
pub type PlanId = String;

/// Prefix carried by every id minted while the remote store was out of reach.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Owner recorded on plans created before any identity was resolvable.
pub const LOCAL_OWNER_PLACEHOLDER: &str = "local_user";

/// Returns `true` if `id` was produced offline and never assigned remotely.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

//=========================================================================================
// Workout Plans
//=========================================================================================

/// A single exercise. Its shape belongs to the UI layer; the engine carries it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exercise(pub serde_json::Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub day_name: String,
    #[serde(default)]
    pub is_rest_day: bool,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Day {
    /// A day counts as a training day when it is not a rest day and has work in it.
    pub fn is_training_day(&self) -> bool {
        !self.is_rest_day && !self.exercises.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    /// Stored documents take their id from the document key.
    #[serde(default)]
    pub id: PlanId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub shared_with: Vec<UserId>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_modified: DateTime<Utc>,
    /// Set while the latest committed edit lives only in the local store.
    #[serde(default)]
    pub pending_sync: bool,
}

impl WorkoutPlan {
    pub fn is_local_only(&self) -> bool {
        is_local_id(&self.id)
    }

    /// Adds `user` to the recipients. Returns `false` if already present.
    pub fn add_recipient(&mut self, user: &str) -> bool {
        if self.shared_with.iter().any(|u| u == user) {
            return false;
        }
        self.shared_with.push(user.to_string());
        self.refresh_shared_flag();
        true
    }

    /// Removes `user` from the recipients. Returns `false` if absent.
    pub fn remove_recipient(&mut self, user: &str) -> bool {
        let before = self.shared_with.len();
        self.shared_with.retain(|u| u != user);
        self.refresh_shared_flag();
        before != self.shared_with.len()
    }

    fn refresh_shared_flag(&mut self) {
        self.is_shared = !self.shared_with.is_empty();
    }

    /// True if any day named `weekday` (any casing) is a training day.
    pub fn trains_on(&self, weekday: &str) -> bool {
        let weekday = weekday.trim().to_lowercase();
        self.days
            .iter()
            .any(|d| d.day_name.trim().to_lowercase() == weekday && d.is_training_day())
    }
}

/// Caller input for creating a plan. Everything else is assigned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub name: String,
    #[serde(default)]
    pub days: Vec<Day>,
}

/// A partial edit of a plan's content. Sharing state is not editable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    pub name: Option<String>,
    pub days: Option<Vec<Day>>,
}

impl PlanPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.days.is_none()
    }

    pub fn apply_to(&self, plan: &mut WorkoutPlan) {
        if let Some(name) = &self.name {
            plan.name = name.clone();
        }
        if let Some(days) = &self.days {
            plan.days = days.clone();
        }
    }
}

//=========================================================================================
// Sharing
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ShareStatus {
    /// Accepted and Rejected are final; only Pending may transition.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ShareStatus::Pending)
    }
}

/// One share of one plan with one recipient. Lives in the sharer's partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub plan_id: PlanId,
    pub shared_by: UserId,
    pub shared_with: UserId,
    pub shared_at: DateTime<Utc>,
    pub status: ShareStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl ShareRecord {
    /// Document id of the record inside the sharer's partition.
    pub fn document_id(plan_id: &str, shared_with: &str) -> String {
        format!("{}_{}", plan_id, shared_with)
    }
}

/// Reverse-lookup row in the global side index, keyed by recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareIndexEntry {
    pub user_id: UserId,
    pub sharer_user_id: UserId,
    pub plan_id: PlanId,
    pub shared_at: DateTime<Utc>,
}

impl ShareIndexEntry {
    pub fn document_id(user_id: &str, sharer_user_id: &str, plan_id: &str) -> String {
        format!("{}_{}_{}", user_id, sharer_user_id, plan_id)
    }

    pub fn id(&self) -> String {
        Self::document_id(&self.user_id, &self.sharer_user_id, &self.plan_id)
    }
}

/// A plan someone else shared with the caller, together with the share itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedPlan {
    pub plan: WorkoutPlan,
    pub share: ShareRecord,
}

//=========================================================================================
// Local Bookkeeping
//=========================================================================================

/// Tombstone for a remote-backed plan deleted while the remote store was unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDelete {
    pub id: PlanId,
    pub owner_id: UserId,
    pub deleted_at: DateTime<Utc>,
}

//=========================================================================================
// Reconciliation Reports
//=========================================================================================

/// Outcome of one migration pass over the legacy flat collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    /// Legacy records whose id already exists in the owner's partition.
    pub already_present: usize,
    pub skipped_without_owner: usize,
    pub failed: usize,
    pub owners: usize,
}

/// Outcome of one local-to-remote sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub skipped_duplicate_name: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Offline edits dropped because the plan was deleted on another device.
    pub discarded: usize,
    pub failed: usize,
}
