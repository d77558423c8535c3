//! crates/plan_sync_core/src/migration.rs
//!
//! One-shot copy of the legacy flat plan collection into per-owner partitions.
//!
//! The copy is additive: the legacy collection is never modified. A legacy id
//! that already exists in the owner's partition is left untouched, so a rerun
//! after a partial failure never overwrites newer data. A pass that finishes
//! without failures records a marker in the global `migrations` collection,
//! and every later call is a no-op.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::domain::{MigrationReport, UserId, LOCAL_OWNER_PLACEHOLDER};
use crate::engine::{collections, plans_path, PlanEngine};
use crate::error::EngineResult;
use crate::ports::{CollectionPath, Document, Query};

/// Marker document id of the legacy plan migration.
pub const LEGACY_PLANS_MARKER: &str = "legacyWorkoutPlans";

fn markers_path() -> CollectionPath {
    CollectionPath::global(collections::MIGRATIONS)
}

/// The owner a legacy record belongs to, if it names a real one.
fn legacy_owner(data: &Value) -> Option<UserId> {
    let owner = data.get("ownerId")?.as_str()?.trim();
    if owner.is_empty() || owner == LOCAL_OWNER_PLACEHOLDER {
        return None;
    }
    Some(owner.to_string())
}

impl PlanEngine {
    /// Migrates legacy plans into their owners' partitions unless already done.
    pub async fn run_migration_if_needed(&self) -> EngineResult<MigrationReport> {
        if self
            .remote
            .get(&markers_path(), LEGACY_PLANS_MARKER)
            .await?
            .is_some()
        {
            debug!("Legacy plan migration already completed");
            return Ok(MigrationReport::default());
        }

        let legacy = CollectionPath::global(collections::LEGACY_WORKOUT_PLANS);
        let probe = self.remote.query(&legacy, &Query::all().limit(1)).await?;
        if probe.is_empty() {
            debug!("No legacy plans found, skipping migration");
            return Ok(MigrationReport::default());
        }

        let docs = self.remote.query(&legacy, &Query::all()).await?;
        info!("Migrating {} legacy plans", docs.len());

        let mut report = MigrationReport::default();
        let mut by_owner: BTreeMap<UserId, Vec<Document>> = BTreeMap::new();
        for doc in docs {
            match legacy_owner(&doc.data) {
                Some(owner) => by_owner.entry(owner).or_default().push(doc),
                None => {
                    warn!("Legacy plan {} has no resolvable owner, skipping", doc.id);
                    report.skipped_without_owner += 1;
                }
            }
        }
        report.owners = by_owner.len();

        for (owner, docs) in by_owner {
            let target = plans_path(&owner);
            let existing: HashSet<String> = match self.remote.query(&target, &Query::all()).await {
                Ok(present) => present.into_iter().map(|doc| doc.id).collect(),
                Err(e) => {
                    error!("Failed to list the partition of {}, skipping its plans: {}", owner, e);
                    report.failed += docs.len();
                    continue;
                }
            };
            for doc in docs {
                if existing.contains(&doc.id) {
                    debug!("Legacy plan {} already present for {}", doc.id, owner);
                    report.already_present += 1;
                    continue;
                }
                match self.remote.set(&target, &doc.id, doc.data).await {
                    Ok(()) => report.migrated += 1,
                    Err(e) => {
                        error!("Failed to migrate legacy plan {} for {}: {}", doc.id, owner, e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "Migration finished: {} migrated, {} already present, {} without owner, {} failed across {} owners",
            report.migrated,
            report.already_present,
            report.skipped_without_owner,
            report.failed,
            report.owners
        );

        if report.failed == 0 {
            let marker = json!({ "completedAt": Utc::now(), "migrated": report.migrated });
            if let Err(e) = self
                .remote
                .set(&markers_path(), LEGACY_PLANS_MARKER, marker)
                .await
            {
                warn!("Migration finished but its completion marker was not saved: {}", e);
            }
        }
        Ok(report)
    }
}
