pub mod domain;
pub mod engine;
pub mod error;
pub mod memory;
pub mod migration;
pub mod ports;
pub mod query;
pub mod repository;
pub mod share_index;
pub mod sharing;
pub mod sync;

pub use domain::{
    Day, Exercise, MigrationReport, NewPlan, PendingDelete, PlanId, PlanPatch, ShareIndexEntry,
    ShareRecord, ShareStatus, SharedPlan, SyncReport, UserId, WorkoutPlan,
};
pub use engine::{collections, PlanEngine};
pub use error::{EngineError, EngineResult};
pub use ports::{
    CollectionPath, Document, IdentityProvider, LocalStore, PortError, PortResult, Query,
    RemoteStore, Scope, WriteBatch, WriteOp,
};
