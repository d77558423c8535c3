pub mod config_identity;
pub mod file_local;
pub mod offline_remote;
pub mod pg_remote;

pub use config_identity::ConfigIdentity;
pub use file_local::FileLocalStore;
pub use offline_remote::OfflineRemoteStore;
pub use pg_remote::PgRemoteStore;
