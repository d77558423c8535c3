//! services/plan_sync/src/adapters/config_identity.rs
//!
//! Resolves the signed-in user from the service configuration. It implements
//! the `IdentityProvider` port from the `core` crate.

use async_trait::async_trait;
use plan_sync_core::domain::UserId;
use plan_sync_core::ports::IdentityProvider;

use crate::config::Config;

/// The identity named by `PLAN_SYNC_USER_ID`, fixed for the life of the process.
#[derive(Clone, Debug)]
pub struct ConfigIdentity {
    user_id: Option<UserId>,
}

impl ConfigIdentity {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_id: config.user_id.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for ConfigIdentity {
    async fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }
}
