use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{Argon2Hasher, Hasher};
use crate::clock::{Clock, SystemClock};
use crate::config::{AdminBootstrap, AppConfig};
use crate::store::{MemoryStore, NewUser, PgStore, Role, Store, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub keys: Arc<JwtKeys>,
    pub hasher: Arc<dyn Hasher>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt)?;

        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                pg.migrate().await?;
                info!("using postgres store");
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let state = Self::from_parts(
            store,
            keys,
            Arc::new(Argon2Hasher::default()),
            Arc::new(SystemClock),
        );
        if let Some(admin) = &config.admin {
            state.ensure_admin(admin).await?;
        }
        Ok(state)
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        keys: JwtKeys,
        hasher: Arc<dyn Hasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
            hasher,
            clock,
        }
    }

    /// Creates the configured administrator unless the username already exists.
    async fn ensure_admin(&self, admin: &AdminBootstrap) -> anyhow::Result<()> {
        if let Some(existing) = self.store.find_user_by_username(&admin.username).await? {
            if existing.role != Role::Admin {
                warn!(username = %admin.username, "bootstrap admin name is taken by a regular account");
            }
            return Ok(());
        }
        let digest = self.hasher.hash(&admin.password)?;
        match self
            .store
            .create_user(NewUser {
                username: admin.username.clone(),
                password_digest: digest,
                role: Role::Admin,
            })
            .await
        {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "bootstrap admin created");
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e).context("create bootstrap admin"),
        }
    }
}
