use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::notifier::{LogNotifier, ResetNotifier};
use crate::auth::repo::UserRepo;
use crate::config::AppConfig;
use crate::db::{self, PgStore};
use crate::memory::MemoryStore;
use crate::tasks::repo::TaskRepo;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub tasks: Arc<dyn TaskRepo>,
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let notifier = Arc::new(LogNotifier) as Arc<dyn ResetNotifier>;

        let Some(url) = config.database_url.as_deref() else {
            warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            let store = Arc::new(MemoryStore::new());
            return Ok(Self::from_parts(store.clone(), store, config, notifier));
        };

        let store = Arc::new(PgStore::new(db::connect(url).await?));
        // Run migrations if present
        match store.migrate().await {
            Ok(()) => info!("migrations applied"),
            Err(e) => warn!(error = %format!("{e:#}"), "migration failed; continuing"),
        }

        Ok(Self::from_parts(store.clone(), store, config, notifier))
    }

    pub fn from_parts(
        users: Arc<dyn UserRepo>,
        tasks: Arc<dyn TaskRepo>,
        config: Arc<AppConfig>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::from_config(&config.jwt));
        Self {
            users,
            tasks,
            config,
            keys,
            notifier,
        }
    }

    /// In-memory state with the test configuration.
    pub fn fake() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(
            store.clone(),
            store,
            Arc::new(AppConfig::test()),
            Arc::new(LogNotifier),
        )
    }
}
