//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    config::Config,
    database,
    error::Result,
    fields::FieldRegistry,
    models::{teacher_registry, Teacher},
    patch::PatchEngine,
    repository::SqliteTeacherRepository,
};

/// Application state shared across handlers
///
/// Everything inside is reference counted, so cloning per request is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<Config>,
    repository: SqliteTeacherRepository,
    registry: Arc<FieldRegistry<Teacher>>,
    patches: PatchEngine<Teacher>,
}

impl AppState {
    /// Create state over an existing pool
    ///
    /// # Errors
    ///
    /// Fails if the teacher field registry is inconsistent.
    pub fn new(config: Config, pool: SqlitePool) -> Result<Self> {
        let registry = Arc::new(teacher_registry()?);
        Ok(Self {
            config: Arc::new(config),
            repository: SqliteTeacherRepository::new(pool),
            patches: PatchEngine::new(Arc::clone(&registry)),
            registry,
        })
    }

    /// Create a new builder for AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Teacher storage
    pub fn repository(&self) -> &SqliteTeacherRepository {
        &self.repository
    }

    /// Field registry for [`Teacher`]
    pub fn registry(&self) -> &FieldRegistry<Teacher> {
        &self.registry
    }

    /// Patch engine bound to the teacher registry
    pub fn patches(&self) -> &PatchEngine<Teacher> {
        &self.patches
    }
}

/// Builder for AppState
///
/// Connects to the configured database unless a pool is supplied.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    pool: Option<SqlitePool>,
}

impl AppStateBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an already-open pool
    pub fn pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build the AppState, creating the pool and schema when needed
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();

        let pool = match self.pool {
            Some(pool) => {
                database::migrate(&pool).await?;
                pool
            }
            None => database::create_pool(&config.database).await?,
        };

        AppState::new(config, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_builder_with_pool() {
        let state = AppState::builder()
            .pool(test_pool().await)
            .build()
            .await
            .unwrap();

        assert_eq!(state.config().service.name, "school-service");
        assert_eq!(state.registry().len(), 6);
    }
}
