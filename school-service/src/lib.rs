//! # school-service
//!
//! HTTP resource server for teacher records.
//!
//! Requests pass through an ordered middleware pipeline (response timing,
//! per-caller rate limiting, parameter-pollution filtering, gzip
//! compression) before reaching thin handlers. Reads go through a
//! [`query::QueryBuilder`] that turns whitelisted query parameters into a
//! parameterized filter and sort; partial updates go through a
//! [`patch::PatchEngine`] that merges untyped JSON onto typed records, one
//! at a time or as an all-or-nothing batch. Both are driven by a
//! [`fields::FieldRegistry`] built once at startup.
//!
//! ## Example
//!
//! ```rust,no_run
//! use school_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .build()
//!         .await?;
//!
//!     Server::new(config).serve(state).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod patch;
pub mod query;
pub mod repository;
pub mod server;
pub mod state;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::fields::{FieldDescriptor, FieldRegistry, FieldValue, Record, ValueKind};
    pub use crate::models::{teacher_registry, NewTeacher, Teacher, TeacherField};
    pub use crate::observability::init_tracing;
    pub use crate::patch::{PatchEngine, PatchSet};
    pub use crate::query::{QueryBuilder, QueryFragment, SortOrder};
    pub use crate::repository::{
        RecordTransaction, SqliteTeacherRepository, TeacherRepository, Transactional,
    };
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use crate::middleware::{Pipeline, RateLimiter, Stage};
}
