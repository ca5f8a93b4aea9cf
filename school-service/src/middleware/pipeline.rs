//! Ordered middleware composition
//!
//! A [`Pipeline`] is a declared list of [`Stage`]s. [`Pipeline::wrap`] is the
//! single routine that layers them onto a router: the first stage registered
//! is the outermost wrapper, so it sees the request first and the response
//! last.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = Pipeline::new()
//!     .stage(Stage::ResponseTime)
//!     .stage(Stage::RateLimit(limiter))
//!     .stage(Stage::Compression)
//!     .wrap(routes);
//! ```

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};

use super::compression::compression_layer;
use super::parameter_pollution::{parameter_pollution, ParameterPollution};
use super::rate_limit::{rate_limit, RateLimiter};
use super::response_time::response_time;
use crate::config::Config;

/// One composable unit of the pipeline
#[derive(Debug, Clone)]
pub enum Stage {
    /// Times everything inside it and logs the written status
    ResponseTime,
    /// Rejects callers over their request budget
    RateLimit(RateLimiter),
    /// Enforces the parameter whitelist
    ParameterPollution(Arc<ParameterPollution>),
    /// Gzips response bodies for callers that accept it
    Compression,
}

impl Stage {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::RateLimit(_) => "rate_limit",
            Self::ParameterPollution(_) => "parameter_pollution",
            Self::Compression => "compression",
        }
    }

    fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        match self {
            Self::ResponseTime => router.layer(from_fn(response_time)),
            Self::RateLimit(limiter) => router.layer(from_fn_with_state(limiter, rate_limit)),
            Self::ParameterPollution(filter) => {
                router.layer(from_fn_with_state(filter, parameter_pollution))
            }
            Self::Compression => router.layer(compression_layer()),
        }
    }
}

/// Declared stage order, outermost first
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage inside every stage registered so far
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Standard service pipeline built from configuration
    ///
    /// Order: response time, rate limit, parameter pollution, compression.
    /// Disabled stages are left out.
    pub fn from_config<'a>(
        config: &Config,
        limiter: Option<RateLimiter>,
        field_names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let middleware = &config.middleware;
        let mut pipeline = Self::new();

        if middleware.response_time {
            pipeline = pipeline.stage(Stage::ResponseTime);
        }
        if let Some(limiter) = limiter {
            pipeline = pipeline.stage(Stage::RateLimit(limiter));
        }
        if middleware.parameter_pollution.enabled {
            let filter = ParameterPollution::new(
                &middleware.parameter_pollution,
                middleware.body_limit_mb * 1024 * 1024,
                field_names,
            );
            pipeline = pipeline.stage(Stage::ParameterPollution(Arc::new(filter)));
        }
        if middleware.compression {
            pipeline = pipeline.stage(Stage::Compression);
        }

        pipeline
    }

    /// Stage names in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Layer every stage onto `router`
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        tracing::debug!(stages = ?self.names(), "Composing middleware pipeline");

        // Router::layer wraps what is already there, so the last stage goes on first
        self.stages
            .iter()
            .rev()
            .cloned()
            .fold(router, |router, stage| stage.apply(router))
    }
}
