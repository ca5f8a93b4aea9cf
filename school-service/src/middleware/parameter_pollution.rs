//! HTTP parameter pollution filter
//!
//! Checks query-string and (optionally) form-encoded body parameters
//! against a whitelist. A key outside the whitelist, or a key sent more
//! than once when it is not declared repeatable, is a violation. Violations
//! either reject the request or are stripped from it, per configuration.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use url::form_urlencoded;

use crate::config::{ParameterPollutionConfig, PollutionAction};
use crate::error::Error;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// One offending parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Key is not whitelisted
    Disallowed(String),
    /// Key appears more than once and may not repeat
    Duplicate(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disallowed(key) => write!(f, "parameter '{}' is not allowed", key),
            Self::Duplicate(key) => write!(f, "parameter '{}' may only appear once", key),
        }
    }
}

/// Where a parameter list came from
#[derive(Debug, Clone, Copy)]
enum Source {
    Query,
    Body,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Body => f.write_str("body"),
        }
    }
}

/// Compiled filter settings
#[derive(Debug, Clone)]
pub struct ParameterPollution {
    check_query: bool,
    check_body: bool,
    body_content_type: String,
    whitelist: HashSet<String>,
    repeatable: HashSet<String>,
    action: PollutionAction,
    body_limit: usize,
}

impl ParameterPollution {
    /// Build the filter
    ///
    /// When `config.whitelist` is empty the whitelist becomes
    /// `default_names` plus the repeatable keys.
    pub fn new<'a>(
        config: &ParameterPollutionConfig,
        body_limit: usize,
        default_names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let repeatable: HashSet<String> = config.repeatable.iter().cloned().collect();
        let whitelist: HashSet<String> = if config.whitelist.is_empty() {
            default_names
                .into_iter()
                .map(str::to_string)
                .chain(repeatable.iter().cloned())
                .collect()
        } else {
            config.whitelist.iter().cloned().collect()
        };

        Self {
            check_query: config.check_query,
            check_body: config.check_body,
            body_content_type: config
                .body_content_type
                .clone()
                .unwrap_or_else(|| FORM_URLENCODED.to_string()),
            whitelist,
            repeatable,
            action: config.action,
            body_limit,
        }
    }

    /// Every violation in `pairs`, in order of appearance
    pub fn inspect(&self, pairs: &[(String, String)]) -> Vec<Violation> {
        let mut seen = HashSet::new();
        let mut violations = Vec::new();

        for (key, _) in pairs {
            if !self.whitelist.contains(key) {
                violations.push(Violation::Disallowed(key.clone()));
            } else if !seen.insert(key.as_str()) && !self.repeatable.contains(key) {
                violations.push(Violation::Duplicate(key.clone()));
            }
        }

        violations
    }

    /// Keep whitelisted keys, and only the first value of non-repeatable ones
    pub fn strip(&self, pairs: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        pairs
            .into_iter()
            .filter(|(key, _)| {
                self.whitelist.contains(key)
                    && (self.repeatable.contains(key) || seen.insert(key.clone()))
            })
            .collect()
    }

    /// Apply the configured action to one parameter list
    ///
    /// Returns the replacement list when stripping changed something.
    fn enforce(
        &self,
        source: Source,
        pairs: Vec<(String, String)>,
    ) -> Result<Option<Vec<(String, String)>>, Error> {
        let violations = self.inspect(&pairs);
        let Some(first) = violations.first() else {
            return Ok(None);
        };

        match self.action {
            PollutionAction::Reject => {
                tracing::debug!(%source, violation = %first, "Rejecting polluted request");
                Err(Error::Validation(format!("{} {}", source, first)))
            }
            PollutionAction::Strip => {
                tracing::debug!(%source, removed = violations.len(), "Stripping polluted parameters");
                Ok(Some(self.strip(pairs)))
            }
        }
    }

    fn body_applies(&self, request: &Request) -> bool {
        self.check_body
            && request
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| {
                    value
                        .split(';')
                        .next()
                        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(&self.body_content_type))
                })
    }
}

fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(input).into_owned().collect()
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn replace_query(uri: &Uri, pairs: &[(String, String)]) -> Result<Uri, Error> {
    let query = encode_pairs(pairs);
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| Error::Validation(format!("invalid query string: {}", e)))?,
    );
    Uri::from_parts(parts).map_err(|e| Error::Validation(format!("invalid request uri: {}", e)))
}

/// Middleware function enforcing the whitelist
pub async fn parameter_pollution(
    State(filter): State<Arc<ParameterPollution>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    if filter.check_query {
        if let Some(query) = request.uri().query() {
            let pairs = parse_pairs(query.as_bytes());
            if let Some(kept) = filter.enforce(Source::Query, pairs)? {
                let uri = replace_query(request.uri(), &kept)?;
                *request.uri_mut() = uri;
            }
        }
    }

    if filter.body_applies(&request) {
        let (mut parts, body) = request.into_parts();
        let bytes = to_bytes(body, filter.body_limit)
            .await
            .map_err(|e| Error::Validation(format!("unreadable request body: {}", e)))?;

        let body = match filter.enforce(Source::Body, parse_pairs(&bytes))? {
            Some(kept) => {
                let encoded = encode_pairs(&kept);
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                Body::from(encoded)
            }
            None => Body::from(bytes),
        };
        request = Request::from_parts(parts, body);
    }

    Ok(next.run(request).await)
}
