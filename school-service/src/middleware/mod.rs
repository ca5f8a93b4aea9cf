//! Middleware stages and their composition

pub mod compression;
pub mod parameter_pollution;
pub mod pipeline;
pub mod rate_limit;
pub mod request_tracking;
pub mod response_time;

pub use compression::{compression_layer, MIN_COMPRESSED_SIZE};
pub use parameter_pollution::{parameter_pollution, ParameterPollution, Violation};
pub use pipeline::{Pipeline, Stage};
pub use rate_limit::{rate_limit, RateLimiter};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer, SENSITIVE_HEADERS,
};
pub use response_time::{response_time, X_RESPONSE_TIME};
