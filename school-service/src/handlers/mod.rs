//! HTTP handlers for the teacher resource
//!
//! Handlers are thin: they parse the request, call the query builder, the
//! patch engine or the repository, and wrap the result in a response type.

mod response;
mod teachers;

pub use response::{DeletedManyResponse, DeletedResponse, ListResponse, STATUS_SUCCESS};
pub use teachers::{parse_id, routes};

/// Plain-text greeting on `/`
pub async fn root() -> &'static str {
    "Hello from the root route"
}
