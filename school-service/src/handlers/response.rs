//! Response envelopes for the teacher endpoints
//!
//! Collection reads and creates use `{status, count, data}`; deletes report
//! the removed identifiers. Single-record reads return the bare record.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Status string on successful collection responses
pub const STATUS_SUCCESS: &str = "success";

/// Collection envelope
///
/// # Example
///
/// ```rust
/// use school_service::handlers::ListResponse;
///
/// let response = ListResponse::new(vec!["a", "b"]);
/// assert_eq!(response.status, "success");
/// assert_eq!(response.count, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Always [`STATUS_SUCCESS`]
    pub status: String,
    /// Number of records in `data`
    pub count: usize,
    /// The records
    pub data: Vec<T>,
    #[serde(skip)]
    code: StatusCode,
}

impl<T> ListResponse<T> {
    /// A 200 envelope around `data`
    pub fn new(data: Vec<T>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            count: data.len(),
            data,
            code: StatusCode::OK,
        }
    }

    /// A 201 envelope around newly created records
    pub fn created(data: Vec<T>) -> Self {
        Self {
            code: StatusCode::CREATED,
            ..Self::new(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// Body returned after deleting one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedResponse {
    /// Confirmation message
    pub status: String,
    /// Identifier of the removed record
    pub id: i64,
}

impl DeletedResponse {
    /// Confirmation for `id`
    pub fn new(id: i64) -> Self {
        Self {
            status: "Teacher successfully deleted".to_string(),
            id,
        }
    }
}

/// Body returned after deleting several records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedManyResponse {
    /// Confirmation message
    pub status: String,
    /// Identifiers of the removed records, in request order
    pub deleted_ids: Vec<i64>,
}

impl DeletedManyResponse {
    /// Confirmation for `deleted_ids`
    pub fn new(deleted_ids: Vec<i64>) -> Self {
        Self {
            status: "Teachers successfully deleted".to_string(),
            deleted_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_envelope_shape() {
        let value = serde_json::to_value(ListResponse::new(vec![1, 2, 3])).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "success", "count": 3, "data": [1, 2, 3]})
        );
    }

    #[test]
    fn test_created_status_code() {
        let response = ListResponse::created(vec!["x"]).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = ListResponse::<u8>::new(vec![]).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_delete_bodies() {
        assert_eq!(
            serde_json::to_value(DeletedResponse::new(4)).unwrap(),
            serde_json::json!({"status": "Teacher successfully deleted", "id": 4})
        );
        assert_eq!(
            serde_json::to_value(DeletedManyResponse::new(vec![1, 2])).unwrap(),
            serde_json::json!({"status": "Teachers successfully deleted", "deleted_ids": [1, 2]})
        );
    }
}
