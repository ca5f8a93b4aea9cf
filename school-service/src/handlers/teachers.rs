//! Teacher resource handlers

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use url::form_urlencoded;

use super::response::{DeletedManyResponse, DeletedResponse, ListResponse};
use crate::{
    error::{Error, Result},
    models::{NewTeacher, Teacher},
    patch::PatchSet,
    query::QueryBuilder,
    repository::TeacherRepository,
    state::AppState,
};

/// Routes under `/teachers`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/teachers",
            get(list_teachers)
                .post(create_teachers)
                .patch(patch_teachers)
                .delete(delete_teachers),
        )
        .route(
            "/teachers/{id}",
            get(get_teacher)
                .put(update_teacher)
                .patch(patch_teacher)
                .delete(delete_teacher),
        )
}

/// Unwrap a JSON body, reporting malformed input as a validation error
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        Error::Validation(format!("invalid request body: {}", rejection.body_text()))
    })
}

/// Parse a path identifier; only positive integers are accepted
pub fn parse_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::Validation(format!("invalid teacher id '{}'", raw)))
}

async fn list_teachers(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<ListResponse<Teacher>> {
    let params: Vec<(String, String)> = query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let fragment = QueryBuilder::new(state.registry()).build(&params)?;
    let teachers = state.repository().find_all(&fragment).await?;
    Ok(ListResponse::new(teachers))
}

async fn get_teacher(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Teacher>> {
    let id = parse_id(&id)?;
    let teacher = state
        .repository()
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::teacher_not_found(id))?;
    Ok(Json(teacher))
}

async fn create_teachers(
    State(state): State<AppState>,
    body: std::result::Result<Json<Vec<NewTeacher>>, JsonRejection>,
) -> Result<ListResponse<Teacher>> {
    let teachers = json_body(body)?;
    if teachers.is_empty() {
        return Err(Error::Validation(
            "request body must contain at least one teacher".to_string(),
        ));
    }

    let created = state.repository().create_many(teachers).await?;
    tracing::info!(count = created.len(), "Teachers created");
    Ok(ListResponse::created(created))
}

async fn update_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<NewTeacher>, JsonRejection>,
) -> Result<Json<Teacher>> {
    let id = parse_id(&id)?;
    let replacement = json_body(body)?.with_id(id);
    let teacher = state.repository().update(&replacement).await?;
    Ok(Json(teacher))
}

async fn patch_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<PatchSet>, JsonRejection>,
) -> Result<Json<Teacher>> {
    let id = parse_id(&id)?;
    let patch = json_body(body)?;

    let existing = state
        .repository()
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::teacher_not_found(id))?;
    let merged = state.patches().merge_one(&existing, &patch)?;
    let teacher = state.repository().update(&merged).await?;
    Ok(Json(teacher))
}

async fn patch_teachers(
    State(state): State<AppState>,
    body: std::result::Result<Json<Vec<PatchSet>>, JsonRejection>,
) -> Result<StatusCode> {
    let items = json_body(body)?;
    state
        .patches()
        .merge_batch(state.repository(), items)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    let id = parse_id(&id)?;
    state.repository().delete(id).await?;
    Ok(Json(DeletedResponse::new(id)))
}

async fn delete_teachers(
    State(state): State<AppState>,
    body: std::result::Result<Json<Vec<i64>>, JsonRejection>,
) -> Result<Json<DeletedManyResponse>> {
    let ids = json_body(body)?;
    if ids.is_empty() {
        return Err(Error::Validation("no teacher ids supplied".to_string()));
    }

    let deleted = state.repository().delete_many(&ids).await?;
    Ok(Json(DeletedManyResponse::new(deleted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let state = AppState::builder()
            .pool(test_pool().await)
            .build()
            .await
            .unwrap();
        let app = routes().with_state(state);

        let seed = json!([
            {"first_name": "John", "last_name": "Doe", "email": "john@school.test", "class": "9A", "subject": "Math"},
            {"first_name": "Jane", "last_name": "Doe", "email": "jane@school.test", "class": "10A", "subject": "Algebra"},
            {"first_name": "Ada", "last_name": "Lovelace", "email": "ada@school.test", "class": "9A", "subject": "Computing"}
        ]);
        let response = send(&app, "POST", "/teachers", Some(seed)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        app
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_returns_envelope_with_ids() {
        let app = app().await;
        let response = send(
            &app,
            "POST",
            "/teachers",
            Some(json!([{"first_name": "Grace", "last_name": "Hopper", "email": "grace@school.test", "class": "12C", "subject": "Computing"}])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_of(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["id"], 4);
    }

    #[tokio::test]
    async fn test_list_with_filter_and_sort() {
        let app = app().await;
        let response = send(
            &app,
            "GET",
            "/teachers?class=9A&sort-by=last_name:desc&sort-by=bogus",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_of(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["last_name"], "Lovelace");
        assert_eq!(body["data"][1]["first_name"], "John");
    }

    #[tokio::test]
    async fn test_get_one_and_errors() {
        let app = app().await;

        let response = send(&app, "GET", "/teachers/2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["first_name"], "Jane");

        let response = send(&app, "GET", "/teachers/99", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "GET", "/teachers/abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_replaces_record() {
        let app = app().await;
        let response = send(
            &app,
            "PUT",
            "/teachers/1",
            Some(json!({"first_name": "Johnny", "last_name": "Doe", "email": "johnny@school.test", "class": "9B", "subject": "Physics"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_of(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["class"], "9B");
    }

    #[tokio::test]
    async fn test_patch_one_merges_and_keeps_id() {
        let app = app().await;
        let response = send(
            &app,
            "PATCH",
            "/teachers/2",
            Some(json!({"subject": "Geometry", "id": 77, "nickname": "JD"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_of(response).await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["subject"], "Geometry");
        assert_eq!(body["first_name"], "Jane");
    }

    #[tokio::test]
    async fn test_patch_one_type_mismatch() {
        let app = app().await;
        let response = send(&app, "PATCH", "/teachers/2", Some(json!({"class": 10}))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["code"], "TYPE_MISMATCH");
    }

    #[tokio::test]
    async fn test_batch_patch_all_or_nothing() {
        let app = app().await;

        let response = send(
            &app,
            "PATCH",
            "/teachers",
            Some(json!([{"id": 1, "subject": "Physics"}, {"id": "2", "class": "11B"}])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(
            &app,
            "PATCH",
            "/teachers",
            Some(json!([{"id": 3, "subject": "Poetry"}, {"subject": "missing id"}])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_of(send(&app, "GET", "/teachers/3", None).await).await;
        assert_eq!(body["subject"], "Computing");
        let body = json_of(send(&app, "GET", "/teachers/1", None).await).await;
        assert_eq!(body["subject"], "Physics");
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let app = app().await;

        let response = send(&app, "DELETE", "/teachers/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_of(response).await,
            json!({"status": "Teacher successfully deleted", "id": 1})
        );

        let response = send(&app, "DELETE", "/teachers", Some(json!([2, 1]))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "DELETE", "/teachers", Some(json!([2, 3]))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["deleted_ids"], json!([2, 3]));

        let body = json_of(send(&app, "GET", "/teachers", None).await).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let app = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/teachers")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["code"], "VALIDATION_ERROR");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12").unwrap(), 12);
        for bad in ["0", "-3", "1.5", "", "x"] {
            assert!(matches!(parse_id(bad), Err(Error::Validation(_))));
        }
    }
}
