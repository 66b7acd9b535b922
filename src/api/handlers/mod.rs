use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::db::Database;
use crate::protocol::Dispatcher;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The body is the raw request string. Successful payloads are already JSON
/// and pass through untouched; failures come back as 422 with `{code, message}`.
pub async fn query(State(dispatcher): State<Dispatcher<Database>>, body: String) -> Response {
    match dispatcher.dispatch(&body).await {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Err(failure) => (StatusCode::UNPROCESSABLE_ENTITY, Json(failure)).into_response(),
    }
}
