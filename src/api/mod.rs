mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::protocol::Dispatcher;

pub fn create_router(dispatcher: Dispatcher<Database>) -> Router {
    let api = Router::new()
        .route("/query", post(handlers::query))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}
