use axum::http::Method;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

mod db;
mod realtime;
mod storage;

use super::middleware::{auth_middleware, correlation_middleware};
use super::state::AppState;

/// Full application router: health probe, authenticated service routes,
/// correlation ids on everything.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(db::router())
        .merge(realtime::router())
        .merge(storage::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(healthz_handler))
        .merge(api)
        .layer(cors_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            correlation_middleware,
        ))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

async fn healthz_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
