use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tenantgate_core_types::ProjectId;
use tracing::instrument;

use crate::auth::Principal;
use crate::errors::HttpError;
use crate::gateway::RequestContext;
use crate::server::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/storage/paths", post(scope_path_handler))
        .route("/v1/storage/validate", post(validate_path_handler))
}

#[derive(Debug, Deserialize)]
struct ScopePathRequest {
    operation: String,
    path: String,
}

#[derive(Serialize)]
struct ScopePathResponse {
    scoped_path: String,
}

#[derive(Debug, Deserialize)]
struct ValidatePathRequest {
    operation: String,
    scoped_path: String,
}

#[derive(Serialize)]
struct ValidatePathResponse {
    project_id: ProjectId,
    path: String,
}

#[instrument(name = "tenantgate.storage.scope", skip_all, fields(operation = %req.operation))]
async fn scope_path_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ScopePathRequest>,
) -> Result<Json<ScopePathResponse>, HttpError> {
    let scoped_path =
        state
            .gateway()
            .storage_path(&principal, &ctx, &req.operation, &req.path)?;
    Ok(Json(ScopePathResponse { scoped_path }))
}

#[instrument(name = "tenantgate.storage.validate", skip_all, fields(operation = %req.operation))]
async fn validate_path_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ValidatePathRequest>,
) -> Result<Json<ValidatePathResponse>, HttpError> {
    let parsed = state.gateway().validate_storage_path(
        &principal,
        &ctx,
        &req.operation,
        &req.scoped_path,
    )?;
    Ok(Json(ValidatePathResponse {
        project_id: parsed.project_id,
        path: parsed.path,
    }))
}
