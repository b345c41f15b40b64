use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::Principal;
use crate::errors::HttpError;
use crate::gateway::{QueryOutcome, RequestContext};
use crate::server::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/v1/db/query", post(query_handler))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    /// Gateway operation, e.g. `db:select`.
    operation: String,
    statement: String,
}

#[instrument(name = "tenantgate.db.query", skip_all, fields(operation = %req.operation))]
async fn query_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, HttpError> {
    let outcome = state
        .gateway()
        .query(&principal, &ctx, &req.operation, &req.statement)
        .await?;
    Ok(Json(outcome))
}
