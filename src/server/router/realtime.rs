use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Extension, Json, Router};
use isolation_guards::{ChannelType, Subscription};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::auth::Principal;
use crate::errors::HttpError;
use crate::gateway::RequestContext;
use crate::server::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/realtime/subscriptions",
            get(list_handler).post(subscribe_handler),
        )
        .route(
            "/v1/realtime/subscriptions/:subscription_id",
            delete(unsubscribe_handler),
        )
}

/// Either a full `channel` name, or a `channel_type` with an optional
/// `identifier` scoped to the caller's project.
#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<ChannelType>,
    #[serde(default)]
    identifier: Option<String>,
}

#[derive(Serialize)]
struct SubscriptionListResponse {
    subscriptions: Vec<Subscription>,
}

#[instrument(name = "tenantgate.realtime.subscribe", skip_all)]
async fn subscribe_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let gateway = state.gateway();
    let subscription = match (req.channel.as_deref(), req.channel_type) {
        (Some(channel), None) => {
            gateway
                .subscribe_channel(&principal, &ctx, channel)
                .await?
        }
        (None, Some(channel_type)) => {
            gateway
                .subscribe(
                    &principal,
                    &ctx,
                    channel_type,
                    req.identifier.as_deref(),
                )
                .await?
        }
        _ => {
            return Err(HttpError::invalid_argument(
                "provide either channel or channel_type",
            ))
        }
    };
    Ok((StatusCode::CREATED, Json(subscription)))
}

#[instrument(name = "tenantgate.realtime.list", skip_all)]
async fn list_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SubscriptionListResponse>, HttpError> {
    let subscriptions = state
        .gateway()
        .list_subscriptions(&principal, &ctx)
        .await?;
    Ok(Json(SubscriptionListResponse { subscriptions }))
}

#[instrument(name = "tenantgate.realtime.unsubscribe", skip_all, fields(subscription_id = %subscription_id))]
async fn unsubscribe_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<Principal>,
    Path(subscription_id): Path<String>,
) -> Result<StatusCode, HttpError> {
    match state
        .gateway()
        .unsubscribe(&principal, &ctx, &subscription_id)
        .await?
    {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(HttpError::not_found(
            "SUBSCRIPTION_NOT_FOUND",
            "subscription not found",
        )),
    }
}
