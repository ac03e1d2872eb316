use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, CampaignConfig, ChallengeDescriptor, ChallengeKind, ChallengeOutcome,
    ChannelContext, EngineStatus, ErrorCode, EventRecord, RebootOutcome, SeverityTier,
    TrendReport, SCHEMA_VERSION_V1,
};
use decay_core::{Announcer, SubmitError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::{EngineApi, PersistedCampaignSummary, PersistenceError};

const DEFAULT_PAGE_SIZE: usize = 200;
const MAX_PAGE_SIZE: usize = 2000;
const DEFAULT_SQLITE_PATH: &str = "decay_campaigns.sqlite";

include!("error.rs");
include!("state.rs");
include!("routes/control.rs");
include!("routes/query.rs");
include!("routes/stream.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "decay api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/campaigns", post(create_campaign).get(list_campaigns))
        .route("/api/v1/campaigns/{campaign_id}/status", get(get_status))
        .route("/api/v1/campaigns/{campaign_id}/tick", post(tick_campaign))
        .route(
            "/api/v1/campaigns/{campaign_id}/challenges",
            post(request_challenge),
        )
        .route(
            "/api/v1/campaigns/{campaign_id}/challenges/{instance_id}/submit",
            post(submit_challenge),
        )
        .route("/api/v1/campaigns/{campaign_id}/reboot", post(reboot_campaign))
        .route("/api/v1/campaigns/{campaign_id}/events", get(get_events))
        .route("/api/v1/campaigns/{campaign_id}/trend", get(get_trend))
        .route(
            "/api/v1/campaigns/{campaign_id}/diagnostic",
            get(get_diagnostic),
        )
        .route("/api/v1/campaigns/{campaign_id}/stream", get(stream_campaign))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
