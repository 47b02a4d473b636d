use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::sync::{CatalogSync, SyncReport};

#[derive(Clone)]
pub struct ApiState {
    pub sync: Arc<CatalogSync>,
}

/// `?symbol__in=ATOM,osmo`
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(rename = "symbol__in")]
    pub symbol_in: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sync_running: bool,
    pub last_sync: Option<SyncReport>,
}

pub fn router(sync: Arc<CatalogSync>) -> Router {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/tokens/", get(list_tokens))
        .route("/health", get(health))
        .with_state(ApiState { sync })
}

async fn list_tokens(
    State(state): State<ApiState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    match state.sync.lookup(query.symbol_in.as_deref()).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!("❌ Token lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "catalog unavailable" })),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sync_running: state.sync.is_running(),
        last_sync: state.sync.last_report().await,
    })
}
