//! Local HTTP relay in front of a completion gateway.
//!
//! Exposes one endpoint, `POST /api/generate`, taking `{"message": ...}` and
//! answering `{"text": ...}`. All gateway failures collapse into a flat
//! `500 {"error": ...}`; non-POST methods get `405 {"error": ...}`. The
//! relay keeps no conversation state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::gateway::{CompletionGateway, GenerationParams};

#[derive(Clone)]
pub struct RelayState {
    gateway: Arc<dyn CompletionGateway>,
    params: GenerationParams,
}

impl RelayState {
    pub fn new(gateway: Arc<dyn CompletionGateway>, params: GenerationParams) -> Self {
        Self { gateway, params }
    }
}

#[derive(Deserialize)]
struct GenerateRequest {
    message: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    text: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(
            "/api/generate",
            post(generate).fallback(invalid_method),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: RelayState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "relay listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn generate(
    State(state): State<RelayState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    match state
        .gateway
        .generate(&request.message, &state.params)
        .await
    {
        Ok(text) => (StatusCode::OK, Json(GenerateResponse { text })).into_response(),
        Err(err) => {
            // The caller gets one flat message regardless of the failure kind.
            error!(%err, "gateway call failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "something went wrong talking to the provider".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn invalid_method() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            error: "method not allowed".to_string(),
        }),
    )
        .into_response()
}
