//! Host maintenance command endpoints
//!
//! Thin wrappers dispatching into [`MaintenanceService`](crate::commands::MaintenanceService).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::commands::{CommandOutcome, DatabaseTarget, MaintenanceError, MetadataSource};
use crate::server::AppState;

#[derive(Serialize)]
pub struct CommandResponse {
    pub outcome: CommandOutcome,
}

#[derive(Deserialize)]
pub struct AnnounceQuery {
    /// Defaults to announcing for TMDB and Trakt, silence for pages.
    pub announce: Option<bool>,
}

impl IntoResponse for MaintenanceError {
    fn into_response(self) -> Response {
        let status = match self {
            MaintenanceError::UnknownTarget { .. } => StatusCode::BAD_REQUEST,
            _ => {
                error!("Maintenance command failed: {}", self);
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type CommandResult = Result<Json<CommandResponse>, MaintenanceError>;

fn respond(outcome: CommandOutcome) -> CommandResult {
    Ok(Json(CommandResponse { outcome }))
}

pub async fn cmd_clear_cache(State(state): State<AppState>) -> CommandResult {
    respond(state.maintenance.clear_cache(None).await?)
}

pub async fn cmd_clear_cache_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> CommandResult {
    respond(state.maintenance.clear_cache(Some(&key)).await?)
}

pub async fn cmd_clear_metadata(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(query): Query<AnnounceQuery>,
) -> CommandResult {
    let source: MetadataSource = source.parse()?;
    let announce = query
        .announce
        .unwrap_or(source != MetadataSource::Pages);
    respond(
        state
            .maintenance
            .clear_metadata_cache(source, announce)
            .await?,
    )
}

pub async fn cmd_reset_paths(State(state): State<AppState>) -> CommandResult {
    respond(state.maintenance.reset_paths().await?)
}

pub async fn cmd_reset_path(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> CommandResult {
    respond(state.maintenance.reset_custom_path(&name).await?)
}

pub async fn cmd_open_path(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> CommandResult {
    respond(state.maintenance.open_custom_path(&name).await?)
}

pub async fn cmd_set_view_mode(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
) -> CommandResult {
    respond(state.maintenance.store_view_mode(&content_type).await?)
}

pub async fn cmd_clear_database(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> CommandResult {
    let target: DatabaseTarget = target.parse()?;
    respond(state.maintenance.clear_database(target).await?)
}
