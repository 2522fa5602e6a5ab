use crate::AppState;
use crate::error::AppError;
use crate::fleet::ServerType;
use crate::ingest::Envelope;
use crate::validation;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_macros::debug_handler;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracker_db::{OnlinePlayer, PlayerLocation};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocationBody {
    server_id: Option<String>,
    proxy_id: Option<String>,
}

impl From<PlayerLocation> for LocationBody {
    fn from(location: PlayerLocation) -> Self {
        Self {
            server_id: location.game_server_id,
            proxy_id: location.proxy_id,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct PlayerLocationResponse {
    location: Option<LocationBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerLocationsRequest {
    player_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerLocationsResponse {
    player_servers: HashMap<String, LocationBody>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OnlinePlayerBody {
    player_id: String,
    username: Option<String>,
}

impl From<OnlinePlayer> for OnlinePlayerBody {
    fn from(player: OnlinePlayer) -> Self {
        Self {
            player_id: player.player_id.to_string(),
            username: player.username.map(|name| name.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerPlayersResponse {
    online_players: Vec<OnlinePlayerBody>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerCountResponse {
    player_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerTypesRequest {
    server_types: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerTypeCountsResponse {
    player_counts: BTreeMap<ServerType, u64>,
}

#[derive(Deserialize)]
pub(crate) struct PublishRequest {
    #[serde(rename = "type")]
    type_tag: String,
    payload: serde_json::Value,
}

#[debug_handler]
pub(crate) async fn player_location(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let player_id = validation::validate_player_id(&player_id)?;

    let location = state.locator.player_location(player_id).await?;

    Ok(Json(PlayerLocationResponse {
        location: location.map(LocationBody::from),
    }))
}

#[debug_handler]
pub(crate) async fn player_locations(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlayerLocationsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let player_ids = validation::validate_player_ids(&payload.player_ids)?;

    let locations = state.locator.player_locations(&player_ids).await?;

    let player_servers = locations
        .into_iter()
        .map(|location| (location.player_id.to_string(), LocationBody::from(location)))
        .collect();
    Ok(Json(PlayerLocationsResponse { player_servers }))
}

#[debug_handler]
pub(crate) async fn server_players(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_server_id(&server_id)?;

    let players = state.locator.server_players(&server_id).await?;

    Ok(Json(ServerPlayersResponse {
        online_players: players.into_iter().map(OnlinePlayerBody::from).collect(),
    }))
}

#[debug_handler]
pub(crate) async fn server_player_count(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_server_id(&server_id)?;

    let player_count = state.locator.target_player_count(&server_id).await?;

    Ok(Json(PlayerCountResponse { player_count }))
}

#[debug_handler]
pub(crate) async fn server_type_player_count(
    State(state): State<Arc<AppState>>,
    Path(server_type): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let server_type = validation::validate_server_type(&server_type)?;

    let player_count = state.locator.server_type_player_count(server_type).await?;

    Ok(Json(PlayerCountResponse { player_count }))
}

#[debug_handler]
pub(crate) async fn server_types_player_count(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ServerTypesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let server_types = validation::validate_server_types(&payload.server_types)?;

    let player_counts = state
        .locator
        .server_types_player_count(&server_types)
        .await?;

    Ok(Json(ServerTypeCountsResponse { player_counts }))
}

#[debug_handler]
pub(crate) async fn player_count(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let player_count = state.locator.player_count().await?;

    Ok(Json(PlayerCountResponse { player_count }))
}

/// Hands a raw envelope to the ingestion queue. Decoding happens in the
/// worker, so an accepted event may still be rejected there.
#[debug_handler]
pub(crate) async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.type_tag.is_empty() {
        return Err(AppError::ValidationError(
            "Event type cannot be empty".to_string(),
        ));
    }

    let payload = serde_json::to_vec(&request.payload)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .publisher
        .try_publish(Envelope::new(request.type_tag, payload))?;

    Ok(StatusCode::ACCEPTED)
}
