use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{MessagePayload, OnlineUser, PrivateMessagePayload};
use domain::{DomainError, MessageId, RoomName, RoomTarget, UserId};

use crate::ws::websocket_upgrade;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload {
    name: String,
    creator_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<Uuid>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateHistoryQuery {
    user_id: Uuid,
    peer_id: Uuid,
    before: Option<Uuid>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    online_users: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserBody {
    user_id: Uuid,
    display_name: String,
    last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/online", get(list_online_users))
        .route("/users/{user_id}", get(get_user))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room}/members", post(join_room))
        .route("/rooms/{room}/messages", get(room_history))
        .route("/messages/private", get(private_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let online = state.hub.online_users().await;
    Json(HealthBody {
        status: "ok",
        online_users: online.len(),
    })
}

async fn list_online_users(State(state): State<AppState>) -> Json<Vec<OnlineUser>> {
    Json(state.hub.online_users().await)
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserBody>, ApiError> {
    let profile = state
        .users
        .find(UserId::from(user_id))
        .await?
        .ok_or_else(|| DomainError::RecipientNotFound)?;
    Ok(Json(UserBody {
        user_id: profile.id.into(),
        display_name: profile.display_name.as_str().to_string(),
        last_seen: profile.last_seen,
    }))
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let rooms = state.rooms.list_rooms().await?;
    Ok(Json(rooms.iter().map(|r| r.as_str().to_string()).collect()))
}

async fn create_room(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<StatusCode, ApiError> {
    let name = RoomName::new(payload.name)?;
    state
        .rooms
        .create_room(name, UserId::from(payload.creator_id))
        .await?;
    Ok(StatusCode::CREATED)
}

async fn join_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(payload): Json<JoinRoomPayload>,
) -> Result<StatusCode, ApiError> {
    let name = RoomName::new(room)?;
    state
        .rooms
        .join(&name, UserId::from(payload.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 房间消息历史，按时间升序，最多一页。
async fn room_history(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let target = RoomTarget::from_wire(Some(&room))?;
    let limit = query
        .limit
        .unwrap_or(state.history_page_limit)
        .min(state.history_page_limit);
    let messages = state
        .messages
        .fetch_recent(&target, limit, query.before.map(MessageId::from))
        .await?;
    Ok(Json(
        messages
            .iter()
            .filter_map(MessagePayload::from_stored)
            .collect(),
    ))
}

async fn private_history(
    State(state): State<AppState>,
    Query(query): Query<PrivateHistoryQuery>,
) -> Result<Json<Vec<PrivateMessagePayload>>, ApiError> {
    let target = RoomTarget::private(
        UserId::from(query.user_id),
        UserId::from(query.peer_id),
    );
    let limit = query
        .limit
        .unwrap_or(state.history_page_limit)
        .min(state.history_page_limit);
    let messages = state
        .messages
        .fetch_recent(&target, limit, query.before.map(MessageId::from))
        .await?;
    Ok(Json(
        messages
            .iter()
            .filter_map(PrivateMessagePayload::from_stored)
            .collect(),
    ))
}
