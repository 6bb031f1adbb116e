use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use courier_types::api::{MarkReadRequest, MarkReadResponse, SendMessageRequest, UnreadResponse};

use crate::AppState;

/// Empty histories come back as 200 with an empty array; a failed store
/// call is a 500. The two are never collapsed into the same response.
pub async fn fetch_messages(
    State(state): State<AppState>,
    Path((user_id, other_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = state
        .messaging
        .fetch_messages(&user_id, &other_user_id)
        .await
        .map_err(|e| {
            error!("fetch_messages({}, {}) failed: {}", user_id, other_user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .messaging
        .send_message(&req.sender_id, &req.receiver_id, &req.content)
        .await
        .map_err(|e| {
            error!("send_message from {} failed: {}", req.sender_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let updated = state
        .messaging
        .mark_messages_as_read(&req.user_id, &req.sender_id)
        .await
        .map_err(|e| {
            error!("mark_read for {} failed: {}", req.user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(MarkReadResponse { updated }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path((user_id, other_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let unread = state
        .messaging
        .unread_count(&user_id, &other_user_id)
        .await
        .map_err(|e| {
            error!("unread_count({}, {}) failed: {}", user_id, other_user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(UnreadResponse { unread }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let summaries = state
        .messaging
        .list_conversations(&user_id)
        .await
        .map_err(|e| {
            error!("list_conversations({}) failed: {}", user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(summaries))
}
