//! Message handlers.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::storage::MessageSummary;
use crate::web::dto::{
    ApiResponse, ListOrder, MessageDetailResponse, MessageListQuery, PaginatedResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::{parse_id, AppState};

/// GET /api/messages - List messages, filtered and paginated.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<PaginatedResponse<MessageSummary>>, ApiError> {
    let (page, per_page) = query.page_and_size();
    let (offset, limit) = query.to_offset_limit();
    let filters = query.filters();

    let mut matching: Vec<_> = state
        .store
        .messages()
        .into_iter()
        .filter(|m| filters.iter().all(|(kind, needle)| m.matches(*kind, needle)))
        .collect();
    if query.order == ListOrder::Newest {
        matching.reverse();
    }

    let total = matching.len() as u64;
    let data = matching
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|m| m.summary())
        .collect();

    Ok(Json(PaginatedResponse::new(data, page, per_page, total)))
}

/// GET /api/messages/:id - Full message with headers, body and parts.
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageDetailResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let message = state.store.get(&id)?;
    Ok(Json(ApiResponse::new(MessageDetailResponse::from(
        message.as_ref(),
    ))))
}

/// GET /api/messages/:id/raw - Raw RFC 5322 content.
pub async fn get_raw_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let message = state.store.get(&id)?;
    Ok((
        [(header::CONTENT_TYPE, "message/rfc822")],
        Body::from(message.raw.clone()),
    )
        .into_response())
}

/// GET /api/messages/:id/parts/:index - Download one decoded MIME part.
pub async fn get_message_part(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let index: usize = index
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Malformed part index '{}'", index)))?;

    let message = state.store.get(&id)?;
    let part = message
        .mime_parts()?
        .into_iter()
        .find(|p| p.index == index)
        .ok_or_else(|| ApiError::not_found(format!("part {} of message {} not found", index, id)))?;

    // Attachments sent as a generic type get a better guess from their name.
    let content_type = match (&part.filename, part.content_type.as_str()) {
        (Some(name), "application/octet-stream") => mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string(),
        _ => part.content_type.clone(),
    };

    let mut response = (
        [(header::CONTENT_TYPE, content_type)],
        Body::from(part.body),
    )
        .into_response();
    if let Some(name) = &part.filename {
        let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
        if let Ok(value) = disposition.parse() {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    Ok(response)
}

/// DELETE /api/messages/:id - Delete one message.
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/messages - Delete every message.
pub async fn delete_all_messages(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.store.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}
