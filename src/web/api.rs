use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::source::Message;
use crate::storage::{FindOptions, MessageField, MessageFilter, MessageRepository, SortOrder, StorageError};

const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub repository: MessageRepository,
}

/// Storage errors mapped onto HTTP responses.
pub struct ApiError(StorageError);

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StorageError::UnknownField(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "API request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub group: Option<String>,
    pub tag: Option<String>,
    pub uuid: Option<String>,
    pub message_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Option<MessageField>,
    pub order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl MessageQuery {
    fn into_parts(self) -> (MessageFilter, FindOptions) {
        let defaults = FindOptions::default();
        let filter = MessageFilter {
            group: self.group,
            uuid: self.uuid,
            message_id: self.message_id,
            tag: self.tag,
            from: self.from,
            to: self.to,
        };
        let options = FindOptions {
            sort: self.sort.unwrap_or(defaults.sort),
            order: self.order.unwrap_or(defaults.order),
            limit: self.limit.unwrap_or(defaults.limit).min(MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(defaults.offset),
        };
        (filter, options)
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let (filter, options) = query.into_parts();
    let messages = state.repository.find(&filter, &options).await?;
    Ok(Json(messages))
}

pub async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let groups = state.repository.get_groups().await?;
    Ok(Json(groups.into_iter().collect()))
}

pub async fn list_values(
    State(state): State<AppState>,
    Path(field): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let values = state.repository.get_unique_values(&field).await?;
    Ok(Json(values.into_iter().collect()))
}
