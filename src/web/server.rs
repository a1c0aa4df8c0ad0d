use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::storage::MessageRepository;

use super::api::{health_check, list_groups, list_messages, list_values, AppState};

/// Build the read-only API router over `repository`.
pub fn create_router(repository: MessageRepository) -> Router {
    let app_state = AppState { repository };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/messages", get(list_messages))
        .route("/api/groups", get(list_groups))
        .route("/api/values/:field", get(list_values))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown_rx` flips to `true`.
pub async fn run_server(
    repository: MessageRepository,
    server_config: ServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = create_router(repository);

    let listener = tokio::net::TcpListener::bind(&server_config.listen).await?;
    tracing::info!("Web server listening on {}", server_config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("Web server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;
    use crate::source::Message;
    use crate::storage::duckdb::DuckDbStorage;
    use crate::storage::Storage;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let storage = DuckDbStorage::in_memory().unwrap();
        storage.init_schema().await.unwrap();

        let messages: Vec<Message> = [("rust", "1", 9, "help"), ("rust", "2", 10, "news"), ("go", "3", 11, "help")]
            .iter()
            .map(|(group, id, hour, tag)| Message {
                message_id: id.to_string(),
                datetime: Utc.with_ymd_and_hms(2024, 5, 1, *hour, 0, 0).unwrap(),
                group: group.to_string(),
                uuid: Message::derive_uuid(group, id),
                tags: vec![tag.to_string()],
            })
            .collect();
        storage.bulk_upsert(&messages).await.unwrap();

        create_router(MessageRepository::new(Arc::new(storage), WriterConfig::default()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_groups() {
        let (status, body) = get_json(app().await, "/api/groups").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["go", "rust"]));
    }

    #[tokio::test]
    async fn test_messages_filtered_and_sorted() {
        let (status, body) = get_json(
            app().await,
            "/api/messages?tag=help&sort=datetime&order=desc",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["message_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_messages_time_range() {
        let (status, body) = get_json(
            app().await,
            "/api/messages?from=2024-05-01T09:30:00Z&to=2024-05-01T12:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_field_is_bad_request() {
        let (status, body) = get_json(app().await, "/api/values/author").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("author"));
    }

    #[tokio::test]
    async fn test_tag_values() {
        let (status, body) = get_json(app().await, "/api/values/tags").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["help", "news"]));
    }
}
