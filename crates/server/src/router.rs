//! HTTP router construction.
//!
//! Assembles all Axum routes and middleware into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;
use crate::{api, live};

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/items", get(api::list_items).post(api::create_item))
        .route(
            "/items/{id}",
            get(api::get_item)
                .patch(api::update_item)
                .delete(api::delete_item),
        )
        .route("/tasks/run", post(api::run_task))
        .route("/ws/items", get(live::ws_upgrade))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(error = %e, origin, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use newswire_core::config::SchedulerConfig;
    use newswire_core::Candidate;
    use newswire_store::{MemoryStore, RecordStore};
    use newswire_sync::{SendError, StaticFetcher, Subscriber};

    #[derive(Default)]
    struct Inbox(Mutex<Vec<String>>);

    #[async_trait]
    impl Subscriber for Inbox {
        async fn send(&self, text: &str) -> Result<(), SendError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    impl Inbox {
        fn kinds(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|t| serde_json::from_str::<serde_json::Value>(t).unwrap()["event"]
                    .as_str()
                    .unwrap()
                    .to_string())
                .collect()
        }
    }

    fn test_state(candidates: Vec<Candidate>) -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(MemoryStore::new()),
            None,
            newswire_bus::SUBJECT,
            Arc::new(StaticFetcher::new(candidates)),
            &SchedulerConfig {
                interval_secs: 300,
                fetch_limit: 10,
            },
        ))
    }

    async fn send(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = build_router(state.clone(), "*");
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_components() {
        let state = test_state(Vec::new());
        let (status, body) = send(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["bus_connected"], false);
        assert_eq!(body["subscribers"], 0);
        assert_eq!(body["scheduler"], "idle");
        assert_eq!(body["interval_secs"], 300);
    }

    #[tokio::test]
    async fn test_create_get_and_duplicate() {
        let state = test_state(Vec::new());
        let inbox = Arc::new(Inbox::default());
        state.hub.register(inbox.clone()).await;

        let item = serde_json::json!({"title": "A", "url": "u1", "comments": 3});
        let (status, created) = send(&state, "POST", "/items", Some(item.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["url"], "u1");
        assert_eq!(inbox.kinds(), vec!["item.created"]);

        let id = created["id"].as_i64().unwrap();
        let (status, fetched) = send(&state, "GET", &format!("/items/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["comments"], 3);

        let (status, _) = send(&state, "POST", "/items", Some(item)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(inbox.kinds().len(), 1);
    }

    #[tokio::test]
    async fn test_created_item_is_matched_by_later_fetch() {
        let state = test_state(vec![Candidate::new(" u1 ", "fetched")]);
        let item = serde_json::json!({"title": "A", "url": " u1 "});
        let (status, created) = send(&state, "POST", "/items", Some(item)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["url"], "u1");

        let (_, run) = send(&state, "POST", "/tasks/run", None).await;
        assert_eq!(run["count"], 1);

        let (_, body) = send(&state, "GET", "/items", None).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], created["id"]);
        assert_eq!(items[0]["title"], "fetched");

        let uri = format!("/items/{}", created["id"]);
        let (status, updated) =
            send(&state, "PATCH", &uri, Some(serde_json::json!({"url": " u2 "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["url"], "u2");
    }

    #[tokio::test]
    async fn test_oversized_title_is_rejected() {
        let state = test_state(Vec::new());
        let title = "x".repeat(newswire_core::MAX_TEXT_LEN + 1);
        let item = serde_json::json!({"title": title, "url": "u1"});
        let (status, _) = send(&state, "POST", "/items", Some(item)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let state = test_state(Vec::new());
        let item = serde_json::json!({"title": "  ", "url": "u1"});
        let (status, _) = send(&state, "POST", "/items", Some(item)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patch_and_delete_lifecycle() {
        let state = test_state(Vec::new());
        let inbox = Arc::new(Inbox::default());
        state.hub.register(inbox.clone()).await;

        let (_, created) = send(
            &state,
            "POST",
            "/items",
            Some(serde_json::json!({"title": "A", "url": "u1"})),
        )
        .await;
        let uri = format!("/items/{}", created["id"]);

        let (status, updated) =
            send(&state, "PATCH", &uri, Some(serde_json::json!({"title": "B"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "B");
        assert_eq!(updated["url"], "u1");

        let (status, _) = send(&state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            send(&state, "PATCH", &uri, Some(serde_json::json!({"title": "C"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(inbox.kinds(), vec!["item.created", "item.updated", "item.deleted"]);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_pagination() {
        let state = test_state(Vec::new());
        for n in 1..=3 {
            let item = serde_json::json!({"title": format!("T{n}"), "url": format!("u{n}")});
            send(&state, "POST", "/items", Some(item)).await;
        }
        let (status, body) = send(&state, "GET", "/items?limit=2&offset=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let urls: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["url"].as_str().unwrap())
            .collect();
        assert_eq!(urls, vec!["u2", "u1"]);
    }

    #[tokio::test]
    async fn test_manual_task_run_reports_summary() {
        let state = test_state(vec![Candidate::new("u1", "A"), Candidate::new("u2", "B")]);
        let inbox = Arc::new(Inbox::default());
        state.hub.register(inbox.clone()).await;

        let (status, body) = send(&state, "POST", "/tasks/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["count"], 2);
        assert!(body["timestamp"].is_string());
        assert_eq!(
            inbox.kinds(),
            vec!["item.created", "item.created", "task.completed"]
        );
    }

    #[test]
    fn test_invalid_cors_origin_falls_back() {
        // Must not panic on a header-invalid origin.
        let _ = cors_layer("bad\norigin");
        let _ = cors_layer("https://news.example");
    }
}
