//! HTTP dispatcher (`spec.md` §4.F).
//!
//! Three protocol endpoints sharing one path, plus a static file surface with
//! HTML/JSON import-map injection.

mod importmap;
mod poll;
mod result;
mod static_files;

use crate::{broker::BrokerHandle, config::BrokerConfig};
use axum::{
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
    pub root: std::path::PathBuf,
    pub client_script: Arc<String>,
}

/// Build the full router: the three protocol endpoints under
/// `config.poll_path`, plus a fallback static file handler for everything
/// else.
#[must_use]
pub fn router(config: &BrokerConfig, broker: BrokerHandle) -> Router {
    let state = AppState {
        broker,
        root: config.root.clone(),
        client_script: Arc::new(static_files::default_client_script()),
    };

    let poll_route = format!("/{}", config.poll_path.trim_start_matches('/'));

    Router::new()
        .route(&poll_route, get(poll::handle).post(result::handle))
        .fallback(static_files::handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use axum::{body::Body, http::Request};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_config(root: &std::path::Path) -> BrokerConfig {
        BrokerConfig {
            root: root.to_path_buf(),
            debounce_ms: 5,
            long_poll_min_ms: 20,
            long_poll_max_ms: 30,
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_poll_returns_200_with_no_job_header() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let (handle, broker) = Broker::spawn(config.clone()).unwrap();
        tokio::spawn(broker.run());
        let app = router(&config, handle);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}?name=alice", config.poll_path))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert!(response.headers().get("x-job-id").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{}?name=", config.poll_path))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_result_for_unknown_job_still_returns_200() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let (handle, broker) = Broker::spawn(config.clone()).unwrap();
        tokio::spawn(broker.run());
        let app = router(&config, handle);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{}?name=ghost", config.poll_path))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"ok":true,"value":1,"backgroundEvents":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
