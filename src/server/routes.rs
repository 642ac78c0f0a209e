//! HTTP routes.

use crate::storage::Database;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>rssd</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<h1>rssd</h1>
</body>
</html>
"#;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("metrics_enabled", &self.prometheus.is_some())
            .finish()
    }
}

impl AppState {
    /// Creates handler state.
    #[must_use]
    pub const fn new(db: Arc<Database>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { db, prometheus }
    }

    /// Returns the database.
    #[must_use]
    pub const fn db(&self) -> &Arc<Database> {
        &self.db
    }
}

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct Health {
    /// `ok` or `unavailable`.
    pub status: &'static str,
    /// Persisted schema version, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

/// Builds the router.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let db = Arc::clone(&state.db);
    let version = tokio::task::spawn_blocking(move || db.schema_version()).await;

    match version {
        Ok(Ok(v)) => (
            StatusCode::OK,
            Json(Health {
                status: "ok",
                schema_version: Some(v),
            }),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "health check failed");
            unavailable()
        },
        Err(e) => {
            tracing::error!(error = %e, "health check task failed");
            unavailable()
        },
    }
}

const fn unavailable() -> (StatusCode, Json<Health>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(Health {
            status: "unavailable",
            schema_version: None,
        }),
    )
}

async fn metrics(State(state): State<AppState>) -> Response {
    state.prometheus.as_ref().map_or_else(
        || StatusCode::NOT_FOUND.into_response(),
        |handle| {
            (
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                handle.render(),
            )
                .into_response()
        },
    )
}
