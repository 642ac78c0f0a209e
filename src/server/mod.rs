//! HTTP service lifecycle.
//!
//! The database is opened (and therefore migrated) before the listener is
//! bound, and closed after the server has drained.

mod routes;

pub use routes::{AppState, Health, router};

use crate::config::RssdConfig;
use crate::schema;
use crate::storage::Database;
use crate::{Error, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Opens the database, serves HTTP until Ctrl-C, then closes the database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated, or if the
/// listener cannot be bound. A failure to close the database on the way out
/// is logged, not returned.
pub async fn run(config: RssdConfig, prometheus: Option<PrometheusHandle>) -> Result<()> {
    let db = open_database(&config).await?;

    let result = serve(&config, Arc::clone(&db), prometheus).await;

    match db.close() {
        Ok(()) => {},
        Err(e) => tracing::error!(error = %e, "closing db"),
    }

    result
}

/// Opens and migrates the database off the async runtime.
///
/// # Errors
///
/// Returns the open or migration error.
pub async fn open_database(config: &RssdConfig) -> Result<Arc<Database>> {
    let path = config.db_path.clone();
    let storage = config.storage;
    tokio::task::spawn_blocking(move || {
        let registry = schema::registry();
        Database::open(&path, &storage, &registry).map(Arc::new)
    })
    .await
    .map_err(|e| Error::operation("open_database_task", e))?
}

async fn serve(
    config: &RssdConfig,
    db: Arc<Database>,
    prometheus: Option<PrometheusHandle>,
) -> Result<()> {
    let app = router(AppState::new(db, prometheus), &config.static_dir);

    let listener = TcpListener::bind(config.http_addr)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "bind".to_string(),
            cause: format!("{}: {e}", config.http_addr),
        })?;

    tracing::info!(http_addr = %config.http_addr, "HTTP server starting to listen");
    serve_until(listener, app, config.http_grace, shutdown_signal()).await
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// After `shutdown`, the listener stops accepting and in-flight requests get
/// up to `grace` to finish. Connections still open after that are abandoned.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: axum::Router,
    grace: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(true);
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(|e| Error::operation("serve", e)),
        _ = signalled_rx.wait_for(|signalled| *signalled) => {},
    }

    tracing::info!(
        timeout = ?grace,
        "interrupt signal received. shutting down HTTP server with timeout for existing connections."
    );

    match tokio::time::timeout(grace, server).await {
        Ok(result) => result.map_err(|e| Error::operation("serve", e)),
        Err(_) => {
            tracing::warn!(timeout = ?grace, "HTTP shutdown grace period elapsed");
            Ok(())
        },
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "listening for interrupt signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationRegistry;

    #[tokio::test]
    async fn test_serve_until_stops_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(
            dir.path().join("rss.sqlite3"),
            &crate::StorageConfig::default(),
            &MigrationRegistry::builder().build(),
        )
        .unwrap();
        let app = router(AppState::new(Arc::new(db), None), dir.path());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(
            listener,
            app,
            Duration::from_secs(1),
            async move {
                let _ = rx.await;
            },
        ));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_open_database_applies_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = RssdConfig::default().with_db_path(dir.path().join("rss.sqlite3"));
        let db = open_database(&config).await.unwrap();
        assert_eq!(
            db.schema_version().unwrap(),
            schema::registry().target_version()
        );
        db.close().unwrap();
    }
}
