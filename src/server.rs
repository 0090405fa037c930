use std::future::Future;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, LogFormat};
use crate::exporter::Exporter;
use crate::puppetdb::PuppetDbClient;

/// Shared state for the scrape endpoint.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub metrics_path: String,
}

pub fn router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(&metrics_path, get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

pub async fn run(config: Config) -> Result<()> {
    init_tracing(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "PuppetDB exporter starting");

    let client = match PuppetDbClient::new(&config.client_options()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, url = %config.puppetdb_url, "failed to create PuppetDB client");
            return Err(e).context("creating PuppetDB client");
        }
    };

    let registry = Registry::new();
    let mut exporter = Exporter::new(client, &config.namespace, &registry)
        .with_context(|| format!("registering metrics under namespace {}", config.namespace))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = config.scrape_interval();
    let poller = tokio::spawn(async move {
        exporter.run(interval, shutdown_rx).await;
    });

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding to {}", config.listen_addr))?;

    info!(
        addr = %config.listen_addr,
        path = %config.metrics_path,
        "HTTP server listening"
    );

    let state = AppState {
        registry,
        metrics_path: config.metrics_path.clone(),
    };
    serve(listener, state, async move {
        shutdown_signal().await;
        // Receiver may already be gone if the poller panicked
        let _ = shutdown_tx.send(true);
    })
    .await?;

    poller.await.context("poll loop task failed")?;

    info!("PuppetDB exporter stopped");
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => log_filter(&config.log_level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

fn log_filter(level: &str) -> Result<tracing_subscriber::EnvFilter> {
    tracing_subscriber::EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level {:?}", level))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>PuppetDB Exporter</title></head>\n<body>\n\
         <h1>PuppetDB Exporter</h1>\n<p><a href=\"{0}\">{0}</a></p>\n</body>\n</html>\n",
        state.metrics_path
    ))
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buf)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::NodeStatusMetrics;
    use tokio::sync::oneshot;

    async fn spawn_server(
        state: AppState,
    ) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state, async move {
            let _ = rx.await;
        }));
        (format!("http://{}", addr), tx, handle)
    }

    fn state_with_counts(metrics_path: &str) -> AppState {
        let registry = Registry::new();
        let metrics = NodeStatusMetrics::new("puppetdb").unwrap();
        registry.register(Box::new(metrics.clone())).unwrap();
        metrics.set("changed", 2);
        metrics.set("unchanged", 1);
        AppState {
            registry,
            metrics_path: metrics_path.to_string(),
        }
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_exposition() {
        let (base, tx, handle) = spawn_server(state_with_counts("/metrics")).await;

        let resp = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = resp.text().await.unwrap();
        assert!(body.contains("puppetdb_node_report_status_count{status=\"changed\"} 2"));
        assert!(body.contains("puppetdb_node_report_status_count{status=\"unchanged\"} 1"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn custom_metrics_path_is_honoured() {
        let (base, tx, handle) = spawn_server(state_with_counts("/scrape/metrics")).await;

        let resp = reqwest::get(format!("{}/scrape/metrics", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let resp = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let index = reqwest::get(&base).await.unwrap().text().await.unwrap();
        assert!(index.contains("href=\"/scrape/metrics\""));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn log_filter_rejects_invalid_level() {
        assert!(log_filter("info").is_ok());
        assert!(log_filter("puppetdb_exporter=debug,warn").is_ok());
        assert!(log_filter("puppetdb_exporter=loud").is_err());
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let (base, tx, handle) = spawn_server(state_with_counts("/metrics")).await;

        let body = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
