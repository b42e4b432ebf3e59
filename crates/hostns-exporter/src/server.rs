//! HTTP server exposing the metrics registry

use crate::metrics::ExporterMetrics;
use axum::{
    Router,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::time::Duration;
use tower::{BoxError, ServiceBuilder};

#[derive(Clone)]
pub struct AppState {
    metrics: Arc<ExporterMetrics>,
}

impl AppState {
    pub fn new(metrics: ExporterMetrics) -> Self {
        Self {
            metrics: Arc::new(metrics),
        }
    }
}

/// Build the router: `metrics_path` serves the registry, everything else 404s.
pub fn router(state: AppState, metrics_path: &str, timeout: Duration) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_service_error))
                .timeout(timeout),
        )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, ExporterMetrics::content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn handle_service_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled internal error: {err}"),
        )
    }
}

/// Serve `app` on an already bound listener until SIGINT or SIGTERM.
pub async fn run(listener: std::net::TcpListener, app: Router) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;
    tracing::info!(addr = %listener.local_addr()?, "serving metrics");

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(signals))
        .await?;

    handle.close();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal(mut signals: Signals) {
    if let Some(signal) = signals.next().await {
        tracing::info!(signal, "signal received, starting graceful shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use hostns_core::NetNs;
    use tower::ServiceExt;

    fn app() -> Router {
        let netns = NetNs::current().unwrap().id();
        let metrics = ExporterMetrics::new(netns, Duration::ZERO).unwrap();
        router(AppState::new(metrics), "/metrics", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn serves_metrics() {
        let response = app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_owned();
        assert_eq!(content_type, ExporterMetrics::content_type());

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("hostns_exporter_build_info"), "{text}");
        assert!(text.contains("hostns_exporter_scrapes_total 1"), "{text}");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_on_bound_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(run(listener, app()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET /metrics HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
            .await
            .unwrap();
        let mut response = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
            .await
            .unwrap();

        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("hostns_exporter_build_info"));
        server.abort();
    }
}
