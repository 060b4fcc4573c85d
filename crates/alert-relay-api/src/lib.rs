//! # Alert Relay HTTP Service
//!
//! HTTP surface of the relay:
//! - `POST {eventsub.callback_path}`: signed EventSub callbacks
//! - `GET /health`, `GET /ready`: liveness and readiness
//! - `GET /metrics`: Prometheus text exposition

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use crate::config::ServiceConfig;
pub use crate::errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use crate::metrics::ServiceMetrics;
pub use crate::responses::{CallbackResponse, HealthResponse, ReadinessResponse};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use alert_relay_core::{
    queue::EventQueue,
    signature::SignatureVerifier,
    webhook::{EventSubProcessor, ProcessingOutcome, WebhookEnvelope, WebhookHeaders},
    WebhookError, WebhookProcessor,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub processor: Arc<dyn WebhookProcessor>,
    pub queue: Arc<EventQueue>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        config: Arc<ServiceConfig>,
        processor: Arc<dyn WebhookProcessor>,
        queue: Arc<EventQueue>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            processor,
            queue,
            metrics,
        }
    }

    /// State backed by an [`EventSubProcessor`] that verifies against
    /// `eventsub.secret` and publishes into `queue`.
    pub fn for_eventsub(config: ServiceConfig, queue: Arc<EventQueue>) -> Result<Self, ServiceError> {
        let metrics = ServiceMetrics::new().map_err(|e| {
            ServiceError::Configuration(ConfigError::Invalid {
                message: format!("Failed to initialize metrics: {}", e),
            })
        })?;
        let verifier = SignatureVerifier::new(config.eventsub.secret.clone());
        let processor = Arc::new(EventSubProcessor::new(verifier, queue.clone()));

        Ok(Self::new(Arc::new(config), processor, queue, metrics))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("metrics", &self.metrics)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    let callback_routes = Router::new().route(
        &state.config.eventsub.callback_path,
        post(handle_eventsub_callback),
    );

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(callback_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Bind the configured address.
pub async fn bind(config: &crate::config::ServerConfig) -> Result<TcpListener, ServiceError> {
    let address = config.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address,
            message: e.to_string(),
        })
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// In-flight requests complete; new connections stop being accepted as soon
/// as `shutdown` fires.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(address) = listener.local_addr() {
        info!("Starting HTTP server on {}", address);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Bind and serve in one step.
pub async fn start_server<F>(
    config: &crate::config::ServerConfig,
    router: Router,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(config).await?;
    serve(listener, router, shutdown).await
}

/// Resolve on SIGINT or (on unix) SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
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
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Callback Handler
// ============================================================================

/// Handle an EventSub callback
///
/// Verification, dispatch and publishing happen in the processor; this maps
/// its outcome onto the wire. Malformed payloads on a recognised event type
/// are acknowledged so the platform does not keep redelivering them.
#[instrument(skip(state, headers, body))]
pub async fn handle_eventsub_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackResponse>, WebhookHandlerError> {
    state.metrics.webhook_requests_total.inc();

    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();

    let webhook_headers = WebhookHeaders::from_http_headers(&header_map).map_err(|e| {
        state.metrics.webhook_malformed_total.inc();
        WebhookHandlerError::from(e)
    })?;

    let envelope = WebhookEnvelope::new(webhook_headers, body);
    match state.processor.process(envelope).await {
        Ok(ProcessingOutcome::Challenge(challenge)) => {
            Ok(Json(CallbackResponse::Challenge { challenge }))
        }
        Ok(ProcessingOutcome::Accepted { event, .. }) => {
            if event.is_some() {
                state.metrics.alert_events_published_total.inc();
            }
            Ok(Json(CallbackResponse::ok()))
        }
        Ok(ProcessingOutcome::Revoked { .. }) => Ok(Json(CallbackResponse::ok())),
        Err(e) if e.is_acknowledged() => {
            state.metrics.webhook_malformed_total.inc();
            warn!(error = %e, "Acknowledging callback with malformed payload");
            Ok(Json(CallbackResponse::ok()))
        }
        Err(WebhookError::Unauthorized) => {
            state.metrics.webhook_signature_failures_total.inc();
            warn!("Rejected callback with invalid signature");
            Err(WebhookHandlerError::Unauthorized)
        }
        Err(e) => {
            state.metrics.webhook_malformed_total.inc();
            Err(e.into())
        }
    }
}

// ============================================================================
// Health and Observability
// ============================================================================

async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Ready once at least one sink is registered and the queue is open.
async fn handle_readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let sinks: Vec<String> = state.queue.stats().into_iter().map(|s| s.sink).collect();
    let queue_open = !state.queue.is_closed();
    let ready = queue_open && !sinks.is_empty();

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            sinks,
            queue_open,
            timestamp: chrono::Utc::now(),
        }),
    )
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    state.metrics.observe_queue(&state.queue.stats());

    match state.metrics.render() {
        Ok(text) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation IDs
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
