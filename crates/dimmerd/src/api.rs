use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use motion_dimmer::DisableRequest;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::EngineHandle;
use crate::engine::EntityState;
use crate::engine::EntityUpdate;
use crate::engine::Service;
use crate::engine::ServiceCall;
use crate::engine::ServiceError;
use crate::engine::ServiceTarget;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    dimmers: Vec<String>,
}

/// Body of a service call: who to target and, for `temporarily_disable`,
/// for how long.
#[derive(Debug, Default, Deserialize)]
struct ServiceRequest {
    #[serde(flatten)]
    target: ServiceTarget,
    #[serde(flatten)]
    duration: DisableRequest,
}

#[derive(Serialize)]
struct ServiceResponse {
    devices: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::UnknownService(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::NoTarget)
            | ApiError::Service(ServiceError::UnknownDevice(_))
            | ApiError::Service(ServiceError::UnknownEntity(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::EngineStopped) => StatusCode::SERVICE_UNAVAILABLE,
        };
        tracing::debug!("Request failed: {}", self);
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    dimmers: Vec<String>,
    engine: EngineHandle,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            dimmers: state.dimmers.clone(),
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    Json(crate::engine::State::clone(&snapshot))
}

/// Handler for GET /v1/states/:entity_id
#[tracing::instrument(skip(state))]
async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, ApiError> {
    state
        .engine
        .state_snapshot()
        .entity(&entity_id)
        .map(Json)
        .ok_or(ApiError::UnknownEntity(entity_id))
}

/// Handler for POST /v1/states/:entity_id
///
/// Returns once every dimmer has reacted to the new state.
#[tracing::instrument(skip(state))]
async fn set_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(update): Json<EntityUpdate>,
) -> Result<Json<EntityState>, ApiError> {
    state.engine.set_state(entity_id.clone(), update).await?;
    get_entity(State(state), Path(entity_id)).await
}

/// Handler for POST /v1/services/:service
#[tracing::instrument(skip(state))]
async fn call_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Json(request): Json<ServiceRequest>,
) -> Result<Json<ServiceResponse>, ApiError> {
    let service: Service = service
        .parse()
        .map_err(|_| ServiceError::UnknownService(service.clone()))?;

    let devices = state
        .engine
        .call_service(ServiceCall {
            service,
            target: request.target,
            duration: request.duration,
        })
        .await?;

    Ok(Json(ServiceResponse { devices }))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/states/:entity_id", get(get_entity).post(set_entity))
        .route("/v1/services/:service", post(call_service))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the router for a running engine.
pub fn router(engine: EngineHandle, dimmers: Vec<String>) -> Router {
    create_router(Arc::new(AppState {
        version: env!("CARGO_PKG_VERSION"),
        dimmers,
        engine,
    }))
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    app: Router,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
