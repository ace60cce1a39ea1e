//! HTTP server for the csv2bufr API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/templates`  | List available mapping templates     |
//! | POST   | `/api/transform`  | Convert CSV text to BUFR messages    |
//!
//! Conversion shells out to ecCodes and runs on the blocking thread pool.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::types::{
    error_response, MappingRef, MessagePayload, RowFailure, TemplateListResponse, TransformRequest, TransformResponse,
};
use crate::config::Settings;
use crate::encoder::{BufrEncoder, EccodesToolEncoder};
use crate::error::{PipelineError, RegistryError, ServerError};
use crate::registry::TemplateRegistry;
use crate::transform::{transform_str, MappingTemplate};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub registry: TemplateRegistry,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let registry = TemplateRegistry::from_settings(&settings);
        Self { settings, registry }
    }
}

/// Build the router without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/templates", get(list_templates))
        .route("/api/transform", post(transform_csv))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Start the HTTP server
pub async fn start_server(port: u16, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(settings));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "csv2bufr server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(error_response(&self.to_string()))).into_response()
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Pipeline(PipelineError::Registry(RegistryError::InvalidName(_))) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Pipeline(PipelineError::Registry(RegistryError::NotFound(_))) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(
                PipelineError::Template(_)
                | PipelineError::Registry(_)
                | PipelineError::Csv(_)
                | PipelineError::Metadata(_),
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Pipeline(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "csv2bufr",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "templates": "GET /api/templates",
            "transform": "POST /api/transform"
        }
    }))
}

async fn list_templates(State(state): State<Arc<AppState>>) -> Json<TemplateListResponse> {
    Json(TemplateListResponse {
        templates: state.registry.list(),
    })
}

async fn transform_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransformRequest>,
) -> Result<Json<TransformResponse>, ServerError> {
    info!(bytes = request.data.len(), "transform request");

    let response = tokio::task::spawn_blocking(move || {
        let encoder = EccodesToolEncoder::from_settings(&state.settings.eccodes).map_err(PipelineError::from)?;
        run_transform(&request, &state.registry, encoder)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(response))
}

/// Convert one request to a response, collecting every row.
pub fn run_transform<E: BufrEncoder>(
    request: &TransformRequest,
    registry: &TemplateRegistry,
    encoder: E,
) -> Result<TransformResponse, ServerError> {
    let template = match request.mapping_ref() {
        Some(MappingRef::Named(name)) => registry.get(name).map_err(PipelineError::from)?,
        Some(MappingRef::Inline(raw)) => MappingTemplate::load(raw).map_err(PipelineError::from)?,
        None => {
            return Err(ServerError::BadRequest(
                "'mapping' must be a template object or a template name".to_string(),
            ))
        }
    };
    if !request.metadata.is_object() {
        return Err(ServerError::BadRequest("'metadata' must be an object".to_string()));
    }

    let mut run = transform_str(request.data.clone(), request.metadata.clone(), template, encoder)?;

    let mut messages = Vec::new();
    let mut errors = Vec::new();
    for result in run.by_ref() {
        match result {
            Ok(record) => messages.push(MessagePayload::from(record)),
            Err(e) => {
                warn!(row = e.row, error = %e.kind, "row not converted");
                errors.push(RowFailure::from(&e));
            }
        }
    }

    Ok(TransformResponse {
        messages,
        errors,
        summary: run.summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::MemoryEncoder;
    use tempfile::TempDir;

    fn mapping() -> Value {
        json!({
            "inputDelayedDescriptorReplicationFactor": [],
            "header": [
                { "eccodes_key": "edition", "value": "const:4" },
                { "eccodes_key": "dataCategory", "value": "const:0" }
            ],
            "data": [
                { "eccodes_key": "#1#airTemperature", "value": "data:air_temperature", "offset": "const:273.15", "scale": "const:0" },
                { "eccodes_key": "#1#stationOrSiteName", "value": "metadata:$.name" }
            ]
        })
    }

    fn request(mapping: Value) -> TransformRequest {
        serde_json::from_value(json!({
            "data": "station,air_temperature\nA,20\nB,\n",
            "mapping": mapping,
            "metadata": { "name": "GENEVA" }
        }))
        .unwrap()
    }

    fn empty_registry(dir: &TempDir) -> TemplateRegistry {
        TemplateRegistry::with_dirs(vec![], dir.path())
    }

    #[test]
    fn test_run_transform_inline_mapping() {
        let dir = TempDir::new().unwrap();
        let response = run_transform(&request(mapping()), &empty_registry(&dir), MemoryEncoder::new()).unwrap();

        assert_eq!(response.messages.len(), 2);
        assert!(response.errors.is_empty());
        assert_eq!(response.summary.converted, 2);
        assert_eq!(response.messages[0].checksum.len(), 64);
        assert!(!response.messages[0].bufr4.is_empty());
    }

    #[test]
    fn test_run_transform_named_mapping() {
        let dir = TempDir::new().unwrap();
        let registry = empty_registry(&dir);
        registry.save("simple", &mapping()).unwrap();

        let response = run_transform(&request(json!("simple")), &registry, MemoryEncoder::new()).unwrap();
        assert_eq!(response.messages.len(), 2);
    }

    #[test]
    fn test_run_transform_reports_row_errors() {
        let dir = TempDir::new().unwrap();
        let encoder = MemoryEncoder::rejecting("#1#stationOrSiteName");
        let response = run_transform(&request(mapping()), &empty_registry(&dir), encoder).unwrap();

        assert!(response.messages.is_empty());
        assert_eq!(response.errors.len(), 2);
        assert_eq!(response.errors[1].row, 1);
        assert_eq!(response.summary.failed, 2);
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = run_transform(&request(json!("nope")), &empty_registry(&dir), MemoryEncoder::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_template_name_is_not_a_path() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.json"), mapping().to_string()).unwrap();
        let name = outside.path().join("secret").to_string_lossy().into_owned();

        let err = run_transform(&request(json!(name)), &empty_registry(&dir), MemoryEncoder::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_inline_mapping_is_unprocessable() {
        let dir = TempDir::new().unwrap();
        let err = run_transform(&request(json!({ "header": [] })), &empty_registry(&dir), MemoryEncoder::new())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_bad_mapping_kind_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let err = run_transform(&request(json!(7)), &empty_registry(&dir), MemoryEncoder::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "csv2bufr");
    }
}
