//! HTTP API
//!
//! `GET /` model info, `GET /health` liveness, `POST /generate` text
//! generation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use lumi_config::LumiConfig;
use lumi_inference_engine::{GenerationOptions, GenerationParams, TemplateKind};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Lumi;

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

pub const SERVER_NAME: &str = "Lumi Model Server";

/// Shared application state
pub struct AppState {
    pub lumi: Arc<Lumi>,
}

impl AppState {
    pub fn new(lumi: Arc<Lumi>) -> Self {
        Self { lumi }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

/// Effective settings echoed back to the client. `do_sample` is left out.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfigEcho {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub template: String,
}

impl GenerationConfigEcho {
    fn new(params: &GenerationParams, requested_template: Option<&str>) -> Self {
        GenerationConfigEcho {
            max_new_tokens: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repetition_penalty: params.repetition_penalty,
            template: requested_template
                .unwrap_or(TemplateKind::default().name())
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
    pub prompt: String,
    pub generation_config: GenerationConfigEcho,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub message: String,
    pub model_device: String,
    pub model_parameters: usize,
    pub available_templates: Vec<String>,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Model information endpoint
pub async fn root(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let endpoints = BTreeMap::from([
        ("generate".to_string(), "/generate - Text generation".to_string()),
        ("health".to_string(), "/health - Server status".to_string()),
    ]);

    Json(InfoResponse {
        message: SERVER_NAME.to_string(),
        model_device: state.lumi.device().to_string(),
        model_parameters: state.lumi.parameter_count(),
        available_templates: TemplateKind::names().into_iter().map(String::from).collect(),
        endpoints,
    })
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        device: state.lumi.device().to_string(),
    })
}

/// Text generation endpoint
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let requested_template = request.options.template.clone();
    let params = GenerationParams::from_options(request.options);
    debug!("Request {}: {:?}", request_id, params);

    match state.lumi.generate(&request.prompt, &params).await {
        Ok(result) => {
            info!("Request {} completed", request_id);
            let response = GenerationResponse {
                response: result.completion,
                prompt: request.prompt,
                generation_config: GenerationConfigEcho::new(&params, requested_template.as_deref()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Request {} failed: {}", request_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { detail: format!("Generation error: {}", e) }),
            )
                .into_response()
        }
    }
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate", post(generate))
}

pub fn app(lumi: Arc<Lumi>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState::new(lumi)))
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn serve(lumi: Arc<Lumi>, config: &LumiConfig) -> Result<()> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server listening on http://{}", addr);
    info!("  GET  /         - Model info");
    info!("  GET  /health   - Health check");
    info!("  POST /generate - Text generation");

    axum::serve(listener, app(lumi))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
