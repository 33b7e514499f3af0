//! Hyper-based HTTP Server
//!
//! Direct Hyper routing for the inference endpoints. Model calls block, so
//! every one of them runs on tokio's blocking pool and never on the reactor.

use hyper::body::to_bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpSocket;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::models::evidence::extract_evidence;
use crate::models::rubric::compile_rubric;
use crate::models::search::top_k_similar;
use crate::models::{InferenceError, InferenceResult, ModelContext};
use crate::protocol::http::{
    CompileRubricRequest, CompileRubricResponse, EmbedChunksRequest, EmbedChunksResponse,
    ExtractEvidenceRequest, HealthResponse, HttpErrorResponse, SearchChunksRequest,
    SearchChunksResponse, SearchResult, TestEmbeddingsRequest, TestEmbeddingsResponse,
    TestLlmRequest, TestLlmResponse, SAMPLE_EMBEDDING_LEN,
};
use crate::server::config::ServerConfig;

/// Shared state for the Hyper server
#[derive(Clone)]
pub struct ServerState {
    models: Option<Arc<ModelContext>>,
    config: Arc<ServerConfig>,
}

impl ServerState {
    pub fn new(config: Arc<ServerConfig>, models: Arc<ModelContext>) -> Self {
        Self {
            models: Some(models),
            config,
        }
    }

    /// State of a server whose models are not available.
    pub fn without_models(config: Arc<ServerConfig>) -> Self {
        Self {
            models: None,
            config,
        }
    }

    pub fn models_loaded(&self) -> bool {
        self.models.is_some()
    }
}

/// Start the Hyper HTTP server
pub async fn start_hyper_http_server(state: ServerState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state.config.bind_address()?;

    info!("🚀 Starting Hyper HTTP Server");
    info!("📡 Binding to {}", addr);

    // Create service factory
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_nodelay(true)?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    let server = Server::from_tcp(listener.into_std()?)?
        .http1_keepalive(true)
        .tcp_nodelay(true)
        .tcp_sleep_on_accept_errors(true)
        .serve(make_svc);

    info!("✅ Hyper HTTP server listening on {}", addr);
    info!("📍 Endpoints:");
    info!("   GET  /health           - Health check");
    info!("   POST /test-llm         - Generate text from a prompt");
    info!("   POST /test-embeddings  - Embed a list of texts");
    info!("   POST /embed-chunks     - Embed code chunks");
    info!("   POST /search-chunks    - Rank chunks against a query");
    info!("   POST /compile-rubric   - Extract requirements from an assignment");
    info!("   POST /extract-evidence - Judge a requirement against code chunks");
    info!("   GET  /                 - Server info");

    server.await?;

    Ok(())
}

/// Main request handler
pub async fn handle_request(
    req: Request<Body>,
    state: ServerState,
) -> Result<Response<Body>, Infallible> {
    let origin = req
        .headers()
        .get("origin")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!("request", request_id = %Uuid::new_v4(), %method, %path);

    let mut response = async {
        debug!("📨 Request received");
        match (&method, path.as_str()) {
            (&Method::GET, "/health") => handle_health(&state),
            (&Method::POST, "/test-llm") => handle_test_llm(req, &state).await,
            (&Method::POST, "/test-embeddings") => handle_test_embeddings(req, &state).await,
            (&Method::POST, "/embed-chunks") => handle_embed_chunks(req, &state).await,
            (&Method::POST, "/search-chunks") => handle_search_chunks(req, &state).await,
            (&Method::POST, "/compile-rubric") => handle_compile_rubric(req, &state).await,
            (&Method::POST, "/extract-evidence") => handle_extract_evidence(req, &state).await,
            (&Method::GET, "/") => handle_root(&state),
            (&Method::OPTIONS, _) => handle_options(),
            _ => error_response(StatusCode::NOT_FOUND, HttpErrorResponse::not_found()),
        }
    }
    .instrument(span)
    .await;

    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", origin);
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );

    Ok(response)
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Root endpoint - server info
fn handle_root(state: &ServerState) -> Response<Body> {
    let info = serde_json::json!({
        "name": "ML Inference Server",
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": state.models_loaded(),
        "models": {
            "generator": state.config.models.generator_repo,
            "embedder": state.config.models.embedder_repo,
        },
        "endpoints": {
            "health": {"method": "GET", "path": "/health"},
            "test_llm": {"method": "POST", "path": "/test-llm"},
            "test_embeddings": {"method": "POST", "path": "/test-embeddings"},
            "embed_chunks": {"method": "POST", "path": "/embed-chunks"},
            "search_chunks": {"method": "POST", "path": "/search-chunks"},
            "compile_rubric": {"method": "POST", "path": "/compile-rubric"},
            "extract_evidence": {"method": "POST", "path": "/extract-evidence"}
        }
    });

    json_response(StatusCode::OK, &info)
}

/// Health check endpoint
fn handle_health(state: &ServerState) -> Response<Body> {
    debug!("🏥 Health check requested");
    json_response(StatusCode::OK, &HealthResponse::healthy(state.models_loaded()))
}

/// Text generation endpoint
async fn handle_test_llm(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: TestLlmRequest = match read_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let start = Instant::now();
    let prompt = request.prompt.clone();
    let result = run_blocking(move || models.generator().generate(&prompt, request.seed)).await;
    info!("⏱️  Generation took: {:?}", start.elapsed());

    match result {
        Ok(response) => json_response(
            StatusCode::OK,
            &TestLlmResponse {
                prompt: request.prompt,
                response,
            },
        ),
        Err(e) => inference_error_response(e),
    }
}

/// Embedding test endpoint
async fn handle_test_embeddings(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: TestEmbeddingsRequest = match read_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let start = Instant::now();
    let texts = request.texts.clone();
    let result = run_blocking(move || models.embedder().embed(&texts)).await;
    info!("⏱️  Embedding {} texts took: {:?}", request.texts.len(), start.elapsed());

    match result {
        Ok(embeddings) => {
            let (count, dimension) = embeddings.dim();
            let sample_embedding = embeddings
                .rows()
                .into_iter()
                .next()
                .map(|row| row.iter().take(SAMPLE_EMBEDDING_LEN).copied().collect())
                .unwrap_or_default();

            json_response(
                StatusCode::OK,
                &TestEmbeddingsResponse {
                    texts: request.texts,
                    embeddings_shape: [count, dimension],
                    dimension,
                    sample_embedding,
                },
            )
        }
        Err(e) => inference_error_response(e),
    }
}

/// Chunk embedding endpoint
async fn handle_embed_chunks(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: EmbedChunksRequest = match read_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = run_blocking(move || models.embedder().embed(&request.chunks)).await;

    match result {
        Ok(embeddings) => {
            let (count, dimension) = embeddings.dim();
            let embeddings = embeddings.rows().into_iter().map(|row| row.to_vec()).collect();
            json_response(
                StatusCode::OK,
                &EmbedChunksResponse {
                    embeddings,
                    dimension,
                    count,
                },
            )
        }
        Err(e) => inference_error_response(e),
    }
}

/// Similarity search endpoint
async fn handle_search_chunks(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: SearchChunksRequest = match read_required_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let SearchChunksRequest {
        query,
        embeddings,
        chunks_metadata,
        k,
    } = request;

    if query.trim().is_empty() {
        return inference_error_response(InferenceError::InvalidInput {
            message: "query must not be empty".to_string(),
        });
    }

    let result = run_blocking(move || {
        let query_embedding = models.embedder().embed_one(&query)?;
        top_k_similar(&query_embedding, &embeddings, k)
    })
    .await;

    match result {
        Ok(hits) => {
            let results = hits
                .into_iter()
                .enumerate()
                .map(|(position, hit)| SearchResult {
                    rank: position + 1,
                    index: hit.index,
                    score: hit.score,
                    metadata: chunks_metadata
                        .get(hit.index)
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                })
                .collect();
            json_response(StatusCode::OK, &SearchChunksResponse { results })
        }
        Err(e) => inference_error_response(e),
    }
}

/// Rubric compilation endpoint
///
/// Always 200 once the body parses; `success` tells the caller whether any
/// requirement was found.
async fn handle_compile_rubric(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: CompileRubricRequest = match read_required_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let start = Instant::now();
    let result = run_blocking(move || {
        compile_rubric(&request.assignment_text, models.generator(), request.seed)
    })
    .await;
    info!("⏱️  Rubric compilation took: {:?}", start.elapsed());

    match result {
        Ok(compiled) => {
            let success = !compiled.requirements.is_empty();
            info!("📋 Rubric has {} requirements", compiled.requirements.len());
            json_response(
                StatusCode::OK,
                &CompileRubricResponse {
                    success,
                    error: (!success).then(|| "No requirements found in assignment text".to_string()),
                    rubric: compiled.requirements,
                    raw_response: compiled.raw_response,
                },
            )
        }
        Err(e) => inference_error_response(e),
    }
}

/// Evidence extraction endpoint
async fn handle_extract_evidence(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let models = match require_models(state) {
        Ok(models) => models,
        Err(response) => return response,
    };
    let request: ExtractEvidenceRequest = match read_required_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = run_blocking(move || {
        extract_evidence(&request.requirement, &request.chunks, models.embedder())
    })
    .await;

    match result {
        Ok(evidence) => json_response(StatusCode::OK, &evidence),
        Err(e) => inference_error_response(e),
    }
}

async fn read_body(req: Request<Body>) -> Result<hyper::body::Bytes, Response<Body>> {
    to_bytes(req.into_body()).await.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            HttpErrorResponse::new("Failed to read request body").with_details(e.to_string()),
        )
    })
}

fn parse_error(e: serde_json::Error) -> Response<Body> {
    debug!("Rejected request body: {}", e);
    error_response(StatusCode::BAD_REQUEST, HttpErrorResponse::invalid_json(e.to_string()))
}

/// Parse a JSON body. An empty or `null` body yields the defaults.
async fn read_json<T>(req: Request<Body>) -> Result<T, Response<Body>>
where
    T: DeserializeOwned + Default,
{
    let body_bytes = read_body(req).await?;

    if body_bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice::<Option<T>>(&body_bytes)
        .map(Option::unwrap_or_default)
        .map_err(parse_error)
}

/// Parse a JSON body that must be present and carry every required field.
async fn read_required_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let body_bytes = read_body(req).await?;

    if body_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            HttpErrorResponse::invalid_json("request body is required"),
        ));
    }

    serde_json::from_slice(&body_bytes).map_err(parse_error)
}

fn require_models(state: &ServerState) -> Result<Arc<ModelContext>, Response<Body>> {
    state.models.clone().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            HttpErrorResponse::model_not_ready(),
        )
    })
}

/// Run a blocking model call on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> InferenceResult<T>
where
    F: FnOnce() -> InferenceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InferenceError::InferenceFailed {
            error: format!("Inference worker failed: {}", e),
        })?
}

fn inference_error_response(e: InferenceError) -> Response<Body> {
    if e.is_client_error() {
        debug!("Rejected input: {}", e);
        return error_response(
            StatusCode::BAD_REQUEST,
            HttpErrorResponse::invalid_input(e.to_string()),
        );
    }
    error!("❌ Inference failed: {}", e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        HttpErrorResponse::internal_error(e.to_string()),
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, json_body) = match serde_json::to_string(body) {
        Ok(json) => (status, json),
        Err(e) => {
            error!("❌ Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Failed to serialize response"}"#.to_string(),
            )
        }
    };

    let mut response = Response::new(Body::from(json_body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Helper to create error responses
fn error_response(status: StatusCode, error: HttpErrorResponse) -> Response<Body> {
    json_response(status, &error)
}
