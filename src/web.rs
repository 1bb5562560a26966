use std::sync::Arc;
use std::time::Instant;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::llm_types::Message;
use crate::runtime::AppState;
use crate::session::normalize_session_key;
use crate::upload::TransientFile;

mod sessions;

static WEB_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/web");

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
struct WebState {
    app_state: Arc<AppState>,
}

/// JSON error envelope: `{"error": "..."}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError::new(status, format!("An error occurred: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session: Option<String>,
}

/// `/whisper` query: session key plus an optional one-call model override.
#[derive(Debug, Deserialize)]
struct WhisperQuery {
    session: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhisperResponse {
    pub transcription: String,
    pub response: String,
}

struct UploadedAudio {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Header wins over the `session` query parameter; both fall back to "main".
fn session_key_from(headers: &HeaderMap, query_session: Option<&str>) -> String {
    let header = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    normalize_session_key(header.or(query_session))
}

async fn index() -> impl IntoResponse {
    match WEB_ASSETS.get_file("recorder.html") {
        Some(file) => Html(String::from_utf8_lossy(file.contents()).to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "recorder.html missing").into_response(),
    }
}

async fn api_health(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.app_state.config.model,
        "sessions": state.app_state.sessions.len().await,
    }))
}

async fn api_models(
    State(state): State<WebState>,
) -> Result<Json<crate::llm_types::ModelList>, ApiError> {
    let models = state.app_state.llm.list_models().await.map_err(|e| {
        error!(target: "web", "Error listing models: {e}");
        ApiError::from(e)
    })?;
    Ok(Json(models))
}

/// Keeps the status axum assigns (413 when the body limit trips) and gives
/// the size-limit case a message that names the limit.
fn upload_error(e: MultipartError, max_upload_mb: usize) -> ApiError {
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            status,
            format!("Upload too large: limit is {max_upload_mb} MB"),
        );
    }
    let status = if status.is_server_error() {
        StatusCode::BAD_REQUEST
    } else {
        status
    };
    ApiError::new(status, format!("Invalid upload: {}", e.body_text()))
}

/// First file field named `audio`; plain text fields of that name don't count.
async fn read_audio_field(
    mut multipart: Multipart,
    max_upload_mb: usize,
) -> Result<Option<UploadedAudio>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_upload_mb))?
    {
        if field.name() != Some("audio") || field.file_name().is_none() {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(e, max_upload_mb))?;
        return Ok(Some(UploadedAudio {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// Writes the upload to a transient file, transcribes it, and removes the
/// file before returning.
async fn transcribe_upload(state: &WebState, audio: &UploadedAudio) -> Result<String, RelayError> {
    let transient = TransientFile::write(
        &state.app_state.config.upload_dir_path(),
        audio.file_name.as_deref(),
        audio.content_type.as_deref(),
        &audio.bytes,
    )
    .await?;
    let clip = transient.read_clip().await?;
    state.app_state.transcriber.transcribe(Some(clip)).await
}

async fn process_whisper(
    state: &WebState,
    session_key: &str,
    model: Option<&str>,
    audio: UploadedAudio,
) -> Result<WhisperResponse, RelayError> {
    let transcription = transcribe_upload(state, &audio).await?;

    let session = state.app_state.sessions.session_for(session_key).await;
    let mut session = session.lock().await;
    let response = session
        .submit_with_model(
            state.app_state.llm.as_ref(),
            model,
            vec![Message::user(transcription.clone())],
        )
        .await?;

    Ok(WhisperResponse {
        transcription,
        response,
    })
}

async fn api_whisper(
    State(state): State<WebState>,
    headers: HeaderMap,
    Query(query): Query<WhisperQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<WhisperResponse>, ApiError> {
    let start = Instant::now();
    let session_key = session_key_from(&headers, query.session.as_deref());
    let model = query
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    let audio = match multipart {
        Ok(multipart) => {
            read_audio_field(multipart, state.app_state.config.max_upload_mb).await?
        }
        Err(rejection) => {
            warn!(target: "web", "Rejected /whisper body: {rejection}");
            None
        }
    };
    let Some(audio) = audio else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file uploaded"));
    };

    let bytes = audio.bytes.len();
    let result = process_whisper(&state, &session_key, model, audio).await;
    info!(
        target: "web",
        endpoint = "/whisper",
        session_key = %session_key,
        bytes,
        ok = result.is_ok(),
        latency_ms = start.elapsed().as_millis(),
        "Completed request"
    );

    match result {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            error!(target: "web", "Error processing transcription: {e}");
            Err(e.into())
        }
    }
}

fn build_router(web_state: WebState) -> Router {
    let body_limit = web_state.app_state.config.max_upload_bytes();
    Router::new()
        .route("/", get(index))
        .route("/whisper", post(api_whisper))
        .route("/api/health", get(api_health))
        .route("/api/models", get(api_models))
        .route(
            "/api/session",
            get(sessions::api_get_session).post(sessions::api_update_session),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(web_state)
}

pub async fn start_web_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.web_addr();
    let router = build_router(WebState { app_state: state });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind web server at {addr}: {e}"))?;

    info!("Server is running on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
