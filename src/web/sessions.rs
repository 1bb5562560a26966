use super::*;

use crate::session::SessionSnapshot;

#[derive(Debug, Deserialize)]
pub(super) struct UpdateSessionRequest {
    model: Option<String>,
    system: Option<String>,
    remember: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionResponse {
    session_key: String,
    #[serde(flatten)]
    session: SessionSnapshot,
}

pub(super) async fn api_get_session(
    State(state): State<WebState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Json<SessionResponse> {
    let session_key = session_key_from(&headers, query.session.as_deref());
    let session = state.app_state.sessions.session_for(&session_key).await;
    let snapshot = session.lock().await.snapshot();
    Json(SessionResponse {
        session_key,
        session: snapshot,
    })
}

pub(super) async fn api_update_session(
    State(state): State<WebState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(body): Json<UpdateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_key = session_key_from(&headers, query.session.as_deref());

    if let Some(model) = &body.model {
        if model.trim().is_empty() {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "model must not be empty",
            ));
        }
    }

    let session = state.app_state.sessions.session_for(&session_key).await;
    let mut session = session.lock().await;
    if let Some(model) = body.model {
        session.set_model(model.trim());
    }
    if let Some(system) = body.system {
        session.set_system(system);
    }
    if let Some(remember) = body.remember {
        session.set_remember(remember);
    }

    info!(
        target: "web",
        endpoint = "/api/session",
        session_key = %session_key,
        model = %session.model(),
        remember = session.remember(),
        "Session updated"
    );
    Ok(Json(SessionResponse {
        session_key,
        session: session.snapshot(),
    }))
}
