use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tablebell_agent::AgentRuntime;
use tablebell_core::{InterfaceError, TurnRequest, TurnResponse};
use tracing::warn;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct TurnState {
    runtime: AgentRuntime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new().route("/v1/turn", post(handle_turn)).with_state(TurnState { runtime })
}

/// One caller utterance in, one reply out. Every parsed request gets a 200:
/// dependency failures are replies, not HTTP errors.
pub async fn handle_turn(
    State(state): State<TurnState>,
    headers: HeaderMap,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, InterfaceErrorResponse> {
    let correlation_id = correlation_id(&headers);

    let Json(request) = payload.map_err(|rejection| {
        warn!(
            event_name = "api.turn.rejected",
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "malformed turn request"
        );
        InterfaceErrorResponse(InterfaceError::BadRequest {
            message: rejection.body_text(),
            correlation_id: correlation_id.clone(),
        })
    })?;

    if let Some(field) = blank_required_field(&request) {
        return Err(InterfaceErrorResponse(InterfaceError::BadRequest {
            message: format!("`{field}` must not be empty"),
            correlation_id,
        }));
    }

    Ok(Json(state.runtime.handle_turn(request, &correlation_id).await))
}

fn blank_required_field(request: &TurnRequest) -> Option<&'static str> {
    if request.caller_phone.trim().is_empty() {
        Some("caller_phone")
    } else if request.account_id.trim().is_empty() {
        Some("account_id")
    } else {
        None
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Debug)]
pub struct InterfaceErrorResponse(pub InterfaceError);

impl IntoResponse for InterfaceErrorResponse {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let detail = match &self.0 {
            InterfaceError::BadRequest { message, .. } => message.clone(),
            other => other.user_message().to_string(),
        };
        let body = ApiError {
            error,
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
