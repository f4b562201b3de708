//! HTTP request handlers.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use super::augment::augment_request;
use super::server::AppState;
use super::stream::streaming_response;
use crate::error::Error;
use crate::scrub::scrub_text;

/// Handle POST /v1/chat/completions
///
/// The body is taken as raw JSON so fields this proxy does not care about
/// reach the upstream unmodified.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Response, Error> {
    let request_id = Uuid::new_v4();

    if !body.is_object() {
        return Err(Error::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    }

    let requested_model = body
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string);
    let is_streaming = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let upstream_model = augment_request(&mut body, &state.models);

    tracing::info!(
        request_id = %request_id,
        model = ?requested_model,
        upstream_model = ?upstream_model,
        stream = is_streaming,
        "Received chat completion request"
    );

    let url = format!(
        "{}/chat/completions",
        state.config.upstream.url.trim_end_matches('/')
    );

    let upstream_response = state
        .http_client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", state.config.upstream.api_key.expose_secret()),
        )
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Failed to reach upstream");
            Error::Transport(e)
        })?;

    let status = upstream_response.status();
    if !status.is_success() {
        let detail = upstream_response.text().await.unwrap_or_default();
        tracing::error!(
            request_id = %request_id,
            status = %status,
            body = %detail,
            "Upstream returned error"
        );
        return Err(Error::UpstreamStatus {
            status: status.as_u16(),
        });
    }

    if is_streaming {
        Ok(streaming_response(
            upstream_response,
            state.config.upstream.heartbeat(),
        ))
    } else {
        buffered_response(upstream_response).await
    }
}

/// Handle a fully buffered (non-streaming) upstream response.
///
/// Applies the whole-string scrub to every choice's message content and
/// returns the body otherwise unchanged.
async fn buffered_response(upstream_response: reqwest::Response) -> Result<Response, Error> {
    let mut body: Value = upstream_response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse upstream response body");
        Error::Transport(e)
    })?;

    if let Some(choices) = body.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            if let Some(content) = choice
                .get_mut("message")
                .and_then(|m| m.get_mut("content"))
            {
                if let Some(text) = content.as_str() {
                    *content = Value::String(scrub_text(text));
                }
            }
        }
    }

    Ok(Json(body).into_response())
}

/// Handle GET /v1/models - list the client-facing mapping keys
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<Value> = state
        .models
        .client_models()
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": "thinkgate",
            })
        })
        .collect();

    Json(serde_json::json!({
        "object": "list",
        "data": models
    }))
}

/// Handle GET / - plain-text liveness line
pub async fn root() -> &'static str {
    "Proxy Running!"
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "thinkgate"
    }))
}
