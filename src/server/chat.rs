use axum::{
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;

/// Query parameters for the chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    /// User message.
    pub prompt: String,
}

/// GET /api/chat?prompt=... - Stream the reply as plain text.
///
/// The body is the generated text, chunk by chunk, with no framing. A
/// generator failure after the first chunk aborts the body, which the client
/// sees as a read error.
pub async fn api_chat(State(state): State<AppState>, Query(query): Query<ChatQuery>) -> Response {
    info!(
        name: "chat.request.received",
        prompt_len = query.prompt.len(),
        backend = state.queue.backend(),
        "Received chat request"
    );

    let tokens = match state.queue.submit(query.prompt) {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "Chat request refused");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let body = tokens.map(|token| token.map(Bytes::from));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}
