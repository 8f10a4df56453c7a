use crate::http::types::{HttpError, HttpResult, HttpSuccess};
use crate::http::HttpState;
use crate::line::signature::{verify_signature, SIGNATURE_HEADER};
use crate::line::types::WebhookPayload;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::{debug, warn};

/// LINE webhook delivery. Events are only decoded once the body signature has
/// been verified, and the acknowledgement is sent after all of them are handled.
pub async fn callback(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, HttpError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or_else(|| {
            warn!("Rejecting webhook without {SIGNATURE_HEADER} header");
            HttpError::bad_request("Missing signature header")
        })?
        .to_str()
        .map_err(|_| HttpError::bad_request("Invalid signature header"))?;

    debug!("Request body: {}", String::from_utf8_lossy(&body));
    if !verify_signature(&state.channel_secret, &body, signature) {
        warn!("Rejecting webhook with invalid signature");
        return Err(HttpError::bad_request("Invalid signature"));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejecting malformed webhook body: {e}");
        HttpError::bad_request(format!("Malformed webhook body: {e}"))
    })?;

    debug!(
        "Received {} event(s) for destination {:?}",
        payload.events.len(),
        payload.destination
    );
    state.dispatcher.dispatch_all(payload.events).await;
    Ok("OK")
}

pub async fn sys_version() -> HttpResult<String> {
    Ok(HttpSuccess(crate::VERSION.to_string()))
}
