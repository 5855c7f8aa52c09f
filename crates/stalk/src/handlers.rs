use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;
use crate::telemetry;

/// Callback used when the caller does not name one.
pub const DEFAULT_CALLBACK: &str = "callback";
const CALLBACK_PARAM: &str = "callback";
const MAX_CALLBACK_LEN: usize = 128;
const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";

/// Serves the cached snapshot wrapped in the requested callback. Never
/// touches the store.
pub async fn get_poll(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let callback = resolve_callback(callback_param(&params)).inspect_err(|_| {
        telemetry::increment_rejected_polls();
    })?;
    let body = wrap_payload(callback, &state.snapshots.payload_or_empty());
    telemetry::increment_polls();

    Ok((
        [
            (CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// First `callback` value in the query string; later repeats are ignored.
pub fn callback_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(name, _)| name == CALLBACK_PARAM)
        .map(|(_, value)| value.as_str())
}

pub fn resolve_callback(raw: Option<&str>) -> Result<&str, AppError> {
    match raw {
        None | Some("") => Ok(DEFAULT_CALLBACK),
        Some(name) => {
            validate_callback(name)?;
            Ok(name)
        }
    }
}

/// Accepts dotted JavaScript identifiers such as `jQuery1910_123` or
/// `app.stalk.render`.
pub fn validate_callback(name: &str) -> Result<(), AppError> {
    if name.len() > MAX_CALLBACK_LEN {
        return Err(AppError::InvalidCallback("name is too long"));
    }

    for segment in name.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if is_identifier_start(first) => {}
            Some(_) => {
                return Err(AppError::InvalidCallback(
                    "name must be a dotted JavaScript identifier",
                ));
            }
            None => return Err(AppError::InvalidCallback("name has an empty segment")),
        }
        if !chars.all(is_identifier_part) {
            return Err(AppError::InvalidCallback(
                "name must be a dotted JavaScript identifier",
            ));
        }
    }

    Ok(())
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}

pub fn wrap_payload(callback: &str, payload: &[u8]) -> Bytes {
    let mut body = Vec::with_capacity(callback.len() + payload.len() + 2);
    body.extend_from_slice(callback.as_bytes());
    body.push(b'(');
    body.extend_from_slice(payload);
    body.push(b')');
    Bytes::from(body)
}

pub async fn get_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
