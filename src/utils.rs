use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;

use crate::error::AppError;

/// Header carrying the session-derived opaque client identifier.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

const MAX_CLIENT_ID_LEN: usize = 128;

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// A client id must be non-empty, bounded, and printable ASCII — it ends up
/// inside store keys, so anything else is rejected before touching state.
pub fn validate_client_id(client_id: &str) -> Result<(), AppError> {
    if client_id.is_empty()
        || client_id.len() > MAX_CLIENT_ID_LEN
        || !client_id.chars().all(|c| c.is_ascii_graphic())
    {
        return Err(AppError::InvalidClient);
    }
    Ok(())
}

pub fn client_id_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidClient)?;

    validate_client_id(client_id)?;
    Ok(client_id.to_string())
}
