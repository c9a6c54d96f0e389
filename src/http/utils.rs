//! Status classification and retry timing for the REST client.

use crate::error::StateError;
use std::time::Duration;

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Check if status code indicates access denied
pub fn is_access_denied_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Exponential backoff delay calculation
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Map a non-success status and its body to an error.
pub fn status_error(status: u16, body: String) -> StateError {
    match status {
        s if is_access_denied_status(s) => StateError::Forbidden(body),
        404 => StateError::NotFound(body),
        _ => StateError::Api {
            status,
            message: body,
        },
    }
}
