use crate::gateway::{MalformedResponse, RequestError, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// User-visible, non-fatal notice published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAlert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub technical_error: String, // Raw technical error for logging
    pub auto_dismiss_ms: u64,
}

static ALERT_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_alert_id(prefix: &str) -> String {
    format!("{}_{}", prefix, ALERT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

impl ErrorAlert {
    pub fn new_transport_error(request: &str, error: &TransportError) -> Self {
        let technical = error.to_string();
        Self {
            id: next_alert_id("transport_error"),
            title: "Data Request Failed".to_string(),
            message: format!("{}: {}", request, make_error_user_friendly(&technical)),
            technical_error: format!("{} request failed: {}", request, technical),
            auto_dismiss_ms: 5000,
        }
    }

    pub fn new_malformed_response(request: &str, error: &MalformedResponse) -> Self {
        Self {
            id: next_alert_id("malformed_response"),
            title: "Invalid Data Received".to_string(),
            message: format!(
                "{}: the server returned activations that do not line up with their words. The view was left unchanged.",
                request
            ),
            technical_error: format!("{} response rejected: {}", request, error),
            auto_dismiss_ms: 8000,
        }
    }

    pub fn from_request_error(request: &str, error: &RequestError) -> Self {
        match error {
            RequestError::Transport(error) => Self::new_transport_error(request, error),
            RequestError::Malformed(error) => Self::new_malformed_response(request, error),
        }
    }
}

pub fn make_error_user_friendly(error: &str) -> String {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timed out") || error_lower.contains("timeout") {
        "Operation timed out. Please try again.".to_string()
    } else if error_lower.contains("unreachable")
        || error_lower.contains("connection")
        || error_lower.contains("network")
    {
        "Connection error. Please check that the analysis server is running.".to_string()
    } else if error_lower.contains("not supported") || error_lower.contains("unsupported") {
        "This operation is not available for the current data source.".to_string()
    } else {
        // Keep original error but make it more presentable
        error.trim().to_string()
    }
}

/// Log an alert without surfacing it to the views.
pub fn log_error_only(alert: &ErrorAlert) {
    log::warn!("{}", alert.technical_error);
}
