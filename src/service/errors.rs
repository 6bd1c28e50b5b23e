//! Turning error responses into [`Error`]s

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

/// What was being attempted when a request failed. It picks the wording of generic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Insertion,
    Update,
    Deletion,
    Download,
    Upload,
    Authentication,
    Batch,
}

impl OperationType {
    fn describe(&self) -> &'static str {
        match self {
            OperationType::Query => "querying",
            OperationType::Insertion => "inserting an entry",
            OperationType::Update => "updating an entry",
            OperationType::Deletion => "deleting an entry",
            OperationType::Download => "downloading",
            OperationType::Upload => "uploading",
            OperationType::Authentication => "authenticating",
            OperationType::Batch => "running a batch operation",
        }
    }
}

/// Classifies a non-success response from its status code alone.
///
/// The body is quoted in the message, or the reason phrase when the body is empty.
pub fn status_error(operation: OperationType, status: u16, reason_phrase: &str, body: &str) -> Error {
    let details = if body.trim().is_empty() { reason_phrase } else { body };

    match status {
        400 => Error::new(ErrorKind::Protocol,
            format!("Invalid request URI or header, or unsupported nonstandard parameter: {}", details)),
        401 | 403 => Error::new(ErrorKind::AuthenticationRequired, format!("Authentication required: {}", details)),
        404 => Error::new(ErrorKind::NotFound, format!("The requested resource was not found: {}", details)),
        409 | 412 => Error::new(ErrorKind::Conflict, format!("The entry has been modified since it was downloaded: {}", details)),
        500..=599 => Error::new(ErrorKind::Unavailable, format!("Error code {} when {}: {}", status, operation.describe(), details)),
        _ => {
            let kind = match operation {
                OperationType::Batch => ErrorKind::BatchFailed,
                _ => ErrorKind::Protocol,
            };
            Error::new(kind, format!("Error code {} when {}: {}", status, operation.describe(), details))
        },
    }
}


#[derive(Debug, Deserialize)]
struct Envelope {
    error: EnvelopeError,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    errors: Vec<EnvelopeItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeItem {
    domain: Option<String>,
    reason: Option<String>,
    message: Option<String>,
    extended_help: Option<String>,
    location_type: Option<String>,
    location: Option<String>,
}

/// Classifies an error response from a JSON service.
///
/// The body is expected to be `{"error": {"errors": [{"domain": ..., "reason": ..., "message": ...}, ...]}}`.
/// Only the first item decides the error. Bodies that do not have this shape, and reasons that are
/// not known, are classified by [`status_error`].
pub fn json_envelope_error(operation: OperationType, status: u16, reason_phrase: &str, body: &str) -> Error {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(_) => return status_error(operation, status, reason_phrase, body),
    };

    let mut items = envelope.error.errors.into_iter();
    let first = match items.next() {
        None => return status_error(operation, status, reason_phrase, body),
        Some(item) => item,
    };
    for other in items {
        log::debug!("Error message received in response: domain ‘{:?}’, reason ‘{:?}’, extended help ‘{:?}’, message ‘{:?}’, location type ‘{:?}’, location ‘{:?}’.",
            other.domain, other.reason, other.extended_help, other.message, other.location_type, other.location);
    }

    let domain = first.domain.as_deref().unwrap_or("");
    let reason = first.reason.as_deref().unwrap_or("");
    let error = match (domain, reason) {
        ("usageLimits", "dailyLimitExceededUnreg") | ("usageLimits", "rateLimitExceeded") | ("global", "rateLimitExceeded") => {
            Error::new(ErrorKind::QuotaExceeded, "You have made too many API calls recently. Please wait a few minutes and try again.")
        },
        ("usageLimits", "accessNotConfigured") => {
            Error::new(ErrorKind::Unavailable, format!("The service is not enabled for this application: {}", first.message.as_deref().unwrap_or(reason)))
        },
        ("global", "notFound") => {
            Error::new(ErrorKind::NotFound, format!("The requested resource was not found: {}", first.message.as_deref().unwrap_or(reason)))
        },
        ("global", "required") | ("global", "conditionNotMet") | ("global", "invalid") => {
            Error::new(ErrorKind::Protocol, format!("Invalid request URI or header, or unsupported nonstandard parameter: {}", first.message.as_deref().unwrap_or(reason)))
        },
        ("global", "authError") => {
            Error::new(ErrorKind::AuthenticationRequired, "You must be authenticated to do this.")
        },
        ("global", "forbidden") => {
            Error::new(ErrorKind::Forbidden, "Access was denied by the user or server.")
        },
        _ => {
            log::warn!("Unknown error code ‘{}’ in domain ‘{}’ received with location type ‘{:?}’, location ‘{:?}’, extended help ‘{:?}’ and message ‘{:?}’.",
                reason, domain, first.location_type, first.location, first.extended_help, first.message);
            status_error(operation, status, reason_phrase, body)
        },
    };

    error.with_server_details(first.reason, first.message)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let err = status_error(OperationType::Update, 412, "Precondition Failed", "");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.message(), "The entry has been modified since it was downloaded: Precondition Failed");

        let err = status_error(OperationType::Deletion, 418, "I'm a teapot", "short and stout");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.message(), "Error code 418 when deleting an entry: short and stout");

        assert_eq!(status_error(OperationType::Query, 503, "Service Unavailable", "").kind(), ErrorKind::Unavailable);
        assert_eq!(status_error(OperationType::Batch, 302, "Found", "").kind(), ErrorKind::BatchFailed);
        assert_eq!(status_error(OperationType::Query, 403, "Forbidden", "").kind(), ErrorKind::AuthenticationRequired);
    }

    #[test]
    fn envelopes() {
        let body = r#"{"error": {"code": 403, "message": "Daily Limit Exceeded",
            "errors": [{"domain": "usageLimits", "reason": "dailyLimitExceededUnreg", "message": "Daily Limit Exceeded"},
                       {"domain": "global", "reason": "other"}]}}"#;
        let err = json_envelope_error(OperationType::Query, 403, "Forbidden", body);
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(err.reason(), Some("dailyLimitExceededUnreg"));
        assert_eq!(err.server_message(), Some("Daily Limit Exceeded"));

        let body = r#"{"error": {"errors": [{"domain": "global", "reason": "authError", "message": "Invalid Credentials"}]}}"#;
        assert_eq!(json_envelope_error(OperationType::Query, 401, "Unauthorized", body).kind(), ErrorKind::AuthenticationRequired);

        let body = r#"{"error": {"errors": [{"domain": "global", "reason": "somethingNew"}]}}"#;
        let err = json_envelope_error(OperationType::Update, 409, "Conflict", body);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.reason(), Some("somethingNew"));

        let err = json_envelope_error(OperationType::Query, 404, "Not Found", "<html>nope</html>");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.reason().is_none());
    }
}
