use std::fmt;

use reqwest::StatusCode;

/// Max chars of a response body kept in error messages.
const MAX_BODY_PREVIEW: usize = 200;

/// Hard failures at the storage boundary.
///
/// A backend that answers but refuses (envelope `code != 200`) is not an
/// error; those calls return `None` or `false` instead.
#[derive(Debug)]
pub enum TransportError {
    /// The request could not be sent or its body could not be read.
    Http(reqwest::Error),
    /// Fetching the source image failed. URLs are stripped because Telegram
    /// file links embed the bot token.
    Fetch {
        status: Option<StatusCode>,
        source: Option<reqwest::Error>,
    },
    /// The backend answered with a non-success HTTP status.
    Status { status: StatusCode, body: String },
    /// The backend body was not the JSON we expected.
    Decode(serde_json::Error),
    /// A local file could not be opened or inspected.
    Io(std::io::Error),
}

impl TransportError {
    pub(crate) fn fetch_status(status: StatusCode) -> Self {
        Self::Fetch { status: Some(status), source: None }
    }

    pub(crate) fn fetch_failed(source: reqwest::Error) -> Self {
        Self::Fetch { status: source.status(), source: Some(source.without_url()) }
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_PREVIEW {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_BODY_PREVIEW).collect();
        format!("{cut}...")
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Fetch { status: Some(status), .. } => write!(f, "source fetch failed: HTTP {status}"),
            Self::Fetch { source: Some(e), .. } => write!(f, "source fetch failed: {e}"),
            Self::Fetch { .. } => write!(f, "source fetch failed"),
            Self::Status { status, body } => write!(f, "backend returned {status}: {}", preview(body)),
            Self::Decode(e) => write!(f, "malformed backend response: {e}"),
            Self::Io(e) => write!(f, "local file error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Fetch { source: Some(e), .. } => Some(e),
            Self::Fetch { .. } | Self::Status { .. } => None,
            Self::Decode(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_status_display() {
        let err = TransportError::fetch_status(StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "source fetch failed: HTTP 404 Not Found");
    }

    #[test]
    fn test_status_body_is_truncated() {
        let err = TransportError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "x".repeat(500),
        };
        let text = err.to_string();
        assert!(text.starts_with("backend returned 502 Bad Gateway: "));
        assert!(text.ends_with("..."));
        assert!(text.matches('x').count() <= MAX_BODY_PREVIEW);
    }

    #[test]
    fn test_io_has_source() {
        use std::error::Error;
        let err = TransportError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }
}
