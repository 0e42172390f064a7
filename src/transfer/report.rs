//! Outcomes of a transfer and their user-facing text.

use std::fmt;

const NOT_SHARED: &str = "images are not publicly shared";

/// Why a single image didn't make it.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Backend answered with a non-success envelope code.
    Rejected { code: i64, message: String },
    /// Backend refused the login, nothing was uploaded.
    Unauthenticated,
    /// Fetch or upload broke before the backend could answer.
    Transport(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { code, message } => write!(f, "{code} | {message}"),
            Self::Unauthenticated => write!(f, "storage login rejected"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedUpload {
    /// Label of the source, never the raw URL of a private file.
    pub source: String,
    pub failure: Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    PartialFailure,
    Failure,
}

/// Per-image bookkeeping for one or more batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferSummary {
    pub uploaded: usize,
    pub failed: Vec<FailedUpload>,
}

impl TransferSummary {
    pub fn attempted(&self) -> usize {
        self.uploaded + self.failed.len()
    }

    pub fn outcome(&self) -> Outcome {
        match (self.uploaded, self.failed.len()) {
            (_, 0) => Outcome::Success,
            (0, _) => Outcome::Failure,
            _ => Outcome::PartialFailure,
        }
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.source.as_str()).collect()
    }

    pub fn absorb(&mut self, other: TransferSummary) {
        self.uploaded += other.uploaded;
        self.failed.extend(other.failed);
    }

    /// Notice sent after a batch with failures.
    pub fn failure_notice(&self) -> String {
        format!("Image upload failed: {}, please check the log", self.failed_sources().join(", "))
    }
}

/// Final result of one command invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferReport {
    /// Storage URL failed the shape check; nothing was attempted.
    InvalidBackend,
    /// Direct-link upload. `None` means it succeeded.
    RemoteLink { failure: Option<Failure> },
    /// Nothing to upload, or the wait for an image timed out.
    NoImages { continuous: bool },
    /// Single-shot batch from one message or quote.
    Batch(TransferSummary),
    /// Continuous mode ended by stop token, timeout or cap.
    Continuous(TransferSummary),
}

impl TransferReport {
    pub fn render(&self, share_url: Option<&str>) -> String {
        let share = share_url.unwrap_or(NOT_SHARED);
        match self {
            Self::InvalidBackend => "Storage address is misconfigured, please contact the administrator.".to_string(),
            Self::RemoteLink { failure: None } => {
                format!("Image from remote url uploaded! Share link: {share}")
            }
            Self::RemoteLink { failure: Some(Failure::Transport(_)) } => {
                "Remote url image upload failed, please check that the url is reachable!".to_string()
            }
            Self::RemoteLink { failure: Some(failure) } => format!("Image upload failed! {failure}"),
            Self::NoImages { continuous } => {
                let mut text = "No image detected or input timed out...".to_string();
                if *continuous {
                    text.push_str(" Continuous mode exited.");
                }
                text
            }
            Self::Batch(summary) => match summary.outcome() {
                Outcome::Success => format!("All images uploaded, share link: {share}"),
                Outcome::PartialFailure | Outcome::Failure => summary.failure_notice(),
            },
            Self::Continuous(summary) => match summary.outcome() {
                Outcome::Success => {
                    format!("Continuous mode exited, all images uploaded! Share link: {share}")
                }
                Outcome::PartialFailure | Outcome::Failure => format!(
                    "Continuous mode exited, {} uploaded, {} failed: {}",
                    summary.uploaded,
                    summary.failed.len(),
                    summary.failed_sources().join(", ")
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(source: &str) -> FailedUpload {
        FailedUpload {
            source: source.to_string(),
            failure: Failure::Transport("HTTP error".to_string()),
        }
    }

    #[test]
    fn test_outcome_classification() {
        let mut summary = TransferSummary::default();
        assert_eq!(summary.outcome(), Outcome::Success);

        summary.failed.push(failed("a"));
        assert_eq!(summary.outcome(), Outcome::Failure);

        summary.uploaded = 2;
        assert_eq!(summary.outcome(), Outcome::PartialFailure);
        assert_eq!(summary.attempted(), 3);
    }

    #[test]
    fn test_absorb_merges_batches() {
        let mut total = TransferSummary { uploaded: 1, failed: vec![failed("a")] };
        total.absorb(TransferSummary { uploaded: 2, failed: vec![failed("b")] });
        assert_eq!(total.uploaded, 3);
        assert_eq!(total.failed_sources(), vec!["a", "b"]);
    }

    #[test]
    fn test_render_uses_share_url_or_fallback() {
        let report = TransferReport::Batch(TransferSummary { uploaded: 2, failed: vec![] });
        assert_eq!(report.render(Some("http://img.example")), "All images uploaded, share link: http://img.example");
        assert!(report.render(None).contains(NOT_SHARED));
    }

    #[test]
    fn test_render_lists_failed_sources() {
        let report = TransferReport::Batch(TransferSummary { uploaded: 1, failed: vec![failed("photo 2")] });
        assert_eq!(report.render(None), "Image upload failed: photo 2, please check the log");
    }

    #[test]
    fn test_render_remote_link_rejection() {
        let report = TransferReport::RemoteLink {
            failure: Some(Failure::Rejected { code: 403, message: "no permission".to_string() }),
        };
        assert_eq!(report.render(None), "Image upload failed! 403 | no permission");
    }

    #[test]
    fn test_render_remote_link_transport_hides_detail() {
        let report = TransferReport::RemoteLink {
            failure: Some(Failure::Transport("source fetch failed: HTTP 404 Not Found".to_string())),
        };
        let text = report.render(None);
        assert!(text.contains("reachable"));
        assert!(!text.contains("404"));
    }

    #[test]
    fn test_render_no_images() {
        assert_eq!(
            TransferReport::NoImages { continuous: true }.render(None),
            "No image detected or input timed out... Continuous mode exited."
        );
        assert_eq!(
            TransferReport::NoImages { continuous: false }.render(None),
            "No image detected or input timed out..."
        );
    }

    #[test]
    fn test_render_continuous_with_failures() {
        let report = TransferReport::Continuous(TransferSummary { uploaded: 3, failed: vec![failed("x")] });
        assert_eq!(report.render(None), "Continuous mode exited, 3 uploaded, 1 failed: x");
    }
}
