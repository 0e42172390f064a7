//! Capabilities the orchestrator borrows from its surroundings.

use std::future::Future;
use std::time::Duration;

use crate::storage::{BackendResponse, TransportError, UploadClient};

/// A chat message as the orchestrator sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingMessage {
    pub text: String,
    /// Framework handles for attached media, resolved by `detect_images`.
    pub attachments: Vec<String>,
}

impl IncomingMessage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachments: Vec::new() }
    }
}

/// A downloadable image plus the name users see in reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    pub url: String,
    pub label: String,
}

impl ImageSource {
    /// Source whose URL is safe to show in chat.
    pub fn public(url: impl Into<String>) -> Self {
        let url = url.into();
        Self { label: url.clone(), url }
    }
}

/// One user's conversation in one chat.
pub trait ChatSession {
    fn send(&self, text: &str) -> impl Future<Output = ()> + Send;

    /// Next message from the same user, or `None` once `timeout` elapses.
    fn await_next_message(&self, timeout: Duration) -> impl Future<Output = Option<IncomingMessage>> + Send;

    fn detect_images(&self, message: &IncomingMessage) -> impl Future<Output = Vec<ImageSource>> + Send;
}

/// Where images go. Implemented by [`UploadClient`].
pub trait Uploader {
    fn upload_remote_file(
        &self,
        source_url: &str,
        destination: &str,
    ) -> impl Future<Output = Result<Option<BackendResponse>, TransportError>> + Send;
}

impl Uploader for UploadClient {
    async fn upload_remote_file(
        &self,
        source_url: &str,
        destination: &str,
    ) -> Result<Option<BackendResponse>, TransportError> {
        UploadClient::upload_remote_file(self, source_url, destination).await
    }
}
