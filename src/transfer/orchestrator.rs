//! Drives one `/imgupload` invocation from first prompt to final report.

use std::time::Duration;

use chrono::Local;
use tracing::{Span, error, info, warn};

use super::destination::{DestinationPlan, invocation_stamp};
use super::report::{FailedUpload, Failure, TransferReport, TransferSummary};
use super::session::{ChatSession, ImageSource, IncomingMessage, Uploader};
use crate::storage::is_valid_base_url;

/// Messages containing any of these end continuous mode.
pub const STOP_TOKENS: [char; 3] = ['$', '￥', '¥'];

/// Settings shared by every invocation.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub storage_url: String,
    pub base_path: String,
    pub share_url: Option<String>,
    pub send_notice: bool,
    pub send_wait: Duration,
    pub coiled_count: u32,
}

/// Per-invocation flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferOptions {
    pub folder: Option<String>,
    pub wait_ms: Option<u64>,
    pub gif: bool,
    pub continuous: bool,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub user_id: String,
    /// Free text after the flags; a URL here selects direct-link mode.
    pub argument: Option<String>,
    /// The command message itself, when it carries attachments.
    pub inline: Option<IncomingMessage>,
    /// The message the command replied to.
    pub quoted: Option<IncomingMessage>,
    pub options: TransferOptions,
    /// Shared by every filename of this invocation.
    pub stamp: String,
}

impl TransferRequest {
    pub fn new(user_id: impl Into<String>, options: TransferOptions) -> Self {
        Self {
            user_id: user_id.into(),
            argument: None,
            inline: None,
            quoted: None,
            options,
            stamp: invocation_stamp(Local::now()),
        }
    }
}

pub fn contains_stop_token(text: &str) -> bool {
    text.contains(STOP_TOKENS)
}

/// Trimmed URL if the argument is a direct http(s) link.
pub fn direct_link(argument: &str) -> Option<&str> {
    let trimmed = argument.trim();
    (trimmed.starts_with("http://") || trimmed.starts_with("https://")).then_some(trimmed)
}

pub struct Transfer<'a, U, S> {
    uploader: &'a U,
    session: &'a S,
    settings: &'a TransferSettings,
    span: Span,
}

impl<'a, U: Uploader + Sync, S: ChatSession + Sync> Transfer<'a, U, S> {
    pub fn new(uploader: &'a U, session: &'a S, settings: &'a TransferSettings) -> Self {
        Self { uploader, session, settings, span: Span::none() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn run(&self, request: TransferRequest) -> TransferReport {
        if !is_valid_base_url(&self.settings.storage_url) {
            error!(parent: &self.span, url = %self.settings.storage_url, "storage url failed shape check");
            return TransferReport::InvalidBackend;
        }

        let options = &request.options;
        let mut plan = DestinationPlan::new(
            &self.settings.base_path,
            options.folder.as_deref(),
            &request.user_id,
            &request.stamp,
            options.gif,
        );

        if let Some(url) = request.argument.as_deref().and_then(direct_link) {
            let failure = self.upload_one(&ImageSource::public(url), &mut plan).await.err();
            return TransferReport::RemoteLink { failure };
        }

        if request.inline.is_some() || request.quoted.is_some() {
            return self.run_single_shot(&request, &mut plan).await;
        }

        self.run_prompted(options, &mut plan).await
    }

    /// Images came with the command or its quote: one batch, no prompting.
    async fn run_single_shot(&self, request: &TransferRequest, plan: &mut DestinationPlan) -> TransferReport {
        let mut images = Vec::new();
        if let Some(message) = &request.inline {
            images = self.session.detect_images(message).await;
        }
        if images.is_empty()
            && let Some(quoted) = &request.quoted
        {
            images = self.session.detect_images(quoted).await;
        }

        if images.is_empty() {
            info!(parent: &self.span, "no images in command or quoted message");
            return TransferReport::NoImages { continuous: false };
        }
        TransferReport::Batch(self.upload_batch(&images, plan).await)
    }

    async fn run_prompted(&self, options: &TransferOptions, plan: &mut DestinationPlan) -> TransferReport {
        let continuous = options.continuous;
        let cap = self.settings.coiled_count.max(1);
        let rounds = if continuous { cap } else { 1 };
        let wait = options
            .wait_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.settings.send_wait);

        self.session.send(&prompt_text(continuous, cap)).await;

        let mut summary = TransferSummary::default();
        for round in 0..rounds {
            let Some(message) = self.session.await_next_message(wait).await else {
                info!(parent: &self.span, round, wait_ms = wait.as_millis() as u64, "timed out waiting for image");
                if summary.attempted() == 0 {
                    return TransferReport::NoImages { continuous };
                }
                break;
            };

            if continuous && contains_stop_token(&message.text) {
                info!(parent: &self.span, round, "stop token received");
                break;
            }

            let images = self.session.detect_images(&message).await;
            if images.is_empty() {
                info!(parent: &self.span, round, "message carried no images");
                if summary.attempted() == 0 {
                    return TransferReport::NoImages { continuous };
                }
                break;
            }

            let batch = self.upload_batch(&images, plan).await;
            if continuous && !batch.failed.is_empty() {
                self.session.send(&batch.failure_notice()).await;
            }
            summary.absorb(batch);
        }

        if continuous {
            TransferReport::Continuous(summary)
        } else {
            TransferReport::Batch(summary)
        }
    }

    /// Uploads every image in order. A failure never stops the rest.
    async fn upload_batch(&self, images: &[ImageSource], plan: &mut DestinationPlan) -> TransferSummary {
        let mut summary = TransferSummary::default();
        for image in images {
            match self.upload_one(image, plan).await {
                Ok(()) => summary.uploaded += 1,
                Err(failure) => summary.failed.push(FailedUpload { source: image.label.clone(), failure }),
            }
        }
        info!(
            parent: &self.span,
            uploaded = summary.uploaded,
            failed = summary.failed.len(),
            "batch finished"
        );
        summary
    }

    async fn upload_one(&self, image: &ImageSource, plan: &mut DestinationPlan) -> Result<(), Failure> {
        if self.settings.send_notice {
            self.session.send("Image upload starting...").await;
        }

        let destination = plan.next_path();
        match self.uploader.upload_remote_file(&image.url, &destination).await {
            Ok(Some(reply)) if reply.is_success() => {
                info!(parent: &self.span, source = %image.label, %destination, "image uploaded");
                Ok(())
            }
            Ok(Some(reply)) => {
                warn!(parent: &self.span, source = %image.label, code = reply.code, message = %reply.message, "image rejected by backend");
                Err(Failure::Rejected { code: reply.code, message: reply.message })
            }
            Ok(None) => {
                warn!(parent: &self.span, source = %image.label, "storage login rejected, image skipped");
                Err(Failure::Unauthenticated)
            }
            Err(e) => {
                error!(parent: &self.span, source = %image.label, error = %e, "image upload failed");
                Err(Failure::Transport(e.to_string()))
            }
        }
    }
}

fn prompt_text(continuous: bool, cap: u32) -> String {
    if continuous {
        format!("Please send images (continuous mode, up to {cap}, finish with $ or ￥)>>")
    } else {
        "Please send an image>>".to_string()
    }
}
