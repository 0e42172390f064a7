//! `ChatSession` over one Telegram chat and user.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{info, warn};

use super::prompt::{PromptInbox, PromptKey, PromptRegistry};
use crate::transfer::{ChatSession, ImageSource, IncomingMessage};

pub struct TelegramSession {
    bot: Bot,
    chat_id: ChatId,
    user_id: UserId,
    prompts: Arc<PromptRegistry>,
    /// Opened on the first prompt and kept until the session ends.
    inbox: OnceLock<PromptInbox>,
}

impl TelegramSession {
    pub fn new(bot: Bot, chat_id: ChatId, user_id: UserId, prompts: Arc<PromptRegistry>) -> Self {
        Self { bot, chat_id, user_id, prompts, inbox: OnceLock::new() }
    }

    fn key(&self) -> PromptKey {
        (self.chat_id.0, self.user_id.0 as i64)
    }

    /// Bot API download URL. Contains the bot token, so it never goes to chat.
    fn file_url(&self, file_path: &str) -> String {
        let api_url = self.bot.api_url();
        format!(
            "{}/file/bot{}/{}",
            api_url.as_str().trim_end_matches('/'),
            self.bot.token(),
            file_path
        )
    }
}

impl ChatSession for TelegramSession {
    async fn send(&self, text: &str) {
        if let Err(e) = self.bot.send_message(self.chat_id, text).await {
            warn!("Failed to send to chat {}: {e}", self.chat_id);
        }
    }

    async fn await_next_message(&self, timeout: Duration) -> Option<IncomingMessage> {
        let inbox = self.inbox.get_or_init(|| self.prompts.open(self.key()));
        inbox.next(timeout).await
    }

    async fn detect_images(&self, message: &IncomingMessage) -> Vec<ImageSource> {
        let mut images = Vec::with_capacity(message.attachments.len());
        for file_id in &message.attachments {
            match self.bot.get_file(FileId(file_id.clone())).await {
                Ok(file) => images.push(ImageSource {
                    url: self.file_url(&file.path),
                    label: file.path.clone(),
                }),
                Err(e) => warn!("Failed to resolve attachment in chat {}: {e}", self.chat_id),
            }
        }
        info!("📷 Detected {} image(s) in chat {}", images.len(), self.chat_id);
        images
    }
}

/// Strip a Telegram message down to text and image file ids.
pub fn incoming_message(msg: &Message) -> IncomingMessage {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();
    IncomingMessage { text, attachments: image_file_ids(msg) }
}

/// The message `msg` replies to, unless that is just its forum topic's root.
///
/// Every message in a forum topic carries the topic's creation message as its
/// reply target, which must not count as quoting a picture.
pub fn quoted_message(msg: &Message) -> Option<&Message> {
    let reply = msg.reply_to_message()?;
    let is_topic_root = msg.is_topic_message
        && reply.forum_topic_created().is_some()
        && msg.thread_id.is_some_and(|thread| thread.0 == reply.id);
    (!is_topic_root).then_some(reply)
}

/// Largest photo size, image documents, and animations.
fn image_file_ids(msg: &Message) -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        ids.push(largest.file.id.0.clone());
    }

    if let Some(doc) = msg.document()
        && doc.mime_type.as_ref().is_some_and(|m| m.essence_str().starts_with("image/"))
    {
        ids.push(doc.file.id.0.clone());
    }

    if let Some(animation) = msg.animation() {
        ids.push(animation.file.id.0.clone());
    }

    ids
}
