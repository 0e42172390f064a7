//! Forwards WARN and ERROR events to an admin chat.
//!
//! Failed uploads tell the user to "check the log"; this is that log for
//! admins who aren't watching the server. Events are batched so a failing
//! continuous-mode run produces one message instead of ten.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram's message limit is 4096; leave room for the ellipsis.
const MAX_MESSAGE_CHARS: usize = 4000;
/// Events arriving within this window go out together.
const BATCH_WINDOW: Duration = Duration::from_secs(3);

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                let deadline = tokio::time::sleep(BATCH_WINDOW);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = rx.recv() => match next {
                            Some(line) => batch.push(line),
                            None => break,
                        },
                    }
                }
                send_log(&bot, chat_id, &batch.join("\n")).await;
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let cut: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        // Can't use tracing here, it would loop back into this layer.
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

/// Collects `message` first, then the remaining fields as `key=value`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl LineVisitor {
    fn into_line(self, level: Level) -> String {
        let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
        if self.fields.is_empty() {
            format!("{prefix} {}", self.message)
        } else {
            format!("{prefix} {} ({})", self.message, self.fields.join(", "))
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }
        // teloxide's own warnings would echo every failed send back here.
        if event.metadata().target().starts_with("teloxide") {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        if self.tx.send(visitor.into_line(level)).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
