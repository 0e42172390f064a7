//! Telegram bot that forwards chat images to a self-hosted file storage.

pub mod config;
pub mod storage;
pub mod telegram;
pub mod telegram_log;
pub mod transfer;
