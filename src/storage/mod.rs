//! Storage backend client - login, mkdir and form upload over REST.

pub mod client;
pub mod error;

pub use client::{BackendResponse, Credentials, Token, UploadClient, http_client, is_valid_base_url};
pub use error::TransportError;
