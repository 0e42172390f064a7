//! HTTP client for the storage backend's login, mkdir and form-upload endpoints.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, warn};

use super::error::TransportError;

const LOGIN_PATH: &str = "/api/auth/login";
const MKDIR_PATH: &str = "/api/fs/mkdir";
const FORM_PATH: &str = "/api/fs/form";

/// Envelope code the backend uses for success.
const SUCCESS_CODE: i64 = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static BASE_URL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://((?:[A-Za-z0-9_-]+\.)*(?:[a-z]+\d*|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}))(?::\d{2,5})?/?.*",
    )
    .expect("base url pattern is valid")
});

/// Cheap shape check on the configured backend URL, run before any request.
pub fn is_valid_base_url(url: &str) -> bool {
    BASE_URL_SHAPE.is_match(url)
}

/// Login credentials. Never printed.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub otp_code: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, otp_code: Option<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            otp_code: otp_code.filter(|c| !c.is_empty()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("otp_code", &self.otp_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A login token, good for one privileged call.
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Decoded backend reply. Only `code` and `message` are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    otp_code: Option<&'a str>,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Deserialize)]
struct LoginData {
    #[serde(default)]
    token: String,
}

#[derive(Serialize)]
struct MkdirRequest<'a> {
    path: &'a str,
}

/// HTTP transport with the request timeout every backend call expects.
/// Build one and share it through [`UploadClient::with_http`].
pub fn http_client() -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(TransportError::Http)
}

/// Client for one set of credentials.
///
/// Every privileged call logs in again. Tokens are never cached, so a call
/// can't fail because an older token went stale.
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    span: Span,
}

impl UploadClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, TransportError> {
        Ok(Self::with_http(http_client()?, base_url, credentials))
    }

    /// Build on a shared transport so concurrent invocations reuse connections.
    pub fn with_http(http: reqwest::Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            span: Span::none(),
        }
    }

    /// Emit this client's events under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in. `Ok(None)` means the backend refused the credentials.
    pub async fn authenticate(&self) -> Result<Option<Token>, TransportError> {
        let request = LoginRequest {
            username: &self.credentials.username,
            password: &self.credentials.password,
            otp_code: self.credentials.otp_code.as_deref(),
        };

        let response = self
            .http
            .post(self.endpoint(LOGIN_PATH))
            .json(&request)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let login: LoginResponse = decode(response).await?;

        match login.data {
            Some(data) if login.code == SUCCESS_CODE && !data.token.is_empty() => {
                debug!(parent: &self.span, user = %self.credentials.username, "storage login ok");
                Ok(Some(Token(data.token)))
            }
            _ => {
                warn!(parent: &self.span, user = %self.credentials.username, code = login.code, "storage login rejected");
                Ok(None)
            }
        }
    }

    /// Create `path` on the backend. `false` covers every rejection,
    /// including "already exists".
    pub async fn create_directory(&self, path: &str) -> Result<bool, TransportError> {
        let Some(token) = self.authenticate().await? else {
            return Ok(false);
        };

        let response = self
            .http
            .post(self.endpoint(MKDIR_PATH))
            .header(AUTHORIZATION, token.as_str())
            .json(&MkdirRequest { path })
            .send()
            .await
            .map_err(TransportError::Http)?;
        let reply: BackendResponse = decode(response).await?;

        if !reply.is_success() {
            warn!(parent: &self.span, path, code = reply.code, message = %reply.message, "mkdir rejected");
        }
        Ok(reply.is_success())
    }

    /// Stream a local file to `destination`.
    pub async fn upload_local_file(
        &self,
        source: &Path,
        destination: &str,
    ) -> Result<Option<BackendResponse>, TransportError> {
        let Some(token) = self.authenticate().await? else {
            return Ok(None);
        };

        let file = tokio::fs::File::open(source).await.map_err(TransportError::Io)?;
        let len = file.metadata().await.map_err(TransportError::Io)?.len();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| basename(destination).to_string());
        let part = Part::stream_with_length(Body::from(file), len);
        let part = with_file_name(part, file_name)?;

        info!(parent: &self.span, source = %source.display(), destination, bytes = len, "uploading local file");
        self.put_form(&token, destination, part).await.map(Some)
    }

    /// Download `source_url` and upload the bytes to `destination`.
    ///
    /// A failed download is an error and nothing is sent to the backend.
    pub async fn upload_remote_file(
        &self,
        source_url: &str,
        destination: &str,
    ) -> Result<Option<BackendResponse>, TransportError> {
        let data = self.fetch(source_url).await?;

        let Some(token) = self.authenticate().await? else {
            return Ok(None);
        };

        info!(parent: &self.span, destination, bytes = data.len(), "uploading remote file");
        let part = with_file_name(Part::bytes(data), basename(destination).to_string())?;
        self.put_form(&token, destination, part).await.map(Some)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(TransportError::fetch_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::fetch_status(status));
        }

        let bytes = response.bytes().await.map_err(TransportError::fetch_failed)?;
        debug!(parent: &self.span, bytes = bytes.len(), "fetched source image");
        Ok(bytes.to_vec())
    }

    async fn put_form(&self, token: &Token, destination: &str, part: Part) -> Result<BackendResponse, TransportError> {
        let form = Form::new().part("file", part);
        let response = self
            .http
            .put(self.endpoint(FORM_PATH))
            .header(AUTHORIZATION, token.as_str())
            .header("File-Path", urlencoding::encode(destination).into_owned())
            .header("As-Task", "true")
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let reply: BackendResponse = decode(response).await?;
        if !reply.is_success() {
            warn!(parent: &self.span, destination, code = reply.code, message = %reply.message, "upload rejected");
        }
        Ok(reply)
    }
}

/// Read the body and decode it. Non-2xx statuses are transport failures.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(TransportError::Http)?;
    if !status.is_success() {
        return Err(TransportError::Status { status, body });
    }
    serde_json::from_str(&body).map_err(TransportError::Decode)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn content_type(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn with_file_name(part: Part, file_name: String) -> Result<Part, TransportError> {
    let mime = content_type(&file_name);
    let part = part.file_name(file_name);
    match mime {
        Some(mime) => part.mime_str(mime).map_err(TransportError::Http),
        None => Ok(part),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_shape() {
        assert!(is_valid_base_url("http://localhost:5244"));
        assert!(is_valid_base_url("https://alist.example.com"));
        assert!(is_valid_base_url("http://192.168.1.10:5244/"));
        assert!(!is_valid_base_url("localhost:5244"));
        assert!(!is_valid_base_url("ftp://example.com"));
        assert!(!is_valid_base_url(""));
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/mnt/img/photos/u1_T-p0.png"), "u1_T-p0.png");
        assert_eq!(basename("plain.gif"), "plain.gif");
        assert_eq!(basename("/trailing/"), "");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.PNG"), Some("image/png"));
        assert_eq!(content_type("a.gif"), Some("image/gif"));
        assert_eq!(content_type("noext"), None);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::new("admin", "hunter2", Some("123456".into()));
        let printed = format!("{creds:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("123456"));
    }

    #[test]
    fn test_empty_otp_is_none() {
        let creds = Credentials::new("admin", "pw", Some(String::new()));
        assert!(creds.otp_code.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = UploadClient::with_http(
            reqwest::Client::new(),
            "http://localhost:5244/",
            Credentials::new("a", "b", None),
        );
        assert_eq!(client.base_url(), "http://localhost:5244");
        assert_eq!(client.endpoint(LOGIN_PATH), "http://localhost:5244/api/auth/login");
    }

    #[test]
    fn test_new_uses_shared_transport() {
        assert!(http_client().is_ok());
        let client = UploadClient::new("http://localhost:5244", Credentials::new("a", "b", None)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5244");
    }

    #[test]
    fn test_backend_response_defaults() {
        let reply: BackendResponse = serde_json::from_str(r#"{"code":200}"#).unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.message, "");
        assert!(reply.data.is_null());

        let reply: BackendResponse = serde_json::from_str(r#"{"code":403,"message":"no permission"}"#).unwrap();
        assert!(!reply.is_success());
    }
}
