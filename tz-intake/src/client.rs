//! TicketZen intake API client
//!
//! Wraps the remote intake operations and normalises every outcome into
//! `Result<_, IntakeError>`. The client never touches session state and
//! does no logging of its own; callers decide what an outcome means.

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tz_common::config::ClientSettings;

use crate::error::{IntakeError, IntakeResult};
use crate::models::remote::{AckResponse, RotateRequest, StatusResponse};
use crate::models::{Rotation, SessionToken, StatusReport};

const USER_AGENT: &str = concat!("TicketZen-Intake/", env!("CARGO_PKG_VERSION"));

/// Message used for any status body that cannot be decoded
pub const MALFORMED_STATUS: &str = "malformed status response";

pub type UploadOutcome = IntakeResult<()>;
pub type AnalyzeOutcome = IntakeResult<()>;
pub type RotateOutcome = IntakeResult<()>;
pub type StatusOutcome = IntakeResult<StatusReport>;

/// File selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    bytes: Vec<u8>,
    file_name: String,
}

impl UploadFile {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
        }
    }

    /// Read a receipt photo from disk
    pub async fn from_path(path: &Path) -> IntakeResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            IntakeError::Validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(bytes, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Remote operations of one intake session
///
/// Implementations are bound to a single session token.
#[async_trait]
pub trait IntakeApi: Send + Sync {
    fn token(&self) -> &SessionToken;

    /// Upload the receipt; an empty file fails with `Validation` and sends nothing
    async fn upload(&self, file: &UploadFile) -> UploadOutcome;

    async fn trigger_analysis(&self) -> AnalyzeOutcome;

    async fn fetch_status(&self) -> StatusOutcome;

    /// Rotate the stored image before analysis
    async fn rotate(&self, rotation: Rotation) -> RotateOutcome;
}

/// HTTP implementation of [`IntakeApi`]
#[derive(Debug, Clone)]
pub struct IntakeClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: SessionToken,
}

impl IntakeClient {
    pub fn new(base_url: &str, token: SessionToken, timeout: Duration) -> IntakeResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IntakeError::Validation(format!("invalid server URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IntakeError::Validation(format!(
                "server URL cannot carry a path: {}",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IntakeError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            token,
        })
    }

    pub fn from_settings(settings: &ClientSettings, token: SessionToken) -> IntakeResult<Self> {
        Self::new(&settings.server_url, token, settings.request_timeout)
    }

    /// `{base}/api/intake/{token}/{action}` with the token percent-encoded
    fn session_endpoint(&self, action: &str) -> Url {
        self.endpoint(&["api", "intake", self.token.as_str(), action])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always accepts path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl IntakeApi for IntakeClient {
    fn token(&self) -> &SessionToken {
        &self.token
    }

    async fn upload(&self, file: &UploadFile) -> UploadOutcome {
        if file.is_empty() {
            return Err(IntakeError::Validation("no file selected".to_string()));
        }

        let part = multipart::Part::bytes(file.bytes().to_vec()).file_name(file.file_name().to_string());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.session_endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        read_ack(response).await
    }

    async fn trigger_analysis(&self) -> AnalyzeOutcome {
        let response = self
            .http_client
            .post(self.session_endpoint("analyze"))
            .send()
            .await
            .map_err(transport_error)?;

        read_ack(response).await
    }

    async fn fetch_status(&self) -> StatusOutcome {
        let response = self
            .http_client
            .get(self.session_endpoint("status"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Transport(format!(
                "server returned HTTP {}",
                status
            )));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let parsed: StatusResponse = serde_json::from_slice(&body)
            .map_err(|_| IntakeError::MalformedResponse(MALFORMED_STATUS.to_string()))?;

        Ok(parsed.into())
    }

    async fn rotate(&self, rotation: Rotation) -> RotateOutcome {
        let response = self
            .http_client
            .post(self.endpoint(&["api", "intake", "rotate"]))
            .json(&RotateRequest::new(&self.token, rotation))
            .send()
            .await
            .map_err(transport_error)?;

        read_ack(response).await
    }
}

fn transport_error(err: reqwest::Error) -> IntakeError {
    if err.is_timeout() {
        IntakeError::Transport("request timed out".to_string())
    } else if err.is_connect() {
        IntakeError::Transport(format!("cannot reach server: {}", err))
    } else {
        IntakeError::Transport(format!("transport failure: {}", err))
    }
}

/// Decode an `{ok, error?}` body
///
/// The server reports most failures as HTTP 200 with `ok: false`; non-2xx
/// responses are transport errors but still prefer the body's reason.
async fn read_ack(response: reqwest::Response) -> IntakeResult<()> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;
    let ack = serde_json::from_slice::<AckResponse>(&body).ok();

    if !status.is_success() {
        let reason = ack
            .and_then(|a| a.error)
            .unwrap_or_else(|| format!("server returned HTTP {}", status));
        return Err(IntakeError::Transport(reason));
    }

    match ack {
        Some(AckResponse { ok: true, .. }) => Ok(()),
        Some(AckResponse { ok: false, error }) => Err(IntakeError::ServerReported(
            error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "request rejected by server".to_string()),
        )),
        None => Err(IntakeError::MalformedResponse(
            "malformed acknowledgement".to_string(),
        )),
    }
}
