//! Wire shapes of the TicketZen intake API
//!
//! - `POST /api/intake/{token}/upload`  → `{ok, error?}`
//! - `POST /api/intake/{token}/analyze` → `{ok, error?}`
//! - `GET  /api/intake/{token}/status`  → `{state, result?, error?, progress?}`
//! - `POST /api/intake/rotate`          → `{ok, error?}`

use serde::{Deserialize, Deserializer, Serialize};

use super::session::SessionToken;

/// Structured receipt fields extracted by the server
///
/// The server sends more (line items, raw OCR text, confidence); only the
/// fields the client renders are kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceiptResult {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Accepts `9.42`, `"9.42"`, `"9,42"`, `"12,50 €"` or null
///
/// Anything that does not read as a number becomes `None` so one odd
/// field never discards the rest of the body.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn number_from_value(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount_text(s),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// `"1.234,50 €"` → 1234.5; the last separator is the decimal point
fn parse_amount_text(text: &str) -> Option<f64> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match kept.rfind(|c| c == '.' || c == ',') {
        Some(pos) => {
            let (whole, fraction) = kept.split_at(pos);
            let whole: String = whole.chars().filter(|c| *c != '.' && *c != ',').collect();
            format!("{}.{}", whole, &fraction[1..])
        }
        None => kept,
    };
    normalized.parse::<f64>().ok()
}

/// Stage name reported by the server
///
/// The client only gives meaning to `done` and `error`; every other stage
/// is progress information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Uploaded,
    Analyzing,
    Done,
    Error,
    Other(String),
}

impl RemoteState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => RemoteState::Pending,
            "uploaded" => RemoteState::Uploaded,
            "analyzing" => RemoteState::Analyzing,
            "done" => RemoteState::Done,
            "error" => RemoteState::Error,
            other => RemoteState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RemoteState::Pending => "pending",
            RemoteState::Uploaded => "uploaded",
            RemoteState::Analyzing => "analyzing",
            RemoteState::Done => "done",
            RemoteState::Error => "error",
            RemoteState::Other(stage) => stage.as_str(),
        }
    }
}

/// Normalised status poll result
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: RemoteState,
    pub result: Option<ReceiptResult>,
    pub error: Option<String>,
    /// 0..=100
    pub progress: Option<u8>,
}

impl StatusReport {
    pub fn stage(state: RemoteState) -> Self {
        Self {
            state,
            result: None,
            error: None,
            progress: None,
        }
    }

    pub fn done(result: ReceiptResult) -> Self {
        Self {
            result: Some(result),
            progress: Some(100),
            ..Self::stage(RemoteState::Done)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::stage(RemoteState::Error)
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }
}

/// Receipt rotation applied server-side before analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
    Degrees(i32),
}

/// `{ok, error?}` acknowledgement body
#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Status body as sent by the server
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub state: String,
    #[serde(default)]
    pub result: Option<ReceiptResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: Option<f64>,
}

impl From<StatusResponse> for StatusReport {
    fn from(raw: StatusResponse) -> Self {
        Self {
            state: RemoteState::parse(&raw.state),
            result: raw.result,
            error: raw.error.filter(|e| !e.trim().is_empty()),
            progress: raw
                .progress
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 100.0).round() as u8),
        }
    }
}

/// Body of `POST /api/intake/rotate`
#[derive(Debug, Serialize)]
pub(crate) struct RotateRequest<'a> {
    pub token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees: Option<i32>,
}

impl<'a> RotateRequest<'a> {
    pub fn new(token: &'a SessionToken, rotation: Rotation) -> Self {
        let (direction, degrees) = match rotation {
            Rotation::Clockwise => (Some("cw"), None),
            Rotation::CounterClockwise => (Some("ccw"), None),
            Rotation::Degrees(d) => (None, Some(d)),
        };
        Self {
            token: token.as_str(),
            direction,
            degrees,
        }
    }
}
