//! Session API Types
//!
//! Wire shapes for the backend session endpoints. The backend is
//! authoritative; these are the client's cached copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ApiError;

/// Connection status as reported by the backend.
///
/// Two spellings exist in the wild: `QR_PENDING` is accepted for `QR_CODE`
/// and `ERROR` for `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    #[serde(alias = "QR_PENDING")]
    QrCode,
    Connected,
    #[serde(alias = "ERROR")]
    Failed,
}

impl SessionStatus {
    /// Polling stops once one of these is observed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Failed)
    }

    /// Statuses that mean a pairing is in flight and must be tracked.
    pub fn needs_tracking(self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::QrCode)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "DISCONNECTED",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::QrCode => "QR_CODE",
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session classification. Has no behavioral effect on the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionType {
    #[default]
    Main,
    Support,
    Sales,
    Marketing,
    /// Preserves categories this client doesn't know about
    Other(String),
}

impl SessionType {
    pub fn as_str(&self) -> &str {
        match self {
            SessionType::Main => "MAIN",
            SessionType::Support => "SUPPORT",
            SessionType::Sales => "SALES",
            SessionType::Marketing => "MARKETING",
            SessionType::Other(s) => s,
        }
    }
}

impl From<String> for SessionType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "MAIN" => SessionType::Main,
            "SUPPORT" => SessionType::Support,
            "SALES" => SessionType::Sales,
            "MARKETING" => SessionType::Marketing,
            _ => SessionType::Other(value),
        }
    }
}

impl From<SessionType> for String {
    fn from(value: SessionType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for SessionType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ApiError::Validation("session type is required".to_string()));
        }
        Ok(SessionType::from(trimmed.to_string()))
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WhatsApp pairing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "sessionId")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub session_type: SessionType,

    pub status: SessionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        session_type: SessionType,
        status: SessionStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            session_type,
            status,
            phone: None,
            last_connected_at: None,
            created_at: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Phone number, only while the session is connected.
    pub fn connected_phone(&self) -> Option<&str> {
        if self.status == SessionStatus::Connected {
            self.phone.as_deref()
        } else {
            None
        }
    }
}

/// Body of `POST /sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionInput {
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
}

impl CreateSessionInput {
    pub fn new(name: impl Into<String>, session_type: SessionType) -> Self {
        Self {
            name: name.into(),
            session_type,
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("session name is required".to_string()));
        }
        if self.session_type.as_str().trim().is_empty() {
            return Err(ApiError::Validation("session type is required".to_string()));
        }
        Ok(())
    }
}

/// Body of `GET /sessions/:id/qrcode`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QrCodeResponse {
    #[serde(default, alias = "qrcode", alias = "qr")]
    pub qr_code: Option<String>,
}

/// Some deployments wrap every payload in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}
