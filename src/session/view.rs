//! Session View Projection
//!
//! Pure mapping from a cached session, its polling flag, and the current QR
//! code to what a dashboard or terminal shows. Re-derived on every render.

use super::events::SessionEvent;
use crate::api::{ApiError, Session, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeColor {
    Gray,
    Yellow,
    Blue,
    Green,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub color: BadgeColor,
}

/// The one primary action offered for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Connect,
    Disconnect,
    RegenerateQr,
    ViewQr,
}

impl SessionAction {
    pub fn label(self) -> &'static str {
        match self {
            SessionAction::Connect => "Connect",
            SessionAction::Disconnect => "Disconnect",
            SessionAction::RegenerateQr => "Regenerate QR",
            SessionAction::ViewQr => "View QR",
        }
    }
}

/// Contents of the QR dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPanel {
    Hidden,
    /// Spinner while the backend prepares a code
    Waiting,
    Image(String),
    Success { phone: Option<String> },
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub badge: Badge,
    pub spinner: bool,
    pub action: SessionAction,
    pub panel: QrPanel,
}

pub fn project(session: &Session, is_polling: bool, qr_code: Option<&str>) -> SessionView {
    let status = session.status;
    let qr_or_waiting = || match qr_code {
        Some(code) => QrPanel::Image(code.to_string()),
        None => QrPanel::Waiting,
    };

    let (badge, action, panel) = match status {
        SessionStatus::Disconnected => (
            Badge {
                label: "Disconnected",
                color: BadgeColor::Gray,
            },
            SessionAction::Connect,
            if is_polling {
                QrPanel::Waiting
            } else {
                QrPanel::Hidden
            },
        ),
        SessionStatus::Connecting => (
            Badge {
                label: "Connecting",
                color: BadgeColor::Yellow,
            },
            SessionAction::ViewQr,
            qr_or_waiting(),
        ),
        SessionStatus::QrCode => (
            Badge {
                label: "Waiting for scan",
                color: BadgeColor::Blue,
            },
            SessionAction::ViewQr,
            qr_or_waiting(),
        ),
        SessionStatus::Connected => (
            Badge {
                label: "Connected",
                color: BadgeColor::Green,
            },
            SessionAction::Disconnect,
            QrPanel::Success {
                phone: session.connected_phone().map(str::to_string),
            },
        ),
        SessionStatus::Failed => (
            Badge {
                label: "Failed",
                color: BadgeColor::Red,
            },
            SessionAction::RegenerateQr,
            QrPanel::Failure,
        ),
    };

    SessionView {
        badge,
        spinner: is_polling && !status.is_terminal(),
        action,
        panel,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Toast-style message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Status updates and auto-closes are silent; everything else gets a toast.
pub fn notification_for(event: &SessionEvent) -> Option<Notification> {
    match event {
        SessionEvent::Updated(_) | SessionEvent::QrClosed { .. } => None,
        SessionEvent::QrCode { id, .. } => Some(Notification::new(
            NotificationLevel::Info,
            format!("QR code ready for session {}. Scan it with WhatsApp.", id),
        )),
        SessionEvent::Connected { phone, .. } => Some(Notification::new(
            NotificationLevel::Success,
            match phone {
                Some(phone) => format!("WhatsApp connected as {}", phone),
                None => "WhatsApp connected".to_string(),
            },
        )),
        SessionEvent::Failed { id } => Some(Notification::new(
            NotificationLevel::Error,
            format!(
                "Session {} failed to connect. Regenerate the QR code to try again.",
                id
            ),
        )),
        SessionEvent::PollError { id, error } => Some(Notification::new(
            NotificationLevel::Error,
            format!("Stopped tracking session {}: {}", id, error),
        )),
        SessionEvent::TimedOut { id } => Some(Notification::new(
            NotificationLevel::Warning,
            format!(
                "Gave up waiting for session {}. Open the QR code again to retry.",
                id
            ),
        )),
    }
}

/// Toast for a failed user action (create, connect, ...).
pub fn notification_for_error(error: &ApiError) -> Notification {
    match error {
        ApiError::Validation(msg) => Notification::new(NotificationLevel::Warning, msg.clone()),
        ApiError::Conflict(msg) => Notification::new(
            NotificationLevel::Error,
            format!("Session limit reached: {}", msg),
        ),
        ApiError::NotReady(_) => Notification::new(
            NotificationLevel::Info,
            "QR code is still being generated",
        ),
        other => Notification::new(NotificationLevel::Error, other.to_string()),
    }
}
