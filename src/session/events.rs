//! Session Events
//!
//! What the poll controller reports to whoever renders sessions.

use crate::api::{ApiError, Session};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The cached copy of a session changed status or phone
    Updated(Session),

    /// A new QR code is available for the session
    QrCode { id: String, qr_code: String },

    /// Terminal success. Polling for this id has stopped.
    Connected { id: String, phone: Option<String> },

    /// Terminal failure. Polling for this id has stopped.
    Failed { id: String },

    /// A poll tick failed; polling for this id has stopped.
    PollError { id: String, error: ApiError },

    /// The poll deadline expired before a terminal status.
    TimedOut { id: String },

    /// The QR view for this session was closed automatically.
    QrClosed { id: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Updated(session) => &session.id,
            SessionEvent::QrCode { id, .. }
            | SessionEvent::Connected { id, .. }
            | SessionEvent::Failed { id }
            | SessionEvent::PollError { id, .. }
            | SessionEvent::TimedOut { id }
            | SessionEvent::QrClosed { id } => id,
        }
    }

    /// True when the event means the session's poller is gone.
    pub fn ends_polling(&self) -> bool {
        matches!(
            self,
            SessionEvent::Connected { .. }
                | SessionEvent::Failed { .. }
                | SessionEvent::PollError { .. }
                | SessionEvent::TimedOut { .. }
        )
    }
}
