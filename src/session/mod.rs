//! Session Connection
//!
//! Client-side state machine for WhatsApp pairing: a poller per session,
//! cached session/QR state, and the projection of that state into what the
//! user sees.

mod events;
mod manager;
pub mod qr;
mod registry;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use events::SessionEvent;
pub use manager::{ConnectionManager, PollSettings};
pub use qr::{QrError, QrPayload};
pub use view::{
    Badge, BadgeColor, Notification, NotificationLevel, QrPanel, SessionAction, SessionView,
    notification_for, notification_for_error, project,
};
