//! Session API
//!
//! Request wrappers for the backend session endpoints: create, list, fetch,
//! QR retrieval/regeneration, and the connect/disconnect/delete lifecycle.

mod client;
pub mod error;
mod r#trait;
pub mod types;

pub use client::HttpSessionClient;
pub use error::{ApiError, Result};
pub use r#trait::SessionApi;
pub use types::{CreateSessionInput, Session, SessionStatus, SessionType};
