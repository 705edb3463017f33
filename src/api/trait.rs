//! Session API Trait
//!
//! Seam between the poll controller and the backend. The HTTP client is
//! the production implementation; tests script their own.

use super::error::Result;
use super::types::{CreateSessionInput, Session};
use async_trait::async_trait;

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self, input: &CreateSessionInput) -> Result<Session>;

    async fn get_session(&self, id: &str) -> Result<Session>;

    async fn list_sessions(&self) -> Result<Vec<Session>>;

    /// Current QR code (data URI or raw pairing string).
    ///
    /// Fails with `ApiError::NotReady` until the backend has generated one.
    async fn get_qr_code(&self, id: &str) -> Result<String>;

    /// Ask the backend to regenerate the QR code. Callers re-fetch afterwards.
    async fn refresh_qr_code(&self, id: &str) -> Result<()>;

    async fn connect_session(&self, id: &str) -> Result<()>;

    async fn disconnect_session(&self, id: &str) -> Result<()>;

    async fn delete_session(&self, id: &str) -> Result<()>;
}
