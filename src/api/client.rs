//! HTTP Session Client
//!
//! `SessionApi` over the backend REST endpoints. Stateless apart from the
//! pooled `reqwest::Client`; no retries happen here.

use super::error::{ApiError, Result};
use super::r#trait::SessionApi;
use super::types::{CreateSessionInput, Envelope, QrCodeResponse, Session};
use crate::config::ApiConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Backend session client
#[derive(Clone)]
pub struct HttpSessionClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpSessionClient {
    /// Build a client from the `[api]` config section
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(
            config.base_url.clone(),
            config.token.clone(),
            client,
        ))
    }

    /// Create with custom HTTP client
    pub fn with_client(base_url: String, token: Option<String>, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_path(id: &str, suffix: &str) -> String {
        format!("/sessions/{}{}", urlencoding::encode(id), suffix)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send and turn non-success statuses into `ApiError`
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::handle_error(response).await)
        }
    }

    async fn handle_error(response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                crate::utils::truncate_str(body.trim(), 300).to_string()
            }
        });

        tracing::debug!("Session API error ({}): {}", status, message);
        ApiError::from_status(status.as_u16(), message)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let text = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        Ok(envelope.into_inner())
    }

    /// Lifecycle mutators treat "already in that state" answers as success.
    async fn send_idempotent(&self, builder: RequestBuilder, noop: StatusCode) -> Result<()> {
        match self.send(builder).await {
            Ok(_) => Ok(()),
            Err(err) if status_of(&err) == Some(noop.as_u16()) => {
                tracing::debug!("Session API: treating {} as no-op success ({})", noop, err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn status_of(err: &ApiError) -> Option<u16> {
    match err {
        ApiError::Conflict(_) => Some(409),
        ApiError::NotFound(_) => Some(404),
        ApiError::Api { status, .. } => Some(*status),
        _ => None,
    }
}

/// Pull a human-readable message out of a JSON error body.
///
/// Accepts `{"message": "..."}`, `{"message": ["...", "..."]}` and
/// `{"error": "..."}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match &value["message"] {
        serde_json::Value::String(s) if !s.is_empty() => return Some(s.clone()),
        serde_json::Value::Array(items) if !items.is_empty() => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if !parts.is_empty() {
                return Some(parts.join("; "));
            }
        }
        _ => {}
    }
    value["error"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SessionApi for HttpSessionClient {
    async fn create_session(&self, input: &CreateSessionInput) -> Result<Session> {
        input.validate()?;

        let response = self
            .send(self.request(Method::POST, "/sessions").json(input))
            .await?;
        let session: Session = Self::read_json(response).await?;

        tracing::info!("Created session {} ({})", session.id, session.name);
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let response = self
            .send(self.request(Method::GET, &Self::session_path(id, "")))
            .await?;
        Self::read_json(response).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let response = self.send(self.request(Method::GET, "/sessions")).await?;
        Self::read_json(response).await
    }

    async fn get_qr_code(&self, id: &str) -> Result<String> {
        let response = match self
            .send(self.request(Method::GET, &Self::session_path(id, "/qrcode")))
            .await
        {
            Ok(response) => response,
            Err(ApiError::NotFound(msg)) => return Err(ApiError::NotReady(msg)),
            Err(err) => return Err(err),
        };

        let body: QrCodeResponse = Self::read_json(response).await?;
        match body.qr_code {
            Some(code) if !code.trim().is_empty() => Ok(code),
            _ => Err(ApiError::NotReady(format!(
                "no QR code generated yet for session {}",
                id
            ))),
        }
    }

    async fn refresh_qr_code(&self, id: &str) -> Result<()> {
        self.send(self.request(Method::POST, &Self::session_path(id, "/qrcode/refresh")))
            .await?;
        tracing::debug!("Requested QR regeneration for session {}", id);
        Ok(())
    }

    async fn connect_session(&self, id: &str) -> Result<()> {
        self.send_idempotent(
            self.request(Method::POST, &Self::session_path(id, "/connect")),
            StatusCode::CONFLICT,
        )
        .await
    }

    async fn disconnect_session(&self, id: &str) -> Result<()> {
        self.send_idempotent(
            self.request(Method::POST, &Self::session_path(id, "/disconnect")),
            StatusCode::CONFLICT,
        )
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.send_idempotent(
            self.request(Method::DELETE, &Self::session_path(id, "")),
            StatusCode::NOT_FOUND,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{SessionStatus, SessionType};

    fn client_for(server: &mockito::Server, token: Option<&str>) -> HttpSessionClient {
        HttpSessionClient::with_client(server.url(), token.map(str::to_string), Client::new())
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"message": "quota exceeded"}"#),
            Some("quota exceeded".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"message": ["name required", "type required"]}"#),
            Some("name required; type required".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"error": "Bad Request"}"#),
            Some("Bad Request".to_string())
        );
        assert_eq!(extract_error_message("plain text"), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpSessionClient::with_client(
            "http://localhost:3000/api/".to_string(),
            Some("  ".to_string()),
            Client::new(),
        );
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn test_create_session_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions")
            .match_header("Authorization", "Bearer test-token")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({ "name": "Sales", "type": "SALES" }),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "s1", "name": "Sales", "type": "SALES", "status": "CONNECTING"}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("test-token"));
        let session = client
            .create_session(&CreateSessionInput::new("Sales", SessionType::Sales))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.id, "s1");
        assert_eq!(session.status, SessionStatus::Connecting);
    }

    #[tokio::test]
    async fn test_create_session_validation_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client
            .create_session(&CreateSessionInput::new("", SessionType::Sales))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_session_quota_conflict() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions")
            .with_status(409)
            .with_body(r#"{"message": "Session limit reached for this organization"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client
            .create_session(&CreateSessionInput::new("Sales", SessionType::Sales))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err,
            ApiError::Conflict("Session limit reached for this organization".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_sessions_wrapped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions")
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"id": "a", "status": "CONNECTED", "phone": "+1"},
                    {"sessionId": "b", "status": "QR_PENDING"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, None);
        let sessions = client.list_sessions().await.unwrap();

        mock.assert_async().await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].id, "b");
        assert_eq!(sessions[1].status, SessionStatus::QrCode);
    }

    #[tokio::test]
    async fn test_get_session_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/s1")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.get_session("s1").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_session_id_is_escaped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/a%2Fb")
            .with_status(200)
            .with_body(r#"{"id": "a/b", "status": "DISCONNECTED"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let session = client.get_session("a/b").await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.id, "a/b");
    }

    #[tokio::test]
    async fn test_get_qr_code_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/s1/qrcode")
            .with_status(200)
            .with_body(r#"{"qrCode": "data:image/png;base64,ABC"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let code = client.get_qr_code("s1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(code, "data:image/png;base64,ABC");
    }

    #[tokio::test]
    async fn test_get_qr_code_not_ready_variants() {
        let mut server = mockito::Server::new_async().await;
        let empty = server
            .mock("GET", "/sessions/s1/qrcode")
            .with_status(200)
            .with_body(r#"{"qrCode": ""}"#)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/sessions/s2/qrcode")
            .with_status(404)
            .with_body(r#"{"message": "QR code not generated"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.get_qr_code("s1").await.unwrap_err().is_not_ready());
        assert!(client.get_qr_code("s2").await.unwrap_err().is_not_ready());

        empty.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_qr_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions/s1/qrcode/refresh")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.refresh_qr_code("s1").await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_lifecycle_mutators_are_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/sessions/s1/connect")
            .with_status(409)
            .with_body(r#"{"message": "already connecting"}"#)
            .create_async()
            .await;
        let disconnect = server
            .mock("POST", "/sessions/s1/disconnect")
            .with_status(409)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/sessions/s1")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.connect_session("s1").await.is_ok());
        assert!(client.disconnect_session("s1").await.is_ok());
        assert!(client.delete_session("s1").await.is_ok());

        connect.assert_async().await;
        disconnect.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sessions/s1/connect")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.connect_session("s1").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err,
            ApiError::Api {
                status: 500,
                message: "Internal Server Error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions")
            .with_status(401)
            .with_body(r#"{"message": "Unauthorized"}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("expired"));
        let err = client.list_sessions().await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_network_error() {
        // Nothing listens on port 9 in the test environment
        let client = HttpSessionClient::with_client(
            "http://127.0.0.1:9".to_string(),
            None,
            Client::new(),
        );
        let err = client.list_sessions().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
