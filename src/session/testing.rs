//! Scripted `SessionApi` for controller tests.
//!
//! Each session gets a list of steps for status fetches and another for QR
//! fetches. Steps are consumed in order and the last one repeats.

use crate::api::{
    ApiError, CreateSessionInput, Result, Session, SessionApi, SessionStatus, SessionType,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Status(SessionStatus),
    Connected(&'static str),
    Qr(&'static str),
    NotReady,
    NetworkError,
}

#[derive(Debug, Default)]
struct Script {
    steps: Vec<Step>,
    pos: usize,
}

impl Script {
    fn next(&mut self) -> Option<Step> {
        let last = self.steps.len().checked_sub(1)?;
        let step = self.steps[self.pos.min(last)];
        if self.pos < last {
            self.pos += 1;
        }
        Some(step)
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: Vec<Session>,
    status: HashMap<String, Script>,
    qr: HashMap<String, Script>,
    calls: HashMap<(&'static str, String), usize>,
    quota_exceeded: bool,
    next_id: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedApi {
    latency: Duration,
    inner: Mutex<Inner>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every status fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, op: &'static str, id: &str) {
        *self.lock().calls.entry((op, id.to_string())).or_default() += 1;
    }

    fn calls(&self, op: &'static str, id: &str) -> usize {
        self.lock()
            .calls
            .get(&(op, id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn script_status(&self, id: &str, steps: Vec<Step>) {
        self.lock()
            .status
            .insert(id.to_string(), Script { steps, pos: 0 });
    }

    pub fn script_qr(&self, id: &str, steps: Vec<Step>) {
        self.lock()
            .qr
            .insert(id.to_string(), Script { steps, pos: 0 });
    }

    pub fn set_sessions(&self, sessions: Vec<Session>) {
        self.lock().sessions = sessions;
    }

    pub fn set_quota_exceeded(&self, exceeded: bool) {
        self.lock().quota_exceeded = exceeded;
    }

    pub fn status_calls(&self, id: &str) -> usize {
        self.calls("status", id)
    }

    pub fn qr_calls(&self, id: &str) -> usize {
        self.calls("qr", id)
    }

    pub fn refresh_calls(&self, id: &str) -> usize {
        self.calls("refresh", id)
    }

    pub fn delete_calls(&self, id: &str) -> usize {
        self.calls("delete", id)
    }
}

#[async_trait]
impl SessionApi for ScriptedApi {
    async fn create_session(&self, input: &CreateSessionInput) -> Result<Session> {
        let mut inner = self.lock();
        if inner.quota_exceeded {
            return Err(ApiError::Conflict("session quota exceeded".to_string()));
        }
        inner.next_id += 1;
        let session = Session::new(
            format!("s{}", inner.next_id),
            input.name.clone(),
            input.session_type.clone(),
            SessionStatus::Connecting,
        );
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        self.count("status", id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut inner = self.lock();
        let base = inner
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .unwrap_or_else(|| {
                Session::new(id, "", SessionType::Main, SessionStatus::Disconnected)
            });
        let known = inner.sessions.iter().any(|s| s.id == id);
        let step = inner.status.get_mut(id).and_then(Script::next);
        match step {
            Some(Step::Status(status)) => Ok(Session {
                status,
                phone: None,
                ..base
            }),
            Some(Step::Connected(phone)) => Ok(Session {
                status: SessionStatus::Connected,
                ..base
            }
            .with_phone(phone)),
            Some(Step::NetworkError) => Err(ApiError::Network("connection reset".to_string())),
            Some(step) => Err(ApiError::Api {
                status: 500,
                message: format!("unexpected status step {:?}", step),
            }),
            None if known => Ok(base),
            None => Err(ApiError::NotFound(id.to_string())),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.lock().sessions.clone())
    }

    async fn get_qr_code(&self, id: &str) -> Result<String> {
        self.count("qr", id);
        match self.lock().qr.get_mut(id).and_then(Script::next) {
            Some(Step::Qr(code)) => Ok(code.to_string()),
            Some(Step::NetworkError) => Err(ApiError::Network("connection reset".to_string())),
            _ => Err(ApiError::NotReady(id.to_string())),
        }
    }

    async fn refresh_qr_code(&self, id: &str) -> Result<()> {
        self.count("refresh", id);
        Ok(())
    }

    async fn connect_session(&self, id: &str) -> Result<()> {
        self.count("connect", id);
        Ok(())
    }

    async fn disconnect_session(&self, id: &str) -> Result<()> {
        self.count("disconnect", id);
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.count("delete", id);
        self.lock().sessions.retain(|s| s.id != id);
        Ok(())
    }
}
