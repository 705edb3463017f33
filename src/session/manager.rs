//! Session Connection Manager
//!
//! Owns the poll registry and the cached copies of sessions and QR codes.
//! One poller task per session id fetches status at a fixed interval until
//! the session connects, fails, times out, errors, or is stopped.

use super::events::SessionEvent;
use super::registry::{PollRegistry, PollTicket};
use super::view::{SessionView, project};
use crate::api::{ApiError, CreateSessionInput, Result, Session, SessionApi, SessionStatus};
use crate::config::PollingConfig;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Timing knobs for pollers and QR waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` polls until a terminal status or an explicit stop
    pub max_duration: Option<Duration>,
    pub qr_retry_attempts: u32,
    pub qr_retry_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_duration: (config.max_duration_secs > 0)
                .then(|| Duration::from_secs(config.max_duration_secs)),
            qr_retry_attempts: config.qr_retry_attempts,
            qr_retry_delay: Duration::from_millis(config.qr_retry_delay_ms),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    sessions: Vec<Session>,
    qr_codes: HashMap<String, String>,
    open_qr: HashSet<String>,
}

impl CacheState {
    fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Returns the previous copy, if any
    fn upsert(&mut self, session: Session) -> Option<Session> {
        match self.get_mut(&session.id) {
            Some(existing) => Some(std::mem::replace(existing, session)),
            None => {
                self.sessions.push(session);
                None
            }
        }
    }

    fn remove(&mut self, id: &str) {
        self.sessions.retain(|s| s.id != id);
        self.qr_codes.remove(id);
        self.open_qr.remove(id);
    }
}

struct Shared {
    api: Arc<dyn SessionApi>,
    settings: PollSettings,
    registry: PollRegistry,
    state: Mutex<CacheState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // Receiver may have been dropped; events are advisory
        let _ = self.events.send(event);
    }

    /// Run `f` under the cache lock unless the ticket was stopped. Stops
    /// cancel under the same lock, so no poller output lands after
    /// `stop_polling` returns.
    fn commit<R>(
        &self,
        ticket: &PollTicket,
        f: impl FnOnce(&mut CacheState) -> R,
    ) -> Option<R> {
        let mut state = self.state();
        if ticket.token.is_cancelled() {
            tracing::debug!("Discarding result for stopped session {}", ticket.id);
            return None;
        }
        Some(f(&mut state))
    }

    fn apply_session(&self, state: &mut CacheState, session: Session) {
        let previous = state.upsert(session.clone());
        if previous.is_none_or(|p| p.status != session.status || p.phone != session.phone) {
            tracing::debug!("Session {} is now {}", session.id, session.status);
            self.emit(SessionEvent::Updated(session));
        }
    }

    /// Store a QR code, emitting only when it differs from the cached one.
    fn store_qr(&self, state: &mut CacheState, id: &str, code: String) {
        if state.qr_codes.get(id) == Some(&code) {
            return;
        }
        state.qr_codes.insert(id.to_string(), code.clone());
        tracing::info!("New QR code for session {}", id);
        self.emit(SessionEvent::QrCode {
            id: id.to_string(),
            qr_code: code,
        });
    }

    /// A QR fetch is worth it when nothing is cached yet or the QR view is
    /// open and could be showing a code the backend already replaced.
    fn wants_qr(&self, id: &str) -> bool {
        let state = self.state();
        !state.qr_codes.contains_key(id) || state.open_qr.contains(id)
    }

    fn finish_connected(&self, state: &mut CacheState, ticket: &PollTicket) {
        self.registry.release(ticket);
        state.qr_codes.remove(&ticket.id);
        let was_open = state.open_qr.remove(&ticket.id);
        let phone = state
            .get(&ticket.id)
            .and_then(|s| s.connected_phone())
            .map(str::to_string);
        tracing::info!(
            "Session {} connected{}",
            ticket.id,
            phone.as_deref().map(|p| format!(" as {}", p)).unwrap_or_default()
        );
        if was_open {
            self.emit(SessionEvent::QrClosed {
                id: ticket.id.clone(),
            });
        }
        self.emit(SessionEvent::Connected {
            id: ticket.id.clone(),
            phone,
        });
    }

    fn finish_failed(&self, ticket: &PollTicket) {
        self.registry.release(ticket);
        tracing::warn!("Session {} failed to connect", ticket.id);
        self.emit(SessionEvent::Failed {
            id: ticket.id.clone(),
        });
    }

    fn finish_error(&self, ticket: &PollTicket, error: ApiError) {
        self.registry.release(ticket);
        tracing::warn!("Stopped polling session {}: {}", ticket.id, error);
        self.emit(SessionEvent::PollError {
            id: ticket.id.clone(),
            error,
        });
    }

    fn finish_timeout(&self, ticket: &PollTicket) {
        self.registry.release(ticket);
        tracing::warn!(
            "Polling session {} exceeded {:?}, giving up",
            ticket.id,
            self.settings.max_duration
        );
        self.emit(SessionEvent::TimedOut {
            id: ticket.id.clone(),
        });
    }
}

/// Poller body. Ticks run strictly one after another; a result that lands
/// after the ticket was cancelled is dropped.
async fn poll_session(shared: Arc<Shared>, ticket: PollTicket) {
    let started = Instant::now();
    tracing::debug!("Polling session {}", ticket.id);

    loop {
        if ticket.token.is_cancelled() {
            break;
        }
        if let Some(max) = shared.settings.max_duration
            && started.elapsed() >= max
        {
            shared.commit(&ticket, |_| shared.finish_timeout(&ticket));
            break;
        }

        let fetched = shared.api.get_session(&ticket.id).await;
        let session = match fetched {
            Ok(session) => session,
            Err(err) => {
                shared.commit(&ticket, |_| shared.finish_error(&ticket, err));
                break;
            }
        };

        let status = session.status;
        let applied = shared.commit(&ticket, |state| {
            shared.apply_session(state, session);
            match status {
                SessionStatus::Connected => {
                    shared.finish_connected(state, &ticket);
                    false
                }
                SessionStatus::Failed => {
                    shared.finish_failed(&ticket);
                    false
                }
                _ => true,
            }
        });
        if applied != Some(true) {
            break;
        }

        // While pairing, pick up the code once the backend has one, and keep
        // re-fetching while the QR view is open to catch regeneration.
        if status.needs_tracking() && shared.wants_qr(&ticket.id) {
            match shared.api.get_qr_code(&ticket.id).await {
                Ok(code) => {
                    if shared
                        .commit(&ticket, |state| shared.store_qr(state, &ticket.id, code))
                        .is_none()
                    {
                        break;
                    }
                }
                Err(err) if err.is_not_ready() => {
                    tracing::debug!("QR for session {} not ready yet", ticket.id);
                }
                Err(err) => {
                    shared.commit(&ticket, |_| shared.finish_error(&ticket, err));
                    break;
                }
            }
        }

        tokio::select! {
            _ = ticket.token.cancelled() => break,
            _ = tokio::time::sleep(shared.settings.interval) => {}
        }
    }

    shared.registry.release(&ticket);
    tracing::debug!("Stopped polling session {}", ticket.id);
}

/// Client-side controller for WhatsApp pairing sessions.
///
/// Cheap to clone; clones share the same registry and cache.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager and the receiving end of its event stream.
    pub fn new(
        api: Arc<dyn SessionApi>,
        settings: PollSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            api,
            settings,
            registry: PollRegistry::new(),
            state: Mutex::new(CacheState::default()),
            events,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });
        (Self { shared }, rx)
    }

    pub fn settings(&self) -> PollSettings {
        self.shared.settings
    }

    // --- Polling ---

    /// Start polling `id`. Returns `false` if a poller already runs for it
    /// or the manager was shut down.
    pub fn start_polling(&self, id: &str) -> bool {
        if self.shared.root.is_cancelled() {
            return false;
        }
        let Some(ticket) = self.shared.registry.try_register(id, &self.shared.root) else {
            tracing::debug!("Session {} is already being polled", id);
            return false;
        };
        self.shared
            .tracker
            .spawn(poll_session(self.shared.clone(), ticket));
        true
    }

    /// Stop polling `id`. An in-flight request completes but is ignored.
    pub fn stop_polling(&self, id: &str) -> bool {
        let _state = self.shared.state();
        let stopped = self.shared.registry.cancel(id);
        if stopped {
            tracing::debug!("Stop requested for session {}", id);
        }
        stopped
    }

    pub fn stop_all(&self) -> usize {
        let _state = self.shared.state();
        self.shared.registry.cancel_all()
    }

    pub fn is_polling(&self, id: &str) -> bool {
        let _state = self.shared.state();
        self.shared.registry.contains(id)
    }

    /// Ids with a live poller. Read under the cache lock, so a poller that
    /// is gone from this list has already sent its final event.
    pub fn polling_ids(&self) -> Vec<String> {
        let _state = self.shared.state();
        self.shared.registry.ids()
    }

    /// Start a poller for every session still pairing. Returns the ids that
    /// got a new poller.
    pub fn reconcile(&self, sessions: &[Session]) -> Vec<String> {
        sessions
            .iter()
            .filter(|s| s.status.needs_tracking())
            .filter(|s| self.start_polling(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Stop every poller and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        let stopped = {
            let _state = self.shared.state();
            self.shared.root.cancel();
            self.shared.registry.cancel_all()
        };
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        tracing::debug!("Connection manager shut down ({} pollers stopped)", stopped);
    }

    // --- Cache ---

    pub fn session(&self, id: &str) -> Option<Session> {
        self.shared.state().get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.shared.state().sessions.clone()
    }

    pub fn qr_code(&self, id: &str) -> Option<String> {
        self.shared.state().qr_codes.get(id).cloned()
    }

    pub fn is_qr_open(&self, id: &str) -> bool {
        self.shared.state().open_qr.contains(id)
    }

    pub fn view(&self, id: &str) -> Option<SessionView> {
        let state = self.shared.state();
        let session = state.get(id)?;
        Some(project(
            session,
            self.shared.registry.contains(id),
            state.qr_codes.get(id).map(String::as_str),
        ))
    }

    // --- Actions ---

    /// Fetch one session and update the cached copy.
    pub async fn fetch_session(&self, id: &str) -> Result<Session> {
        let session = self.shared.api.get_session(id).await?;
        let mut state = self.shared.state();
        self.shared.apply_session(&mut state, session.clone());
        Ok(session)
    }

    /// Fetch all sessions, replace the cache, and resume tracking of
    /// in-flight pairings. Returns the ids whose poller was started.
    pub async fn load(&self) -> Result<Vec<String>> {
        let sessions = self.shared.api.list_sessions().await?;
        {
            let mut state = self.shared.state();
            let known: HashSet<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
            state.qr_codes.retain(|id, _| known.contains(id.as_str()));
            state.open_qr.retain(|id| known.contains(id.as_str()));
            state.sessions = sessions.clone();
        }
        let started = self.reconcile(&sessions);
        tracing::info!(
            "Loaded {} sessions, resumed polling for {}",
            sessions.len(),
            started.len()
        );
        Ok(started)
    }

    pub async fn create_session(&self, input: CreateSessionInput) -> Result<Session> {
        input.validate()?;
        let session = self.shared.api.create_session(&input).await?;
        self.shared.state().upsert(session.clone());
        if session.status.needs_tracking() {
            self.start_polling(&session.id);
        }
        Ok(session)
    }

    pub async fn connect(&self, id: &str) -> Result<()> {
        self.shared.api.connect_session(id).await?;
        if let Some(session) = self.shared.state().get_mut(id) {
            session.status = SessionStatus::Connecting;
            session.phone = None;
        }
        self.start_polling(id);
        Ok(())
    }

    /// Open the QR view: make sure the session is polled, then wait briefly
    /// for a code. `Ok(None)` means still waiting; the poller keeps trying.
    pub async fn open_qr(&self, id: &str) -> Result<Option<String>> {
        self.shared.state().open_qr.insert(id.to_string());
        self.start_polling(id);
        self.wait_for_qr(id, None).await
    }

    /// Close the QR view and stop tracking the session.
    pub fn close_qr(&self, id: &str) -> bool {
        let mut state = self.shared.state();
        state.open_qr.remove(id);
        self.shared.registry.cancel(id)
    }

    /// Ask for a fresh code and wait until one that differs from the old one
    /// shows up. Re-enters `CONNECTING` and restarts polling.
    pub async fn regenerate_qr(&self, id: &str) -> Result<Option<String>> {
        let previous = match self.qr_code(id) {
            Some(code) => Some(code),
            // Nothing cached: whatever the backend serves now is the old code
            None => match self.shared.api.get_qr_code(id).await {
                Ok(code) => Some(code),
                Err(err) if err.is_not_ready() => None,
                Err(err) => return Err(err),
            },
        };
        self.shared.api.refresh_qr_code(id).await?;
        {
            let mut state = self.shared.state();
            state.qr_codes.remove(id);
            if let Some(session) = state.get_mut(id) {
                session.status = SessionStatus::Connecting;
                session.phone = None;
            }
        }
        self.start_polling(id);
        self.wait_for_qr(id, previous.as_deref()).await
    }

    pub async fn disconnect(&self, id: &str) -> Result<()> {
        self.close_qr(id);
        self.shared.api.disconnect_session(id).await?;
        let updated = {
            let mut state = self.shared.state();
            state.qr_codes.remove(id);
            state.get_mut(id).map(|session| {
                session.status = SessionStatus::Disconnected;
                session.phone = None;
                session.clone()
            })
        };
        if let Some(session) = updated {
            self.shared.emit(SessionEvent::Updated(session));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.stop_polling(id);
        self.shared.api.delete_session(id).await?;
        self.shared.state().remove(id);
        tracing::info!("Deleted session {}", id);
        Ok(())
    }

    /// Short bounded re-poll while the backend answers `NotReady` (or keeps
    /// returning `previous`).
    async fn wait_for_qr(&self, id: &str, previous: Option<&str>) -> Result<Option<String>> {
        let attempts = self.shared.settings.qr_retry_attempts.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.shared.settings.qr_retry_delay).await;
            }
            match self.shared.api.get_qr_code(id).await {
                Ok(code) if previous != Some(code.as_str()) => {
                    let mut state = self.shared.state();
                    self.shared.store_qr(&mut state, id, code.clone());
                    return Ok(Some(code));
                }
                Ok(_) => tracing::debug!("QR for session {} unchanged, retrying", id),
                Err(err) if err.is_not_ready() => {
                    tracing::debug!(
                        "QR for session {} not ready (attempt {}/{})",
                        id,
                        attempt + 1,
                        attempts
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}
