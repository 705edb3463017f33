//! Session subcommands: list, create, connect, qr, watch, disconnect, delete.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::{
    ApiError, CreateSessionInput, HttpSessionClient, Session, SessionApi, SessionStatus,
    SessionType,
};
use crate::config::Config;
use crate::session::{
    BadgeColor, ConnectionManager, NotificationLevel, PollSettings, QrPayload, SessionEvent,
    notification_for, notification_for_error, project,
};
use crate::utils::{time_ago, truncate_str};

fn build_client(config: &Config) -> Result<Arc<HttpSessionClient>> {
    let client = HttpSessionClient::new(&config.api).context("Failed to create API client")?;
    tracing::debug!("Using backend at {}", client.base_url());
    Ok(Arc::new(client))
}

fn build_manager(config: &Config) -> Result<(ConnectionManager, UnboundedReceiver<SessionEvent>)> {
    let api: Arc<dyn SessionApi> = build_client(config)?;
    Ok(ConnectionManager::new(
        api,
        PollSettings::from(&config.polling),
    ))
}

fn badge_marker(color: BadgeColor) -> &'static str {
    match color {
        BadgeColor::Gray => "⚪",
        BadgeColor::Yellow => "🟡",
        BadgeColor::Blue => "🔵",
        BadgeColor::Green => "🟢",
        BadgeColor::Red => "🔴",
    }
}

fn level_marker(level: NotificationLevel) -> &'static str {
    match level {
        NotificationLevel::Success => "✅",
        NotificationLevel::Info => "💬",
        NotificationLevel::Warning => "⚠️ ",
        NotificationLevel::Error => "❌",
    }
}

fn format_row(session: &Session) -> String {
    let view = project(session, false, None);
    let last_seen = session
        .last_connected_at
        .map(|at| time_ago(at, Utc::now()))
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{:<14} {:<24} {:<10} {} {:<18} {:<16} {}",
        truncate_str(&session.id, 14),
        truncate_str(&session.name, 24),
        session.session_type,
        badge_marker(view.badge.color),
        view.badge.label,
        session.connected_phone().unwrap_or("-"),
        last_seen
    )
}

/// Where QR codes go while following a pairing
#[derive(Debug, Clone, Default)]
pub(crate) struct QrSink {
    out: Option<PathBuf>,
}

impl QrSink {
    pub(crate) fn new(out: Option<PathBuf>) -> Self {
        Self { out }
    }

    /// Draw the code in the terminal when it is a raw pairing string;
    /// images go to `out` or a temp file.
    fn show(&self, id: &str, code: &str) -> Result<()> {
        let payload = QrPayload::parse(code)
            .with_context(|| format!("Backend sent an unreadable QR code for {}", id))?;

        if let QrPayload::Image { .. } = payload {
            let path = self.out.clone().unwrap_or_else(|| {
                std::env::temp_dir().join(format!("wasuite-qr-{}.{}", id, payload.extension()))
            });
            payload.save_image(&path)?;
            println!("📷 QR code for {} saved to {}", id, path.display());
            return Ok(());
        }

        match payload.render_terminal() {
            Some(rendered) => println!("\n{}", rendered),
            None => println!("\n{}\n", code),
        }
        if let (Some(path), QrPayload::Text(text)) = (&self.out, &payload) {
            write_text(path, text)?;
            println!("📝 Pairing string saved to {}", path.display());
        }
        Ok(())
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
}

/// Sessions that reached a terminal state while following
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FollowOutcome {
    pub connected: Vec<String>,
    pub stopped: Vec<String>,
}

fn report(
    manager: &ConnectionManager,
    sink: &QrSink,
    event: SessionEvent,
    outcome: &mut FollowOutcome,
) {
    match &event {
        SessionEvent::Updated(session) => {
            let view = project(
                session,
                manager.is_polling(&session.id),
                manager.qr_code(&session.id).as_deref(),
            );
            println!(
                "{} {} is {}",
                badge_marker(view.badge.color),
                session.id,
                view.badge.label
            );
        }
        SessionEvent::QrCode { id, qr_code } => {
            if let Err(e) = sink.show(id, qr_code) {
                println!("❌ {:#}", e);
            }
        }
        _ => {}
    }

    if let Some(note) = notification_for(&event) {
        println!("{} {}", level_marker(note.level), note.message);
    }

    if event.ends_polling() {
        let id = event.session_id().to_string();
        match event {
            SessionEvent::Connected { .. } => outcome.connected.push(id),
            _ => outcome.stopped.push(id),
        }
    }
}

/// Print events until no poller remains or Ctrl-C, then shut the manager
/// down. A poller's final event is queued before it leaves
/// `polling_ids()`, so draining the queue once that list is empty loses
/// nothing.
pub(crate) async fn follow(
    manager: &ConnectionManager,
    events: &mut UnboundedReceiver<SessionEvent>,
    sink: &QrSink,
) -> Result<FollowOutcome> {
    let mut outcome = FollowOutcome::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !manager.polling_ids().is_empty() {
        let event = tokio::select! {
            _ = &mut ctrl_c => {
                println!("\n⏹  Stopping...");
                manager.shutdown().await;
                return Ok(outcome);
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        report(manager, sink, event, &mut outcome);
    }

    while let Ok(event) = events.try_recv() {
        report(manager, sink, event, &mut outcome);
    }

    manager.shutdown().await;
    Ok(outcome)
}

/// List sessions
pub(crate) async fn cmd_list(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    let sessions = client.list_sessions().await.map_err(|e| {
        anyhow::anyhow!(notification_for_error(&e).message).context("Failed to list sessions")
    })?;

    if sessions.is_empty() {
        println!("No sessions yet. Create one with: wasuite create --name <NAME>");
        return Ok(());
    }

    println!(
        "{:<14} {:<24} {:<10}    {:<18} {:<16} LAST CONNECTED",
        "ID", "NAME", "TYPE", "STATUS", "PHONE"
    );
    for session in &sessions {
        println!("{}", format_row(session));
    }
    Ok(())
}

/// Create a session, optionally following its pairing
pub(crate) async fn cmd_create(
    config: &Config,
    name: String,
    session_type: &str,
    watch: bool,
) -> Result<()> {
    let session_type: SessionType = session_type.parse()?;
    let (manager, mut events) = build_manager(config)?;

    let session = match manager
        .create_session(CreateSessionInput::new(name, session_type))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            manager.shutdown().await;
            anyhow::bail!(notification_for_error(&e).message);
        }
    };
    println!(
        "✅ Created session {} ({}, {})",
        session.id, session.name, session.session_type
    );

    if watch {
        follow(&manager, &mut events, &QrSink::default()).await?;
    } else {
        manager.shutdown().await;
        println!("💡 Follow the pairing with: wasuite connect {}", session.id);
    }
    Ok(())
}

/// Connect a session and follow the pairing
pub(crate) async fn cmd_connect(config: &Config, id: &str, qr_out: Option<PathBuf>) -> Result<()> {
    let (manager, mut events) = build_manager(config)?;

    if let Err(e) = manager.connect(id).await {
        manager.shutdown().await;
        anyhow::bail!(notification_for_error(&e).message);
    }
    println!("🔄 Connecting session {}...", id);

    let outcome = follow(&manager, &mut events, &QrSink::new(qr_out)).await?;
    if outcome.stopped.iter().any(|s| s == id) {
        anyhow::bail!("Session {} did not connect", id);
    }
    Ok(())
}

/// What `wasuite qr` found for a session
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum QrLookup {
    Code(String),
    /// The backend is still generating one
    Pending,
    AlreadyConnected(Option<String>),
}

/// Check the session first so unknown or connected ids don't sit through
/// the QR wait loop.
pub(crate) async fn lookup_qr(
    manager: &ConnectionManager,
    id: &str,
    refresh: bool,
) -> crate::api::Result<QrLookup> {
    let session = manager.fetch_session(id).await?;
    if session.status == SessionStatus::Connected {
        return Ok(QrLookup::AlreadyConnected(
            session.connected_phone().map(str::to_string),
        ));
    }

    let result = if refresh {
        manager.regenerate_qr(id).await
    } else {
        manager.open_qr(id).await
    };
    manager.close_qr(id);

    Ok(match result? {
        Some(code) => QrLookup::Code(code),
        None => QrLookup::Pending,
    })
}

/// Show (or regenerate) the QR code of a session
pub(crate) async fn cmd_qr(
    config: &Config,
    id: &str,
    refresh: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let (manager, _events) = build_manager(config)?;

    if refresh {
        println!("🔄 Requesting a new QR code for {}...", id);
    }
    let result = lookup_qr(&manager, id, refresh).await;
    manager.shutdown().await;

    match result {
        Ok(QrLookup::Code(code)) => QrSink::new(out).show(id, &code),
        Ok(QrLookup::Pending) => {
            println!("⏳ QR code for {} is still being generated. Try again shortly.", id);
            Ok(())
        }
        Ok(QrLookup::AlreadyConnected(phone)) => {
            match phone {
                Some(phone) => println!("✅ Session {} is already connected as {}", id, phone),
                None => println!("✅ Session {} is already connected", id),
            }
            Ok(())
        }
        Err(ApiError::NotFound(_)) => anyhow::bail!("Session {} not found", id),
        Err(e) => anyhow::bail!(notification_for_error(&e).message),
    }
}

/// Resume tracking of every session that is still pairing
pub(crate) async fn cmd_watch(config: &Config) -> Result<()> {
    let (manager, mut events) = build_manager(config)?;

    let started = match manager.load().await {
        Ok(started) => started,
        Err(e) => {
            manager.shutdown().await;
            anyhow::bail!(notification_for_error(&e).message);
        }
    };

    if started.is_empty() {
        println!("✅ No sessions are waiting to pair");
        manager.shutdown().await;
        return Ok(());
    }

    println!("👀 Watching {} session(s): {}", started.len(), started.join(", "));
    let outcome = follow(&manager, &mut events, &QrSink::default()).await?;
    println!(
        "\n{} connected, {} stopped",
        outcome.connected.len(),
        outcome.stopped.len()
    );
    Ok(())
}

pub(crate) async fn cmd_disconnect(config: &Config, id: &str) -> Result<()> {
    let (manager, _events) = build_manager(config)?;
    let result = manager.disconnect(id).await;
    manager.shutdown().await;
    result.map_err(|e| anyhow::anyhow!(notification_for_error(&e).message))?;
    println!("✅ Session {} disconnected", id);
    Ok(())
}

pub(crate) async fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    let (manager, _events) = build_manager(config)?;
    let result = manager.delete(id).await;
    manager.shutdown().await;
    result.map_err(|e| anyhow::anyhow!(notification_for_error(&e).message))?;
    println!("🗑️  Session {} deleted", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{ScriptedApi, Step};
    use std::time::Duration;

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(100),
            max_duration: Some(Duration::from_secs(10)),
            qr_retry_attempts: 2,
            qr_retry_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_format_row() {
        let session = Session::new("s1", "Sales", SessionType::Sales, SessionStatus::Connected)
            .with_phone("+5511999999999");
        let row = format_row(&session);
        assert!(row.contains("Connected"));
        assert!(row.contains("+5511999999999"));
        assert!(row.contains("never"));
    }

    #[test]
    fn test_qr_sink_saves_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qr.png");
        QrSink::new(Some(path.clone()))
            .show("s1", "data:image/png;base64,UE5H")
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PNG");
    }

    #[test]
    fn test_qr_sink_writes_pairing_string() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pairing.txt");
        QrSink::new(Some(path.clone()))
            .show("s1", "2@abc,def")
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2@abc,def");
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_until_connected() {
        let api = Arc::new(ScriptedApi::new());
        let (manager, mut events) = ConnectionManager::new(api.clone(), settings());
        let session = manager
            .create_session(CreateSessionInput::new("Sales", SessionType::Sales))
            .await
            .unwrap();
        api.script_status(
            &session.id,
            vec![
                Step::Status(SessionStatus::QrCode),
                Step::Connected("+15550001111"),
            ],
        );
        api.script_qr(&session.id, vec![Step::Qr("2@pairing")]);

        let outcome = follow(&manager, &mut events, &QrSink::default())
            .await
            .unwrap();
        assert_eq!(outcome.connected, vec![session.id.clone()]);
        assert!(outcome.stopped.is_empty());
        assert!(manager.polling_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_reports_failures() {
        let api = Arc::new(ScriptedApi::new());
        let (manager, mut events) = ConnectionManager::new(api.clone(), settings());
        api.set_sessions(vec![
            Session::new("a", "A", SessionType::Main, SessionStatus::Connecting),
            Session::new("b", "B", SessionType::Main, SessionStatus::QrCode),
        ]);
        api.script_status("a", vec![Step::Status(SessionStatus::Failed)]);
        api.script_status("b", vec![Step::NetworkError]);

        let started = manager.load().await.unwrap();
        assert_eq!(started.len(), 2);

        let mut outcome = follow(&manager, &mut events, &QrSink::default())
            .await
            .unwrap();
        outcome.stopped.sort();
        assert_eq!(outcome.stopped, vec!["a".to_string(), "b".to_string()]);
        assert!(outcome.connected.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_drains_simultaneous_endings() {
        let api = Arc::new(ScriptedApi::new());
        let (manager, mut events) = ConnectionManager::new(api.clone(), settings());
        for id in ["a", "b", "c"] {
            api.script_status(id, vec![Step::NetworkError]);
            assert!(manager.start_polling(id));
        }

        let mut outcome = follow(&manager, &mut events, &QrSink::default())
            .await
            .unwrap();
        outcome.stopped.sort();
        assert_eq!(outcome.stopped, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_qr() {
        let api = Arc::new(ScriptedApi::new());
        api.set_sessions(vec![
            Session::new("on", "On", SessionType::Main, SessionStatus::Connected)
                .with_phone("+15550002222"),
            Session::new("pair", "Pair", SessionType::Sales, SessionStatus::QrCode),
        ]);
        api.script_status("pair", vec![Step::Status(SessionStatus::QrCode)]);
        api.script_qr("pair", vec![Step::Qr("2@code")]);
        let (manager, _events) = ConnectionManager::new(api.clone(), settings());

        let err = lookup_qr(&manager, "ghost", false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(api.qr_calls("ghost"), 0);

        assert_eq!(
            lookup_qr(&manager, "on", false).await.unwrap(),
            QrLookup::AlreadyConnected(Some("+15550002222".to_string()))
        );
        assert_eq!(api.qr_calls("on"), 0);

        assert_eq!(
            lookup_qr(&manager, "pair", false).await.unwrap(),
            QrLookup::Code("2@code".to_string())
        );
        assert!(!manager.is_polling("pair"));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_follow_without_pollers_returns_immediately() {
        let api = Arc::new(ScriptedApi::new());
        let (manager, mut events) = ConnectionManager::new(api, settings());
        let outcome = follow(&manager, &mut events, &QrSink::default())
            .await
            .unwrap();
        assert_eq!(outcome, FollowOutcome::default());
    }
}
