//! wasuite - WhatsApp Suite Session Connector
//!
//! Client-side session connection manager for a WhatsApp CRM backend: it
//! creates pairing sessions, tracks each one with its own poller until it
//! connects or fails, and turns the cached state into what the user sees.
//!
//! ## Layout
//!
//! - **api:** REST client for the session endpoints, behind the [`SessionApi`] trait
//! - **session:** poll registry, [`ConnectionManager`], QR payloads and view projection
//! - **config / logging:** TOML + env configuration and tracing setup
//! - **cli:** the `wasuite` command-line front end
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a session and follow the pairing
//! wasuite create --name Sales --type SALES --watch
//!
//! # Resume tracking everything that is still pairing
//! wasuite watch
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use api::{ApiError, HttpSessionClient, Session, SessionApi, SessionStatus, SessionType};
pub use session::{ConnectionManager, PollSettings, SessionEvent, SessionView};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
