//! Diagnosa
//!
//! A single-page chat service that forwards user text to a hosted Gemini
//! model and renders the reply. Every browser session gets its own
//! in-memory conversation, seeded with a fixed persona.
//!
//! # Architecture
//!
//! - **Server**: Axum router rendering the page and a small JSON API
//! - **Controller**: one exchange per submission, failures reported inline
//! - **Sessions**: in-memory, append-only conversation logs
//! - **Model client**: Gemini `streamGenerateContent` over SSE
//!
//! # Modules
//!
//! - [`config`]: layered configuration (defaults, file, env, CLI)
//! - [`controller`]: exchange logic
//! - [`error`]: fatal startup errors
//! - [`llm`]: model client trait and the Gemini implementation
//! - [`server`]: HTTP routes and server startup
//! - [`session`]: conversation and session management
//! - [`ui`]: HTML rendering

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod ui;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::controller::SessionController;
use crate::session::SessionStore;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Exchange driver bound to the shared model client.
    pub controller: Arc<SessionController>,
    /// Live chat sessions.
    pub sessions: SessionStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, controller: SessionController) -> Self {
        Self {
            controller: Arc::new(controller),
            sessions: SessionStore::new(config.priming()),
            config,
        }
    }
}
