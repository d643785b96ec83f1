use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::config::AppConfig;
use crate::controller::{ExchangeNotice, SessionController};
use crate::session::{DisplayEntry, Session, SessionStore};
use crate::ui::ChatPage;

/// Cookie carrying the browser's session id.
pub const SESSION_COOKIE: &str = "diagnosa_session";

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    controller: SessionController,
) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&config), controller);

    let sweeper = spawn_session_sweeper(
        state.sessions.clone(),
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Build the router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let timeout_duration = state.config.request_timeout();

    Router::new()
        .route("/", get(index_handler).post(submit_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/api/chat", axum::routing::post(api_chat))
        .route("/api/sessions/{id}", axum::routing::delete(api_delete_session))
        .route("/api/sessions/{id}/messages", get(api_get_messages))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_elapsed) => {
                        (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
                    }
                }
            },
        ))
        .with_state(state)
}

/// Periodically discard sessions idle longer than `idle_timeout`.
pub fn spawn_session_sweeper(
    sessions: SessionStore,
    idle_timeout: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle_timeout);
            if removed > 0 {
                info!(
                    name: "session.expired",
                    removed = removed,
                    remaining = sessions.len(),
                    "Discarded idle sessions"
                );
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Look up the cookie's session, or start a new one and set the cookie.
fn resolve_session(sessions: &SessionStore, jar: CookieJar) -> (CookieJar, Session) {
    if let Some(id) = jar
        .get(SESSION_COOKIE)
        .map(Cookie::value)
        .filter(|id| Uuid::parse_str(id).is_ok())
    {
        let session = sessions.initialize(id);
        return (jar, session);
    }

    let session = sessions.create();
    let cookie = Cookie::build((SESSION_COOKIE, session.id().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), session)
}

fn render_page(
    state: &AppState,
    messages: &[DisplayEntry],
    notice: Option<&ExchangeNotice>,
) -> Html<String> {
    Html(
        ChatPage {
            persona: &state.config.persona,
            messages,
            notice,
        }
        .render(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Form body posted by the page.
#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    message: String,
}

/// GET / - Render the chat page for this browser's session.
async fn index_handler(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = resolve_session(&state.sessions, jar);
    let messages = session.display();
    (jar, render_page(&state, &messages, None))
}

/// POST / - Run one exchange and render the updated page.
async fn submit_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SubmitForm>,
) -> impl IntoResponse {
    let (jar, session) = resolve_session(&state.sessions, jar);
    let report = state.controller.on_user_submit(&session, &form.message).await;
    (
        jar,
        render_page(&state, &report.display, report.outcome.notice()),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User message content.
    message: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    session_id: Option<String>,
}

/// Response from chat API.
#[derive(Debug, Serialize)]
struct ChatResponse {
    /// Session ID for this conversation.
    session_id: String,
    /// `ignored`, `replied`, `fallback` or `failed`.
    status: &'static str,
    /// Display log after the exchange.
    messages: Vec<MessageDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ExchangeNotice>,
}

/// Message DTO for API responses.
#[derive(Debug, Serialize)]
struct MessageDto {
    role: &'static str,
    content: String,
}

impl From<DisplayEntry> for MessageDto {
    fn from(entry: DisplayEntry) -> Self {
        Self {
            role: entry.role.as_str(),
            content: entry.text,
        }
    }
}

/// POST /api/chat - Run one exchange and return the updated history.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    tracing::info!(
        message_length = req.message.len(),
        session_id = ?req.session_id,
        "Received chat request"
    );

    let session = match req.session_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) if Uuid::parse_str(id).is_ok() => state.sessions.initialize(id),
        Some(id) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Invalid session id: {id:?}"),
            ));
        }
        None => {
            let session = state.sessions.create();
            tracing::debug!(session_id = %session.id(), "Created new session");
            session
        }
    };

    let report = state.controller.on_user_submit(&session, &req.message).await;
    let error = report.outcome.notice().cloned();

    Ok(Json(ChatResponse {
        session_id: session.id().to_string(),
        status: report.outcome.as_str(),
        messages: report.display.into_iter().map(MessageDto::from).collect(),
        error,
    }))
}

/// GET /api/sessions/:id/messages - Get the session's display log.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, StatusCode> {
    match state.sessions.get(&id) {
        Some(session) => {
            let messages = session
                .display()
                .into_iter()
                .map(MessageDto::from)
                .collect();
            Ok(Json(messages))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// DELETE /api/sessions/:id - End a session.
async fn api_delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(session) => {
            tracing::info!(
                session_id = %id,
                age_secs = session.age().as_secs(),
                "Session ended"
            );
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
