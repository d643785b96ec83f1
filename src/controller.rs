//! Exchange handling for a single chat session.
//!
//! The [`SessionController`] turns one user submission into at most two
//! appended turns. Model failures are caught here and reported as an
//! [`ExchangeNotice`]; they never end the session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::llm::{ExchangeError, ExchangeErrorKind, ModelClient};
use crate::session::{DisplayEntry, Session};

/// Stored in place of an empty model reply.
pub const FALLBACK_REPLY: &str = "Sorry, no reply available.";

/// Generic explanation shown with every failed exchange.
pub const FAILURE_HINT: &str =
    "Possible causes: a connection problem, an invalid API key, or an exceeded quota.";

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Blank input; nothing recorded, model not called.
    Ignored,
    /// The model replied with text.
    Replied,
    /// The model answered without text; [`FALLBACK_REPLY`] was recorded.
    Fallback,
    /// The model call failed; only the user turn was recorded.
    Failed(ExchangeNotice),
}

impl ExchangeOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Replied => "replied",
            Self::Fallback => "fallback",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn notice(&self) -> Option<&ExchangeNotice> {
        match self {
            Self::Failed(notice) => Some(notice),
            _ => None,
        }
    }
}

/// User-visible annotation for a failed exchange.
///
/// Shown once alongside the page that reports the failure; never stored in
/// the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeNotice {
    pub kind: &'static str,
    pub message: String,
    pub hint: &'static str,
}

impl From<&ExchangeError> for ExchangeNotice {
    fn from(err: &ExchangeError) -> Self {
        Self {
            kind: err.kind.as_str(),
            message: format!("Sorry, something went wrong while talking to the model: {err}"),
            hint: FAILURE_HINT,
        }
    }
}

/// Result of [`SessionController::on_user_submit`].
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub outcome: ExchangeOutcome,
    /// Display log after the exchange, for re-rendering.
    pub display: Vec<DisplayEntry>,
}

/// Drives exchanges between sessions and the shared model client.
#[derive(Clone)]
pub struct SessionController {
    client: Arc<dyn ModelClient>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("model", &self.client.model_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionController {
    pub fn new(client: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Run one exchange for `session`.
    ///
    /// A second submission to the same session waits for the running one to
    /// finish. The wait and the model call are each bounded by the exchange
    /// timeout; a wait that runs out is reported as a timed-out exchange with
    /// nothing recorded.
    pub async fn on_user_submit(&self, session: &Session, text: &str) -> ExchangeReport {
        if text.trim().is_empty() {
            tracing::debug!(session_id = %session.id(), "Ignoring blank submission");
            return ExchangeReport {
                outcome: ExchangeOutcome::Ignored,
                display: session.display(),
            };
        }

        let Ok(_slot) = tokio::time::timeout(self.timeout, session.begin_exchange()).await else {
            let err = ExchangeError::new(
                ExchangeErrorKind::Timeout,
                format!(
                    "previous message still being answered after {}s",
                    self.timeout.as_secs()
                ),
            );
            tracing::warn!(
                name: "exchange.failed",
                session_id = %session.id(),
                kind = %err.kind,
                error = %err,
                "Session busy, submission dropped"
            );
            return ExchangeReport {
                outcome: ExchangeOutcome::Failed(ExchangeNotice::from(&err)),
                display: session.display(),
            };
        };

        let history = {
            let mut conversation = session.conversation();
            conversation.append_user(text);
            conversation.snapshot_for_model()
        };
        let started = Instant::now();

        tracing::info!(
            session_id = %session.id(),
            history_len = history.len(),
            "Starting exchange"
        );

        let result = self.client.generate(&history, text, self.timeout).await;

        let mut conversation = session.conversation();
        let outcome = match result {
            Ok(Some(reply)) if !reply.trim().is_empty() => {
                conversation.append_model(reply);
                ExchangeOutcome::Replied
            }
            Ok(_) => {
                tracing::warn!(session_id = %session.id(), "Model returned no text, using fallback");
                conversation.append_model(FALLBACK_REPLY);
                ExchangeOutcome::Fallback
            }
            Err(err) => {
                tracing::error!(
                    name: "exchange.failed",
                    session_id = %session.id(),
                    kind = %err.kind,
                    error = %err,
                    duration_ms = %started.elapsed().as_millis(),
                    "Exchange failed"
                );
                ExchangeOutcome::Failed(ExchangeNotice::from(&err))
            }
        };

        if !matches!(outcome, ExchangeOutcome::Failed(_)) {
            tracing::info!(
                name: "exchange.completed",
                session_id = %session.id(),
                outcome = outcome.as_str(),
                turn_count = conversation.turn_count(),
                duration_ms = %started.elapsed().as_millis(),
                "Exchange completed"
            );
        }

        let display = conversation.snapshot_for_display();
        drop(conversation);
        session.touch();
        ExchangeReport { outcome, display }
    }
}
