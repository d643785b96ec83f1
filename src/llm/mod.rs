//! Model client abstraction and the Gemini implementation.
//!
//! The [`ModelClient`] trait is the only seam between a chat session and the
//! hosted model. The controller hands it the full turn history plus the new
//! user message and receives either generated text or an [`ExchangeError`].
//!
//! # Clients
//!
//! - [`GeminiClient`]: Google Gemini `streamGenerateContent` over SSE
//!
//! # Example
//!
//! ```rust,ignore
//! use diagnosa::llm::{ModelSettings, shared_client};
//!
//! let client = shared_client(&settings)?;
//! let reply = client.generate(&history, "01/01", settings.exchange_timeout).await?;
//! ```

pub mod error;
pub mod gemini;

pub use error::{ExchangeError, ExchangeErrorKind};
pub use gemini::GeminiClient;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Model connection and generation settings.
///
/// Fixed at process start; nothing a user submits can change them.
#[derive(Clone)]
pub struct ModelSettings {
    /// Base URL for the model API.
    pub base_url: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-1.5-flash`).
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens per reply.
    pub max_output_tokens: u32,
    /// Deadline for one exchange.
    pub exchange_timeout: Duration,
}

// The key is redacted so settings can be logged freely.
impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("exchange_timeout", &self.exchange_timeout)
            .finish()
    }
}

/// Author of a turn in the model-facing history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Text written by the user (the priming instruction counts as one).
    User,
    /// Text produced by the model (the canned greeting counts as one).
    Model,
}

impl TurnRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One message unit exchanged with the model.
///
/// Turns are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: TurnRole,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn role(&self) -> TurnRole {
        self.role
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A hosted chat model.
///
/// `Ok(None)` means the provider answered but produced no usable text.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate a reply to `new_message` given the prior `history`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] on timeout, transport failure, rejected
    /// credentials, exhausted quota or an undecodable response.
    async fn generate(
        &self,
        history: &[Turn],
        new_message: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ExchangeError>;

    /// Identifier of the model behind this client.
    fn model_id(&self) -> &str;
}

static MODEL_CLIENT: OnceLock<Arc<dyn ModelClient>> = OnceLock::new();

/// Return the process-wide model client, creating it on first use.
///
/// Later calls ignore `settings` and hand back the client built first.
pub fn shared_client(settings: &ModelSettings) -> Result<Arc<dyn ModelClient>, StartupError> {
    if let Some(client) = MODEL_CLIENT.get() {
        return Ok(Arc::clone(client));
    }

    let client: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(settings.clone())?);
    Ok(Arc::clone(MODEL_CLIENT.get_or_init(|| client)))
}
