//! Google Gemini client.
//!
//! Talks to `streamGenerateContent` with `alt=sse` and folds the streamed
//! text parts into a single reply.

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::StartupError;

use super::{ExchangeError, ModelClient, ModelSettings, Turn};

/// Stream of text deltas from one generation.
type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ExchangeError>> + Send>>;

/// Client for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: ModelSettings,
    endpoint: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiClient {
    /// Build a client from process settings.
    ///
    /// Fails when the key is blank, the base URL does not parse, or the HTTP
    /// client cannot be constructed.
    pub fn new(settings: ModelSettings) -> Result<Self, StartupError> {
        if settings.api_key.trim().is_empty() {
            return Err(StartupError::MissingCredential(
                crate::config::API_KEY_ENV.to_string(),
            ));
        }

        reqwest::Url::parse(&settings.base_url).map_err(|e| {
            StartupError::ModelInit(format!("invalid base URL {:?}: {e}", settings.base_url))
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StartupError::ModelInit(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            settings.base_url.trim_end_matches('/'),
            settings.model
        );

        Ok(Self {
            http,
            settings,
            endpoint,
        })
    }

    /// URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request<'a>(&self, history: &'a [Turn], new_message: &'a str) -> GenerateRequest<'a> {
        let mut contents: Vec<WireContent<'a>> = history
            .iter()
            .map(|turn| WireContent {
                role: turn.role().as_str(),
                parts: [WirePart { text: turn.text() }],
            })
            .collect();

        // The controller records the user turn before calling, so only send
        // the new message when it is not already the last turn.
        let already_sent = history.last().is_some_and(|last| {
            last.role() == super::TurnRole::User && last.text() == new_message
        });
        if !already_sent {
            contents.push(WireContent {
                role: "user",
                parts: [WirePart { text: new_message }],
            });
        }

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
            },
        }
    }

    async fn stream(&self, request: &GenerateRequest<'_>) -> Result<DeltaStream, ExchangeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ExchangeError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| ExchangeError::from_transport(&e))?;
            return Err(classify_status(status, &body));
        }

        let byte_stream = response.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| ExchangeError::from_transport(&e))?;
                buf.extend_from_slice(&chunk);

                while let Some((pos, sep)) = find_frame_end(&buf) {
                    let frame = buf.drain(..pos + sep).collect::<Vec<_>>();
                    for delta in parse_frame(&String::from_utf8_lossy(&frame))? {
                        yield delta;
                    }
                }
            }

            // Trailing frame without a blank line terminator.
            if !buf.is_empty() {
                for delta in parse_frame(&String::from_utf8_lossy(&buf))? {
                    yield delta;
                }
            }
        };

        Ok(Box::pin(out))
    }

    async fn collect(&self, request: &GenerateRequest<'_>) -> Result<Option<String>, ExchangeError> {
        let mut stream = self.stream(request).await?;
        let mut content = String::new();

        while let Some(delta) = stream.next().await {
            content.push_str(&delta?);
        }

        Ok((!content.is_empty()).then_some(content))
    }
}

#[async_trait::async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        history: &[Turn],
        new_message: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ExchangeError> {
        let request = self.build_request(history, new_message);

        tracing::debug!(
            model = %self.settings.model,
            content_count = request.contents.len(),
            timeout_secs = timeout.as_secs(),
            "Sending generation request"
        );

        match tokio::time::timeout(timeout, self.collect(&request)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ExchangeError::timeout(timeout)),
        }
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }
}

/// Map a non-success HTTP status and its body to an exchange error.
fn classify_status(status: StatusCode, body: &str) -> ExchangeError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let message = parsed
        .as_ref()
        .map_or_else(|| body.trim().to_string(), |r| r.error.message.clone());
    let invalid_key = body.contains("API_KEY_INVALID") || message.contains("API key not valid");

    match status.as_u16() {
        400 if invalid_key => ExchangeError::auth(format!("Authentication failed: {message}")),
        400 => ExchangeError::invalid_request(format!("Invalid request: {message}")),
        401 | 403 => ExchangeError::auth(format!("Authentication failed: {message}")),
        429 => ExchangeError::quota(format!("Quota exceeded: {message}")),
        500..=599 => ExchangeError::server(format!("Server error: {message}")),
        _ => ExchangeError::unknown(format!("HTTP {status}: {message}")),
    }
}

/// Find the end of the next SSE frame, returning its offset and separator length.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Extract text deltas from one SSE frame.
fn parse_frame(frame: &str) -> Result<Vec<String>, ExchangeError> {
    let mut deltas = Vec::new();

    for line in frame.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        let chunk: GenerateResponse = serde_json::from_str(data)
            .map_err(|e| ExchangeError::malformed(format!("Failed to parse frame: {e}")))?;

        if let Some(reason) = chunk
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            tracing::warn!(block_reason = %reason, "Prompt blocked by provider");
        }

        let text = chunk.text();
        if !text.is_empty() {
            deltas.push(text);
        }
    }

    Ok(deltas)
}

// Gemini wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: [WirePart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
