use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::StartupError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, ModelSettings};
use crate::session::{DEFAULT_GREETING, DEFAULT_INSTRUCTION, PrimingPair};

/// Environment variable holding the model credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Prefix for layered environment overrides, e.g. `DIAGNOSA_SERVER__PORT`.
pub const ENV_PREFIX: &str = "DIAGNOSA";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

/// How log events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub session: SessionConfig,
    pub persona: PersonaConfig,
    pub resilience: ResilienceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub exchange_timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("exchange_timeout_secs", &self.exchange_timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Page copy and the priming pair.
#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    pub title: String,
    pub intro: String,
    pub placeholder: String,
    pub busy_label: String,
    pub instruction: String,
    pub greeting: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    /// Outer HTTP deadline; raised to cover a queued exchange if set lower.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load() -> Result<Self, StartupError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("model.name", DEFAULT_MODEL)?
            .set_default("model.base_url", DEFAULT_BASE_URL)?
            .set_default("model.temperature", 0.4)?
            .set_default("model.max_output_tokens", 500)?
            .set_default("model.exchange_timeout_secs", 60)?
            .set_default("session.idle_timeout_secs", 30 * 60)?
            .set_default("session.sweep_interval_secs", 60)?
            .set_default("persona.title", "Earthquake Expert Chatbot")?
            .set_default(
                "persona.intro",
                "Ask me anything about earthquakes: causes, warning signs, impacts and safety.",
            )?
            .set_default("persona.placeholder", "Ask about earthquakes...")?
            .set_default("persona.busy_label", "Looking for answers...")?
            .set_default("persona.instruction", DEFAULT_INSTRUCTION)?
            .set_default("persona.greeting", DEFAULT_GREETING)?
            .set_default("resilience.request_timeout_secs", 90)?
            .set_default("logging.format", LogFormat::Text.as_str())?;

        // 2. Config file: explicit path is required, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. DIAGNOSA_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks) win over everything
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(key) = cli.api_key.filter(|k| !k.trim().is_empty()) {
            builder = builder.set_override("model.api_key", key)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("logging.format", format.as_str())?;
        }

        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Settings for the model client; fails when no credential was supplied.
    pub fn model_settings(&self) -> Result<ModelSettings, StartupError> {
        let api_key = self
            .model
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StartupError::MissingCredential(API_KEY_ENV.to_string()))?;

        Ok(ModelSettings {
            base_url: self.model.base_url.clone(),
            api_key,
            model: self.model.name.clone(),
            temperature: self.model.temperature,
            max_output_tokens: self.model.max_output_tokens,
            exchange_timeout: self.exchange_timeout(),
        })
    }

    #[must_use]
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.model.exchange_timeout_secs)
    }

    /// Outer HTTP deadline.
    ///
    /// A submission may wait up to one exchange timeout for the session to
    /// free up and then spend another on the model call, so the deadline is
    /// never shorter than twice the exchange timeout plus slack.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        let floor = self.model.exchange_timeout_secs.saturating_mul(2) + 5;
        Duration::from_secs(self.resilience.request_timeout_secs.max(floor))
    }

    #[must_use]
    pub fn priming(&self) -> PrimingPair {
        PrimingPair {
            instruction: self.persona.instruction.clone(),
            greeting: self.persona.greeting.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
            },
            model: ModelConfig {
                name: DEFAULT_MODEL.to_string(),
                base_url: DEFAULT_BASE_URL.to_string(),
                temperature: 0.4,
                max_output_tokens: 500,
                exchange_timeout_secs: 60,
                api_key: key.map(ToString::to_string),
            },
            session: SessionConfig {
                idle_timeout_secs: 1800,
                sweep_interval_secs: 60,
            },
            persona: PersonaConfig {
                title: "t".to_string(),
                intro: "i".to_string(),
                placeholder: "p".to_string(),
                busy_label: "b".to_string(),
                instruction: DEFAULT_INSTRUCTION.to_string(),
                greeting: DEFAULT_GREETING.to_string(),
            },
            resilience: ResilienceConfig {
                request_timeout_secs: 10,
            },
            logging: LoggingConfig {
                format: LogFormat::Text,
            },
        }
    }

    #[test]
    fn test_missing_credential() {
        for key in [None, Some(""), Some("   ")] {
            let err = config_with_key(key).model_settings().unwrap_err();
            assert!(matches!(err, StartupError::MissingCredential(ref var) if var == API_KEY_ENV));
            assert!(err.to_string().contains(API_KEY_ENV));
        }
    }

    #[test]
    fn test_model_settings() {
        let settings = config_with_key(Some("abc")).model_settings().unwrap();
        assert_eq!(settings.api_key, "abc");
        assert_eq!(settings.max_output_tokens, 500);
        assert_eq!(settings.exchange_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_request_timeout_floor() {
        let mut config = config_with_key(None);
        assert_eq!(config.request_timeout(), Duration::from_secs(125));

        config.resilience.request_timeout_secs = 300;
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", config_with_key(Some("very-secret")));
        assert!(!rendered.contains("very-secret"));
    }
}
