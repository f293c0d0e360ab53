//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::interview::SessionPolicy;
use crate::llm::{CompletionsClient, CompletionsConfig};
use crate::llm::openai::DEFAULT_COMPLETIONS_URL;
use crate::questions::{GenerativeQuestions, QuestionSource, StaticQuestions};

/// Signing keys shorter than this are rejected.
pub const MIN_SECRET_LEN: usize = 64;

/// Which question strategy the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionSourceKind {
    Static,
    Generative,
}

impl FromStr for QuestionSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "generative" => Ok(Self::Generative),
            other => Err(format!("expected `static` or `generative`, got `{other}`")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Browser origin allowed to call the API with credentials.
    pub frontend_url: Option<String>,
    /// Cookie signing secret. A random key is used when unset.
    pub session_secret: Option<SecretString>,
    pub session_ttl: chrono::Duration,
    pub touch_after: chrono::Duration,
    pub cookie_secure: bool,
    pub question_source: QuestionSourceKind,
    /// Newline-separated question list for the static source.
    pub questions_file: Option<PathBuf>,
    pub completions: CompletionsConfig,
    /// How often expired sessions are deleted.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/interview.db"),
            frontend_url: None,
            session_secret: None,
            session_ttl: chrono::Duration::days(7),
            touch_after: chrono::Duration::seconds(86_400),
            cookie_secure: false,
            question_source: QuestionSourceKind::Static,
            questions_file: None,
            completions: CompletionsConfig::default(),
            sweep_interval: crate::store::sweep::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Parse `key` with `FromStr`, falling back to `default` when unset.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> std::result::Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, one variable at a time.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();

        let ttl_days: i64 = parse_or(&lookup, "INTERVIEW_SESSION_TTL_DAYS", 7)?;
        if ttl_days <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "INTERVIEW_SESSION_TTL_DAYS".to_string(),
                message: "must be positive".to_string(),
            });
        }
        let touch_after_secs: u32 = parse_or(&lookup, "INTERVIEW_TOUCH_AFTER_SECS", 86_400)?;
        let timeout_secs: u64 = parse_or(&lookup, "INTERVIEW_GENERATION_TIMEOUT_SECS", 60)?;

        let completions = CompletionsConfig {
            api_key: non_empty(&lookup, "OPENAI_API_KEY").map(SecretString::from),
            model: non_empty(&lookup, "INTERVIEW_MODEL").unwrap_or(defaults.completions.model),
            url: non_empty(&lookup, "INTERVIEW_COMPLETIONS_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETIONS_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let question_source: QuestionSourceKind =
            parse_or(&lookup, "INTERVIEW_QUESTION_SOURCE", QuestionSourceKind::Static)?;
        if question_source == QuestionSourceKind::Generative && completions.api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }

        let session_secret = non_empty(&lookup, "INTERVIEW_SESSION_SECRET").map(SecretString::from);
        if let Some(secret) = &session_secret {
            if secret.expose_secret().len() < MIN_SECRET_LEN {
                return Err(ConfigError::InvalidValue {
                    key: "INTERVIEW_SESSION_SECRET".to_string(),
                    message: format!("must be at least {MIN_SECRET_LEN} bytes"),
                });
            }
        }

        Ok(Self {
            port: parse_or(&lookup, "INTERVIEW_PORT", defaults.port)?,
            db_path: non_empty(&lookup, "INTERVIEW_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            frontend_url: non_empty(&lookup, "INTERVIEW_FRONTEND_URL"),
            session_secret,
            session_ttl: chrono::Duration::days(ttl_days),
            touch_after: chrono::Duration::seconds(i64::from(touch_after_secs)),
            cookie_secure: parse_or(&lookup, "INTERVIEW_COOKIE_SECURE", false)?,
            question_source,
            questions_file: non_empty(&lookup, "INTERVIEW_QUESTIONS_FILE").map(PathBuf::from),
            completions,
            sweep_interval: defaults.sweep_interval,
        })
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: self.session_ttl,
            touch_after: self.touch_after,
        }
    }

    /// The key that signs session cookies.
    ///
    /// Without a configured secret a random key is generated, so sessions do
    /// not survive a restart.
    pub fn cookie_key(&self) -> std::result::Result<Key, ConfigError> {
        match &self.session_secret {
            Some(secret) => Key::try_from(secret.expose_secret().as_bytes()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "INTERVIEW_SESSION_SECRET".to_string(),
                    message: e.to_string(),
                }
            }),
            None => {
                warn!("INTERVIEW_SESSION_SECRET not set, sessions will not survive a restart");
                Ok(Key::generate())
            }
        }
    }

    /// Construct the configured question source.
    pub fn build_question_source(&self) -> Result<Arc<dyn QuestionSource>> {
        match self.question_source {
            QuestionSourceKind::Static => {
                let questions = match &self.questions_file {
                    Some(path) => StaticQuestions::from_file(path)?,
                    None => StaticQuestions::default(),
                };
                Ok(Arc::new(questions))
            }
            QuestionSourceKind::Generative => {
                let client = CompletionsClient::new(self.completions.clone())?;
                Ok(Arc::new(GenerativeQuestions::new(client)))
            }
        }
    }
}

/// Terminal client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Delay between revealed characters.
    pub typing_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            typing_interval: Duration::from_millis(50),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        let typing_ms: u64 = parse_or(&lookup, "CHAT_TYPING_MS", 50)?;
        Ok(Self {
            server_url: non_empty(&lookup, "CHAT_SERVER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            typing_interval: Duration::from_millis(typing_ms),
        })
    }
}
