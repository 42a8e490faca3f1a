//! Application Configuration Module
//!
//! Loads settings for the TuneGram service from environment variables (and a
//! `.env` file during development) into a single struct.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use tracing::Level;
use tunegram_core::config::{DEFAULT_WELCOME, SessionConfig};
use tunegram_core::form::FormField;
use tunegram_core::voice_api::ListenOptions;

/// Output buffer size, in milliseconds of device audio.
pub const OUTPUT_BUFFER_MS: usize = 1000;

pub const DEFAULT_VOICE_ID: &str = "a0e99841-438c-4a64-b679-ae501e7d6091";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub cartesia_api_key: Option<SecretString>,
    pub cartesia_model: String,
    pub voice_id: String,
    pub silence_timeout: Duration,
    pub section_pause: Duration,
    pub max_reprompts: u32,
    pub required_fields: Vec<FormField>,
    pub optional_fields: Vec<FormField>,
    pub review_before_compose: bool,
    pub fill_untargeted: bool,
    pub welcome_message: String,
    pub listen_language: String,
    pub chunk_chars: usize,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid number for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("Invalid {var}: {reason}")]
    InvalidFields { var: &'static str, reason: String },
    #[error("Invalid flag for {var}: {value:?} (expected true or false)")]
    InvalidFlag { var: &'static str, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `CARTESIA_API_KEY`: Secret key for the Cartesia TTS API. Required unless `require_api_key` is false.
    // *   `CARTESIA_MODEL`: (Optional) TTS model. Defaults to "sonic-2".
    // *   `TUNEGRAM_VOICE_ID`: (Optional) Cartesia voice id.
    // *   `SILENCE_TIMEOUT_MS`: (Optional) Quiet period that ends an answer. Defaults to 1500.
    // *   `SECTION_PAUSE_MS`: (Optional) Pause between song sections. Defaults to 500.
    // *   `MAX_REPROMPTS`: (Optional) Re-asks before a fallback value is used. Defaults to 2.
    // *   `REQUIRED_FIELDS`: (Optional) Comma-separated field ids, e.g. "characterName,topic".
    // *   `OPTIONAL_FIELDS`: (Optional) Fields asked after the required ones. Defaults to "additionalDetails"; empty asks none.
    // *   `REVIEW_BEFORE_COMPOSE`: (Optional) Read the answers back before composing. Defaults to true.
    // *   `FILL_UNTARGETED`: (Optional) Fill other empty fields from any answer. Defaults to false.
    // *   `WELCOME_MESSAGE`: (Optional) First line spoken after start.
    // *   `LISTEN_LANGUAGE`: (Optional) Recognition language passed to the transcript source. Defaults to "en-US".
    // *   `CHUNK_CHARS`: (Optional) Longest text sent in one TTS request. Defaults to 1000.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env(require_api_key: bool) -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok(), require_api_key)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        require_api_key: bool,
    ) -> Result<Self, ConfigError> {
        let cartesia_api_key = lookup("CARTESIA_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        if require_api_key && cartesia_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "CARTESIA_API_KEY must be set unless running with --text-only".to_string(),
            ));
        }

        let cartesia_model = lookup("CARTESIA_MODEL").unwrap_or_else(|| "sonic-2".to_string());
        let voice_id = lookup("TUNEGRAM_VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string());

        let silence_timeout =
            Duration::from_millis(parse_number(&lookup, "SILENCE_TIMEOUT_MS", 1500)?);
        let section_pause = Duration::from_millis(parse_number(&lookup, "SECTION_PAUSE_MS", 500)?);
        let max_reprompts = parse_number(&lookup, "MAX_REPROMPTS", 2)?;
        let chunk_chars = parse_number(&lookup, "CHUNK_CHARS", 1000)?;

        let required_fields = match lookup("REQUIRED_FIELDS") {
            Some(list) => parse_fields("REQUIRED_FIELDS", &list, false)?,
            None => FormField::REQUIRED.to_vec(),
        };
        let optional_fields = match lookup("OPTIONAL_FIELDS") {
            Some(list) => parse_fields("OPTIONAL_FIELDS", &list, true)?,
            None => vec![FormField::AdditionalDetails],
        };
        let review_before_compose = parse_flag(&lookup, "REVIEW_BEFORE_COMPOSE", true)?;
        let fill_untargeted = parse_flag(&lookup, "FILL_UNTARGETED", false)?;
        let welcome_message = lookup("WELCOME_MESSAGE")
            .filter(|line| !line.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WELCOME.to_string());
        let listen_language = lookup("LISTEN_LANGUAGE")
            .filter(|language| !language.trim().is_empty())
            .unwrap_or_else(|| ListenOptions::default().language);

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            cartesia_api_key,
            cartesia_model,
            voice_id,
            silence_timeout,
            section_pause,
            max_reprompts,
            required_fields,
            optional_fields,
            review_before_compose,
            fill_untargeted,
            welcome_message,
            listen_language,
            chunk_chars,
            log_level,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_voice_id(self.voice_id.clone())
            .with_silence_timeout(self.silence_timeout)
            .with_max_reprompts(self.max_reprompts)
            .with_chunk_chars(self.chunk_chars)
            .with_required_fields(self.required_fields.iter().copied())
            .with_optional_fields(self.optional_fields.iter().copied())
            .with_review_before_compose(self.review_before_compose)
            .with_section_pause(self.section_pause)
            .with_fill_untargeted(self.fill_untargeted)
            .with_welcome_message(self.welcome_message.clone())
            .with_listen_options(ListenOptions {
                language: self.listen_language.clone(),
                ..ListenOptions::default()
            })
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { var, value }),
    }
}

fn parse_fields(
    var: &'static str,
    list: &str,
    allow_empty: bool,
) -> Result<Vec<FormField>, ConfigError> {
    let fields = list
        .split(',')
        .filter(|id| !id.trim().is_empty())
        .map(|id| id.parse::<FormField>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::InvalidFields {
            var,
            reason: e.to_string(),
        })?;
    if fields.is_empty() && !allow_empty {
        return Err(ConfigError::InvalidFields {
            var,
            reason: format!("{list:?} names no fields"),
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], require_api_key: bool) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned(), require_api_key)
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[("CARTESIA_API_KEY", "sk-test")], true).unwrap();

        assert_eq!(config.cartesia_api_key.as_ref().unwrap().expose_secret(), "sk-test");
        assert_eq!(config.cartesia_model, "sonic-2");
        assert_eq!(config.voice_id, DEFAULT_VOICE_ID);
        assert_eq!(config.silence_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_reprompts, 2);
        assert_eq!(config.chunk_chars, 1000);
        assert_eq!(config.required_fields, FormField::REQUIRED.to_vec());
        assert_eq!(config.optional_fields, vec![FormField::AdditionalDetails]);
        assert!(config.review_before_compose);
        assert!(!config.fill_untargeted);
        assert_eq!(config.section_pause, Duration::from_millis(500));
        assert_eq!(config.welcome_message, DEFAULT_WELCOME);
        assert_eq!(config.session_config().listen_options, ListenOptions::default());
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn api_key_is_only_required_for_audio() {
        assert!(matches!(load(&[], true), Err(ConfigError::MissingVar(_))));
        assert!(load(&[], false).unwrap().cartesia_api_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(
            &[
                ("SILENCE_TIMEOUT_MS", "900"),
                ("MAX_REPROMPTS", "0"),
                ("REQUIRED_FIELDS", "topic, characterName"),
                ("RUST_LOG", "debug"),
                ("SECTION_PAUSE_MS", "0"),
                ("FILL_UNTARGETED", "yes"),
                ("WELCOME_MESSAGE", "Hi, let's write a song."),
                ("LISTEN_LANGUAGE", "en-GB"),
            ],
            false,
        )
        .unwrap();

        assert_eq!(config.silence_timeout, Duration::from_millis(900));
        assert_eq!(config.max_reprompts, 0);
        assert_eq!(config.log_level, Level::DEBUG);
        let session = config.session_config();
        assert_eq!(
            session.required_fields,
            vec![FormField::CharacterName, FormField::Topic]
        );
        assert_eq!(session.section_pause, Duration::ZERO);
        assert!(session.fill_untargeted);
        assert_eq!(session.welcome_message, "Hi, let's write a song.");
        assert_eq!(session.listen_options.language, "en-GB");
        assert!(session.listen_options.interim_results);
    }

    #[test]
    fn optional_fields_and_review_can_be_turned_off() {
        let config = load(
            &[("OPTIONAL_FIELDS", ""), ("REVIEW_BEFORE_COMPOSE", "off")],
            false,
        )
        .unwrap();

        let session = config.session_config();
        assert!(session.optional_fields.is_empty());
        assert!(!session.review_before_compose);
        assert_eq!(session.asked_fields(), FormField::REQUIRED.to_vec());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("CHUNK_CHARS", "lots")], false),
            Err(ConfigError::InvalidNumber { var: "CHUNK_CHARS", .. })
        ));
        assert!(matches!(
            load(&[("REQUIRED_FIELDS", "name,tempo")], false),
            Err(ConfigError::InvalidFields { var: "REQUIRED_FIELDS", .. })
        ));
        assert!(matches!(
            load(&[("REQUIRED_FIELDS", " , ")], false),
            Err(ConfigError::InvalidFields { var: "REQUIRED_FIELDS", .. })
        ));
        assert!(matches!(
            load(&[("OPTIONAL_FIELDS", "mood")], false),
            Err(ConfigError::InvalidFields { var: "OPTIONAL_FIELDS", .. })
        ));
        assert!(matches!(
            load(&[("REVIEW_BEFORE_COMPOSE", "sometimes")], false),
            Err(ConfigError::InvalidFlag { var: "REVIEW_BEFORE_COMPOSE", .. })
        ));
        assert!(matches!(
            load(&[("RUST_LOG", "loud")], false),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
