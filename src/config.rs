//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `EdtConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//!
//! Only the chat API triple (`api_key`, `api_base`, `model`) is mandatory; every
//! other field has a default suited to the Université de la Nouvelle-Calédonie
//! timetable export.
//!
//! # Examples
//!
//! ```no_run
//! use edt_assistant::config::{EdtConfig, load_config};
//!
//! let config: EdtConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::{error::Error, fs, num::NonZeroUsize, path::PathBuf};

use tracing::*;

/// Which [`Embedder`](crate::embedding::Embedder) to construct.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 through Candle.
    #[default]
    MiniLm,
    /// Offline blake3 bag-of-words hashing.
    Hashing,
}

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EdtConfig {
    /// The API key used to authenticate requests to the chat API.
    pub api_key: String,

    /// The base URL of the OpenAI compatible API.
    pub api_base: String,

    /// The chat model used for answers.
    pub model: String,

    // Maximum tokens of a generated answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,

    // ICS export URL, `{user_id}` is replaced by the login.
    #[serde(default = "default_feed_url_template")]
    pub feed_url_template: String,

    // Offset applied to UTC times of the feed (Nouméa is UTC+11, no DST).
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    // Directory of the persisted vector index; `<config_dir>/index` when unset.
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,

    // Only used by the hashing backend; MiniLM is always 384.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    // Default number of chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    // Token budget of the assembled context; unbounded when unset.
    #[serde(default)]
    pub context_token_budget: Option<usize>,

    // When set, logs are also appended to `<log_dir>/edt.log`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_max_tokens() -> u16 {
    2048
}

fn default_feed_url_template() -> String {
    "http://applis.univ-nc.nc/cgi-bin/WebObjects/EdtWeb.woa/2/wa/default?login={user_id}%2Fical"
        .to_string()
}

fn default_utc_offset_minutes() -> i32 {
    11 * 60
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_top_k() -> usize {
    65
}

impl EdtConfig {
    /// The configuration written by `edt init`.
    pub fn example() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            feed_url_template: default_feed_url_template(),
            utc_offset_minutes: default_utc_offset_minutes(),
            index_path: None,
            embedding_backend: EmbeddingBackend::default(),
            embedding_dimension: default_embedding_dimension(),
            top_k: default_top_k(),
            context_token_budget: None,
            log_dir: None,
        }
    }

    /// Fixed offset of the timetable's local time. Out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!("utc_offset_minutes {} out of range, using UTC", self.utc_offset_minutes);
            Utc.fix()
        })
    }

    /// Resolved index directory.
    pub fn index_dir(&self) -> Result<PathBuf, Box<dyn Error>> {
        match &self.index_path {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::config_dir()?.join("index")),
        }
    }

    /// `top_k`, clamped to at least one.
    pub fn top_k(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.top_k).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Returns
///
/// - `Ok(EdtConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
///
/// # Examples
///
/// ```no_run
/// use edt_assistant::config::load_config;
///
/// match load_config("/path/to/config.yaml") {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: &str) -> Result<EdtConfig, Box<dyn Error>> {
    debug!("Loading config: {:?}", file);
    let content = fs::read_to_string(file)?;
    let config: EdtConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com"
model: "example_model"
embedding_backend: hashing
embedding_dimension: 128
top_k: 3
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.api_key, "example_api_key");
        assert_eq!(config.api_base, "http://example.com");
        assert_eq!(config.model, "example_model");
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashing);
        assert_eq!(config.embedding_dimension, 128);
        assert_eq!(config.top_k().get(), 3);
        // Defaults.
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.utc_offset_minutes, 660);
        assert!(config.feed_url_template.contains("{user_id}"));
        assert_eq!(config.context_token_budget, None);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config("non/existent/path");
        assert!(config.is_err());
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());
        assert!(config.is_err());
    }

    #[test]
    fn test_example_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&EdtConfig::example()).unwrap();
        let back: EdtConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, EdtConfig::example());
    }

    #[test]
    fn test_top_k_and_offset_clamping() {
        let mut config = EdtConfig::example();
        config.top_k = 0;
        assert_eq!(config.top_k().get(), 1);

        assert_eq!(config.utc_offset().local_minus_utc(), 11 * 3600);
        config.utc_offset_minutes = 100_000;
        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_index_dir_override() {
        let mut config = EdtConfig::example();
        config.index_path = Some(PathBuf::from("/tmp/edt-index"));
        assert_eq!(config.index_dir().unwrap(), PathBuf::from("/tmp/edt-index"));
    }
}
