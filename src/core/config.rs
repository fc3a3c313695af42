//! Configuration types and management for resembl.
//!
//! Configuration is an enumerated record: every key is a struct field,
//! unknown keys are rejected at load time, and `config set` validates both
//! the key name and the value before anything touches disk.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{ResemblError, Result};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "RESEMBL_CONFIG_DIR";

/// Default config directory under the user's config root.
const DEFAULT_CONFIG_SUBDIR: &str = "resembl";

/// Output format for CLI rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable aligned table
    Table,
    /// Machine-readable JSON
    Json,
    /// Comma-separated values
    Csv,
}

impl FromStr for OutputFormat {
    type Err = ResemblError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ResemblError::bad_input(format!(
                "unknown format '{other}' (expected table, json, or csv)"
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Typed configuration record with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResemblConfig {
    /// LSH candidate-filtering threshold (also drives band tuning)
    pub lsh_threshold: f64,

    /// Number of MinHash permutations (must admit a band factorisation)
    pub num_permutations: u32,

    /// Number of results returned by `find`
    pub top_n: u32,

    /// Shingle size in tokens
    pub ngram_size: u32,

    /// Jaccard share of the hybrid score (the rest is Levenshtein)
    pub jaccard_weight: f64,

    /// Default CLI output format
    pub format: OutputFormat,
}

impl Default for ResemblConfig {
    fn default() -> Self {
        Self {
            lsh_threshold: 0.5,
            num_permutations: 128,
            top_n: 5,
            ngram_size: 3,
            jaccard_weight: 0.4,
            format: OutputFormat::Table,
        }
    }
}

impl ResemblConfig {
    /// The set of recognised configuration keys.
    pub const KEYS: &'static [&'static str] = &[
        "lsh_threshold",
        "num_permutations",
        "top_n",
        "ngram_size",
        "jaccard_weight",
        "format",
    ];

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_unit_range(self.lsh_threshold, "lsh_threshold")?;
        validate_unit_range(self.jaccard_weight, "jaccard_weight")?;

        if self.top_n == 0 {
            return Err(ResemblError::bad_input("top_n must be at least 1"));
        }

        if self.ngram_size == 0 {
            return Err(ResemblError::bad_input("ngram_size must be at least 1"));
        }

        if !has_band_factorisation(self.num_permutations) {
            return Err(ResemblError::bad_input(format!(
                "num_permutations ({}) must factor into bands x rows with both > 1",
                self.num_permutations
            )));
        }

        Ok(())
    }

    /// Set a single key from its string representation, validating both the
    /// key name and the value.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "lsh_threshold" => self.lsh_threshold = parse_value(key, value)?,
            "num_permutations" => self.num_permutations = parse_value(key, value)?,
            "top_n" => self.top_n = parse_value(key, value)?,
            "ngram_size" => self.ngram_size = parse_value(key, value)?,
            "jaccard_weight" => self.jaccard_weight = parse_value(key, value)?,
            "format" => self.format = value.parse()?,
            other => {
                return Err(ResemblError::bad_input(format!(
                    "unknown configuration key '{other}'"
                )))
            }
        }
        self.validate()
    }

    /// Return the value of a key as a display string.
    pub fn get_key(&self, key: &str) -> Result<String> {
        match key {
            "lsh_threshold" => Ok(self.lsh_threshold.to_string()),
            "num_permutations" => Ok(self.num_permutations.to_string()),
            "top_n" => Ok(self.top_n.to_string()),
            "ngram_size" => Ok(self.ngram_size.to_string()),
            "jaccard_weight" => Ok(self.jaccard_weight.to_string()),
            "format" => Ok(self.format.to_string()),
            other => Err(ResemblError::bad_input(format!(
                "unknown configuration key '{other}'"
            ))),
        }
    }

    /// All key/value pairs as display strings, in declaration order.
    pub fn items(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .map(|&k| (k, self.get_key(k).expect("declared key")))
            .collect()
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ResemblError::bad_input(format!("invalid value '{value}' for {key}")))
}

/// Check that `value` lies in `[0, 1]`.
pub fn validate_unit_range(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ResemblError::bad_input(format!(
            "{field} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// True if `p` splits into `bands * rows` with both factors greater than 1.
fn has_band_factorisation(p: u32) -> bool {
    if p < 4 {
        return false;
    }
    (2..=p / 2).any(|b| p % b == 0)
}

/// Return the config directory, respecting `RESEMBL_CONFIG_DIR`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_SUBDIR)
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load the user's configuration, falling back to defaults when the file
/// does not exist. Unknown keys and invalid values are hard errors.
pub fn load_config() -> Result<ResemblConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(ResemblConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|e| ResemblError::io(format!("failed to read {}", path.display()), e))?;
    let config: ResemblConfig = toml::from_str(&raw)
        .map_err(|e| ResemblError::bad_input(format!("invalid config file: {e}")))?;
    config.validate()?;
    debug!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Write `config` to the config file atomically (tmp + rename).
pub fn save_config(config: &ResemblConfig) -> Result<()> {
    config.validate()?;

    let dir = config_dir();
    fs::create_dir_all(&dir)
        .map_err(|e| ResemblError::io(format!("failed to create {}", dir.display()), e))?;

    let path = config_path();
    let tmp = path.with_extension("toml.tmp");
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ResemblError::bad_input(format!("config serialisation failed: {e}")))?;

    fs::write(&tmp, rendered)
        .map_err(|e| ResemblError::io(format!("failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, &path)
        .map_err(|e| ResemblError::io(format!("failed to rename into {}", path.display()), e))?;
    Ok(())
}

/// Update a single key in the config file and return the new configuration.
pub fn update_key(key: &str, value: &str) -> Result<ResemblConfig> {
    let mut config = load_config()?;
    config.set_key(key, value)?;
    save_config(&config)?;
    Ok(config)
}

/// Reset a key to its default in the config file and return the new
/// configuration.
pub fn remove_key(key: &str) -> Result<ResemblConfig> {
    let mut config = load_config()?;
    let defaults = ResemblConfig::default();
    let default_value = defaults.get_key(key)?;
    config.set_key(key, &default_value)?;
    save_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ResemblConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_permutations, 128);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.format, OutputFormat::Table);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut config = ResemblConfig::default();
        assert!(config.set_key("no_such_key", "1").is_err());

        let parsed: std::result::Result<ResemblConfig, _> =
            toml::from_str("lsh_threshold = 0.5\nbogus = 1\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = ResemblConfig::default();
        assert!(config.set_key("lsh_threshold", "1.5").is_err());
        assert!(config.set_key("jaccard_weight", "-0.1").is_err());
    }

    #[test]
    fn test_prime_permutation_count_rejected() {
        let mut config = ResemblConfig::default();
        assert!(config.set_key("num_permutations", "127").is_err());
        assert!(config.set_key("num_permutations", "128").is_ok());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_items_covers_all_keys() {
        let config = ResemblConfig::default();
        let items = config.items();
        assert_eq!(items.len(), ResemblConfig::KEYS.len());
        assert_eq!(items[0], ("lsh_threshold", "0.5".to_string()));
    }
}
