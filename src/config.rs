use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_DB_PATH: &str = "listings.db";
const DEFAULT_CITY: &str = "edmonton";
const DEFAULT_COUNTRY_CODE: &str = "CA";
const DEFAULT_KEYWORD: &str = "skis";
/// Buy/Sell
const DEFAULT_CATEGORY: i64 = 10;
/// Marketplace default, in kilometers
const DEFAULT_RADIUS: f64 = 50.0;
const DEFAULT_GRAPHQL_URL: &str = "https://www.kijiji.ca/anvil/api";
const DEFAULT_PLACES_URL: &str = "https://places.googleapis.com/v1/places:searchText";

/// Weights the embeddings are computed with. Changing this invalidates stored vectors.
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
const DEFAULT_EMBEDDING_MAX_TOKENS: usize = 512;

const DEFAULT_BROWSER_IDLE_TIMEOUT_SECS: u64 = 600;

/// Environment variable holding the geocoding API key.
pub const PLACES_API_KEY_ENV: &str = "GOOGLE_PLACES_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What the orchestrator does when one city fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityFailurePolicy {
    /// Stop the run on the first failing city.
    #[default]
    Abort,
    /// Log the failure and move on to the next city.
    Skip,
}

/// Headless browser used for marketplace queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chromium binary; falls back to `CHROME_PATH`, then to auto-detection.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_true")]
    pub sandbox: bool,

    /// How long the browser may sit without protocol traffic before it is torn down.
    ///
    /// Defaults to `DEFAULT_BROWSER_IDLE_TIMEOUT_SECS` (600 s). The browser
    /// driver always enforces an idle limit, so marketplace calls are bounded
    /// by this value rather than waiting forever; raise it for slow networks.
    #[serde(default = "default_browser_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            sandbox: true,
            idle_timeout_secs: DEFAULT_BROWSER_IDLE_TIMEOUT_SECS,
        }
    }
}

/// Configuration for description embeddings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Hugging Face model repository (must ship `tokenizer.json` and an ONNX export)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Tokens kept per text; longer descriptions are truncated.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Local ONNX file, skips the hub download when set
    #[serde(default)]
    pub onnx_path: Option<PathBuf>,

    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            max_tokens: DEFAULT_EMBEDDING_MAX_TOKENS,
            onnx_path: None,
            tokenizer_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_browser_idle_timeout_secs() -> u64 {
    DEFAULT_BROWSER_IDLE_TIMEOUT_SECS
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBEDDING_BATCH_SIZE
}

fn default_embedding_max_tokens() -> usize {
    DEFAULT_EMBEDDING_MAX_TOKENS
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_cities() -> Vec<String> {
    vec![DEFAULT_CITY.to_string()]
}

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

fn default_keyword() -> String {
    DEFAULT_KEYWORD.to_string()
}

fn default_category() -> i64 {
    DEFAULT_CATEGORY
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS
}

fn default_graphql_url() -> String {
    DEFAULT_GRAPHQL_URL.to_string()
}

fn default_places_url() -> String {
    DEFAULT_PLACES_URL.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file; relative paths resolve against the base directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_keyword")]
    pub default_keyword: String,
    #[serde(default = "default_category")]
    pub default_category: i64,
    #[serde(default = "default_radius")]
    pub default_radius: f64,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_places_url")]
    pub places_url: String,
    #[serde(default)]
    pub city_failure_policy: CityFailurePolicy,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cities: default_cities(),
            country_code: default_country_code(),
            default_keyword: default_keyword(),
            default_category: default_category(),
            default_radius: default_radius(),
            graphql_url: default_graphql_url(),
            places_url: default_places_url(),
            city_failure_policy: CityFailurePolicy::default(),
            browser: BrowserConfig::default(),
            embedding: EmbeddingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cities.is_empty() {
            return Err(ConfigError::Invalid("cities must not be empty".into()));
        }

        if let Some(idx) = self.cities.iter().position(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("city #{} is empty", idx + 1)));
        }

        if !(self.default_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "default_radius must be positive, got {}",
                self.default_radius
            )));
        }

        for (key, url) in [
            ("graphql_url", &self.graphql_url),
            ("places_url", &self.places_url),
        ] {
            if let Err(err) = reqwest::Url::parse(url) {
                return Err(ConfigError::Invalid(format!("{key} {url:?}: {err}")));
            }
        }

        let emb = &self.embedding;
        if emb.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than 0".into(),
            ));
        }
        if emb.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_tokens must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing the defaults first if it does not exist.
    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base_path = base_path.as_ref();
        let path = base_path.join(CONFIG_FILE);

        std::fs::create_dir_all(base_path).map_err(|source| ConfigError::Io {
            path: base_path.to_path_buf(),
            source,
        })?;

        // create new if does not exist
        if !path.exists() {
            log::info!("writing default config to {}", path.display());
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&path, defaults).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn db_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.db_path);
        if path.is_absolute() {
            path
        } else {
            self.base_path.join(path)
        }
    }

    pub fn places_api_key() -> Option<String> {
        std::env::var(PLACES_API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_document() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.cities, vec!["edmonton".to_string()]);
        assert_eq!(config.default_keyword, "skis");
        assert_eq!(config.default_category, 10);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.city_failure_policy, CityFailurePolicy::Abort);
        assert_eq!(config.db_path(), tmp.path().join("listings.db"));
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn browser_idle_timeout_is_bounded_and_configurable() {
        assert_eq!(Config::default().browser.idle_timeout_secs, 600);

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "browser:\n  idle_timeout_secs: 1800\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.browser.idle_timeout_secs, 1800);
        assert!(config.browser.headless);
    }

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "cities: [calgary, edmonton]\ncity_failure_policy: skip\nembedding:\n  batch_size: 8\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.cities, vec!["calgary", "edmonton"]);
        assert_eq!(config.city_failure_policy, CityFailurePolicy::Skip);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.embedding.max_tokens, 512);
        assert_eq!(config.graphql_url, "https://www.kijiji.ca/anvil/api");
    }

    #[test]
    fn absolute_db_path_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "db_path: /var/tmp/kl.db\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/var/tmp/kl.db"));
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = Config::default();
        config.cities.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.graphql_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.default_radius = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "cities: {not: [a list").unwrap();
        assert!(matches!(
            Config::load_with(tmp.path()),
            Err(ConfigError::Malformed(_))
        ));
    }
}
