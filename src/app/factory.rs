use crate::{
    app::orchestrator::Orchestrator,
    config::Config,
    geo::GeoResolver,
    scrape::seo::SeoUrlResolver,
    semantic::{EmbeddingEngine, OnnxEncoder},
    storage::Database,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;

#[cfg(feature = "headless")]
use crate::scrape::headless::BrowserSession;

/// Builds the pipeline components from config and environment.
pub struct AppFactory;

impl AppFactory {
    /// Get application paths, creating the base directory if needed
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths { base_path })
    }

    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        let config = Config::load_with(&paths.base_path).with_context(|| {
            format!("Failed to load config from {}", paths.base_path.display())
        })?;

        log::debug!("config loaded from {}", config.base_path().display());

        Ok(config)
    }

    pub fn open_database(config: &Config) -> Result<Database> {
        let path = config.db_path();
        let db =
            Database::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;

        log::debug!("database at {}", db.path().display());

        Ok(db)
    }

    /// Orchestrator backed by the real geocoding API.
    pub fn create_orchestrator(config: Config) -> Result<Orchestrator> {
        let db = Self::open_database(&config)?;
        let geocoder = GeoResolver::from_config(&config)?;
        Ok(Orchestrator::new(config, db, Box::new(geocoder)))
    }

    #[cfg(feature = "headless")]
    pub fn open_browser(config: &Config) -> Result<BrowserSession> {
        BrowserSession::open(&config.browser, &config.graphql_url)
            .context("Failed to start headless browser")
    }

    pub fn create_embedding_engine(config: &Config) -> Result<EmbeddingEngine<OnnxEncoder>> {
        let encoder = OnnxEncoder::load(&config.embedding)
            .with_context(|| format!("Failed to load embedding model {}", config.embedding.model))?;
        log::debug!(
            "embedding with {} in batches of {}",
            encoder.name(),
            config.embedding.batch_size
        );
        Ok(EmbeddingEngine::with_batch_size(
            encoder,
            config.embedding.batch_size,
        ))
    }

    pub fn create_seo_resolver(config: &Config) -> Result<SeoUrlResolver> {
        Ok(SeoUrlResolver::new(&config.graphql_url)?)
    }

    /// `KL_BASE_PATH`, or `~/.local/share/kl`
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("KL_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(home.join(".local/share/kl"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
}
