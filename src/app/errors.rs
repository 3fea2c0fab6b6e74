use crate::{
    config::ConfigError, geo::GeoError, scrape::ScrapeError, semantic::EmbeddingError,
    storage::StoreError,
};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("geocoding: {0}")]
    Geo(#[from] GeoError),

    #[error("marketplace: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("embedding: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("city {city:?} failed: {source}")]
    City {
        city: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn for_city(city: &str, source: PipelineError) -> Self {
        PipelineError::City {
            city: city.to_string(),
            source: Box::new(source),
        }
    }
}
