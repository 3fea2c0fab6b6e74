use serde::Serialize;

use crate::{
    app::errors::PipelineError,
    config::{CityFailurePolicy, Config},
    geo::{Geocoder, Place},
    listings::{Listing, SearchCriteria},
    scrape::{location::LocationResolver, search::ListingScraper, QueryTransport},
    semantic::{EmbeddingEngine, TokenEncoder},
    storage::{Database, EmbeddingStore, ListingStore},
};

/// Per-call replacements for the configured search defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub keyword: Option<String>,
    pub category: Option<i64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityReport {
    pub city: String,
    pub place: Place,
    pub location_id: Option<i64>,
    pub fetched: usize,
    pub stored: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub cities: Vec<CityReport>,
    /// Cities skipped under [`CityFailurePolicy::Skip`], with the error text
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub fetch: FetchReport,
    pub embedded: usize,
}

/// Drives geocoding, location lookup, scraping and storage per city, then one
/// global embedding pass.
pub struct Orchestrator {
    config: Config,
    geocoder: Box<dyn Geocoder>,
    locations: LocationResolver,
    scraper: ListingScraper,
    listings: ListingStore,
    embeddings: EmbeddingStore,
}

impl Orchestrator {
    pub fn new(config: Config, db: Database, geocoder: Box<dyn Geocoder>) -> Self {
        Self {
            config,
            geocoder,
            locations: LocationResolver::new(),
            scraper: ListingScraper::new(),
            listings: ListingStore::new(db.clone()),
            embeddings: EmbeddingStore::new(db),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn listings(&self) -> &ListingStore {
        &self.listings
    }

    pub fn embeddings(&self) -> &EmbeddingStore {
        &self.embeddings
    }

    /// Geocode `city` and map the place to a marketplace location id.
    pub fn locate(
        &self,
        transport: &dyn QueryTransport,
        city: &str,
    ) -> Result<(Place, Option<i64>), PipelineError> {
        let place = self.geocoder.resolve(city, &self.config.country_code)?;
        let location_id = self.locations.resolve(transport, &place.place_id)?;

        if location_id.is_none() {
            log::warn!("{city}: searching without a location id");
        }

        Ok((place, location_id))
    }

    pub fn criteria_for(
        &self,
        place: &Place,
        location_id: Option<i64>,
        overrides: &SearchOverrides,
    ) -> SearchCriteria {
        SearchCriteria {
            keywords: overrides
                .keyword
                .clone()
                .unwrap_or_else(|| self.config.default_keyword.clone()),
            category_id: overrides.category.unwrap_or(self.config.default_category),
            location_id,
            latitude: place.coordinates.latitude,
            longitude: place.coordinates.longitude,
            radius: overrides.radius.unwrap_or(self.config.default_radius),
            address: place.display_name.clone(),
        }
    }

    /// Locate and scrape one city without touching the store.
    pub fn search_city(
        &self,
        transport: &dyn QueryTransport,
        city: &str,
        overrides: &SearchOverrides,
    ) -> Result<(Place, Option<i64>, Vec<Listing>), PipelineError> {
        let (place, location_id) = self.locate(transport, city)?;
        let criteria = self.criteria_for(&place, location_id, overrides);
        let listings = self.scraper.fetch(transport, &criteria)?;
        Ok((place, location_id, listings))
    }

    /// Locate, scrape and store one city.
    pub fn fetch_city(
        &self,
        transport: &dyn QueryTransport,
        city: &str,
        overrides: &SearchOverrides,
    ) -> Result<CityReport, PipelineError> {
        let _span = tracing::info_span!("city", %city).entered();
        log::info!("{city}: fetching");
        let (place, location_id, listings) = self.search_city(transport, city, overrides)?;
        let stored = self.listings.upsert_many(&listings)?;

        log::info!("{city}: stored {stored}/{} listings", listings.len());

        Ok(CityReport {
            city: city.to_string(),
            place,
            location_id,
            fetched: listings.len(),
            stored,
        })
    }

    /// Every configured city, one after another, with the configured failure policy.
    pub fn fetch_all(&self, transport: &dyn QueryTransport) -> Result<FetchReport, PipelineError> {
        let mut report = FetchReport::default();
        let overrides = SearchOverrides::default();

        for city in &self.config.cities {
            match self.fetch_city(transport, city, &overrides) {
                Ok(city_report) => report.cities.push(city_report),
                Err(err) => match self.config.city_failure_policy {
                    CityFailurePolicy::Abort => return Err(PipelineError::for_city(city, err)),
                    CityFailurePolicy::Skip => {
                        log::error!("{city}: {err}; skipping");
                        report.failed.push((city.clone(), err.to_string()));
                    }
                },
            }
        }

        Ok(report)
    }

    /// Listings that have a description but no stored embedding, in store order.
    pub fn pending_embeddings(&self) -> Result<Vec<Listing>, PipelineError> {
        let embedded = self.embeddings.get_all_ids()?;

        Ok(self
            .listings
            .query_all()?
            .into_iter()
            .filter(|l| l.is_embeddable() && !embedded.contains(&l.id))
            .collect())
    }

    /// Encode and store embeddings for every pending listing. Returns how many were written.
    pub fn embed_missing<E: TokenEncoder>(
        &self,
        engine: &EmbeddingEngine<E>,
    ) -> Result<usize, PipelineError> {
        let pending = self.pending_embeddings()?;
        if pending.is_empty() {
            log::info!("no listings need embeddings");
            return Ok(0);
        }

        log::info!("embedding {} listings", pending.len());

        let texts: Vec<String> = pending
            .iter()
            .map(|l| l.description.clone().unwrap_or_default())
            .collect();
        let vectors = engine.encode_batch(&texts)?;

        let pairs: Vec<(i64, Vec<f32>)> = pending.iter().map(|l| l.id).zip(vectors).collect();
        Ok(self.embeddings.upsert_many(&pairs)?)
    }

    pub fn run<E: TokenEncoder>(
        &self,
        transport: &dyn QueryTransport,
        engine: &EmbeddingEngine<E>,
    ) -> Result<RunReport, PipelineError> {
        let fetch = self.fetch_all(transport)?;
        let embedded = self.embed_missing(engine)?;

        log::info!(
            "run finished: {} cities, {} failed, {embedded} new embeddings",
            fetch.cities.len(),
            fetch.failed.len()
        );

        Ok(RunReport { fetch, embedded })
    }
}
