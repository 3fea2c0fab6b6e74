use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod geo;
mod listings;
mod scrape;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use app::{AppFactory, SearchOverrides};
use cli::Command;
use config::Config;
use geo::{GeoResolver, Geocoder};
use scrape::{location::LocationResolver, QueryTransport};
use storage::EmbeddingStore;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `f` against one browser session; the session is closed when this returns.
#[cfg(feature = "headless")]
fn with_browser<T>(config: &Config, f: impl FnOnce(&dyn QueryTransport) -> Result<T>) -> Result<T> {
    let session = AppFactory::open_browser(config)?;
    f(&session)
}

#[cfg(not(feature = "headless"))]
fn with_browser<T>(_config: &Config, _f: impl FnOnce(&dyn QueryTransport) -> Result<T>) -> Result<T> {
    bail!("marketplace queries need a build with the `headless` feature")
}

fn main() -> Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let paths = AppFactory::get_paths()?;
    let config = AppFactory::create_config(&paths)?;

    match args.command {
        Command::Run => {
            let orchestrator = AppFactory::create_orchestrator(config)?;
            let engine = AppFactory::create_embedding_engine(orchestrator.config())?;

            let report = with_browser(orchestrator.config(), |transport| {
                Ok(orchestrator.run(transport, &engine)?)
            })?;

            print_json(&report)
        }

        Command::Geocode { city } => {
            let place = GeoResolver::from_config(&config)?
                .resolve(&city, &config.country_code)
                .with_context(|| format!("Failed to geocode {city:?}"))?;

            print_json(&place)
        }

        Command::Location { place_id } => {
            let location_id = with_browser(&config, |transport| {
                Ok(LocationResolver::new().resolve(transport, &place_id)?)
            })?;

            print_json(&json!({ "place_id": place_id, "location_id": location_id }))
        }

        Command::Fetch {
            city,
            keyword,
            category,
            radius,
            store,
        } => {
            let overrides = SearchOverrides {
                keyword,
                category,
                radius,
            };
            let orchestrator = AppFactory::create_orchestrator(config)?;

            if store {
                let report = with_browser(orchestrator.config(), |transport| {
                    Ok(orchestrator.fetch_city(transport, &city, &overrides)?)
                })?;
                print_json(&report)
            } else {
                let (_, _, listings) = with_browser(orchestrator.config(), |transport| {
                    Ok(orchestrator.search_city(transport, &city, &overrides)?)
                })?;
                print_json(&listings)
            }
        }

        Command::Embed => {
            let orchestrator = AppFactory::create_orchestrator(config)?;
            let engine = AppFactory::create_embedding_engine(orchestrator.config())?;
            let embedded = orchestrator.embed_missing(&engine)?;

            print_json(&json!({
                "embedded": embedded,
                "listings": orchestrator.listings().count()?,
                "embeddings": orchestrator.embeddings().get_all_ids()?.len(),
            }))
        }

        Command::SeoUrl { city, keyword } => {
            let seo = AppFactory::create_seo_resolver(&config)?;
            let orchestrator = AppFactory::create_orchestrator(config)?;
            let overrides = SearchOverrides {
                keyword,
                ..Default::default()
            };

            let (place, location_id) = with_browser(orchestrator.config(), |transport| {
                Ok(orchestrator.locate(transport, &city)?)
            })?;
            let criteria = orchestrator.criteria_for(&place, location_id, &overrides);

            println!("{}", seo.lookup(&criteria)?);
            Ok(())
        }

        Command::ShowEmbedding { id: None } => {
            let store = EmbeddingStore::new(AppFactory::open_database(&config)?);
            let all = store.get_all()?;
            let dimensions = all.first().map(|(_, vector)| vector.len());

            print_json(&json!({
                "count": all.len(),
                "dimensions": dimensions,
                "listing_ids": all.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            }))
        }

        Command::ShowEmbedding { id: Some(id) } => {
            let db = AppFactory::open_database(&config)?;

            let Some(vector) = EmbeddingStore::new(db).get(id)? else {
                bail!("no embedding stored for listing {id}");
            };
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

            print_json(&json!({
                "listing_id": id,
                "dimensions": vector.len(),
                "norm": norm,
                "vector": vector,
            }))
        }
    }
}
