use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Collect marketplace listings and embed their descriptions", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch and store listings for every configured city, then embed
    /// descriptions that have no embedding yet
    Run,

    /// Geocode a city name
    Geocode {
        city: String,
    },

    /// Map an external place id to a marketplace location id
    Location {
        place_id: String,
    },

    /// Scrape listings for one city and print them
    Fetch {
        city: String,

        /// Search keywords (defaults to config)
        #[clap(short, long)]
        keyword: Option<String>,

        /// Marketplace category id (defaults to config)
        #[clap(short, long)]
        category: Option<i64>,

        /// Search radius in kilometers (defaults to config)
        #[clap(short, long)]
        radius: Option<f64>,

        /// Write the listings to the database instead of printing them
        #[clap(long, default_value = "false")]
        store: bool,
    },

    /// Embed stored listings that have a description but no embedding
    Embed,

    /// Print the search page url for a city and keyword
    SeoUrl {
        city: String,

        #[clap(short, long)]
        keyword: Option<String>,
    },

    /// Print the stored embedding of a listing, or a summary of all of them
    ShowEmbedding {
        id: Option<i64>,
    },
}
