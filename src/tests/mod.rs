
mod scrape;
