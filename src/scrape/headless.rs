//! Headless Chromium session used as the marketplace query transport.
//!
//! Queries run as an in-page `fetch` from a tab parked on the endpoint's
//! origin, so they carry the same cookies and headers a visitor would.

use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc, time::Duration};

use super::{QueryTransport, ScrapeError};
use crate::config::BrowserConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

fn browser_err(err: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Browser(err.to_string())
}

/// One browser with one tab. Closed when dropped, on every exit path.
pub struct BrowserSession {
    // keeps the chromium process alive for as long as the tab is in use
    _browser: Browser,
    tab: Arc<Tab>,
    endpoint: String,
}

impl BrowserSession {
    pub fn open(config: &BrowserConfig, endpoint: &str) -> Result<Self, ScrapeError> {
        let origin = origin_of(endpoint)?;

        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(|| std::env::var("CHROME_PATH").ok().map(PathBuf::from));

        let options = LaunchOptionsBuilder::default()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .path(chrome_path)
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .build()
            .map_err(browser_err)?;

        let browser = Browser::new(options).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;

        tab.set_user_agent(USER_AGENT, Some("en-US,en"), None)
            .map_err(browser_err)?;
        tab.navigate_to(&origin)
            .and_then(|t| t.wait_until_navigated())
            .map_err(browser_err)?;

        log::debug!("browser session open on {origin}");

        Ok(Self {
            _browser: browser,
            tab,
            endpoint: endpoint.to_string(),
        })
    }

    fn fetch_script(&self, payload: &Value) -> Result<String, ScrapeError> {
        let endpoint = serde_json::to_string(&self.endpoint)?;
        let body = serde_json::to_string(&payload.to_string())?;

        Ok(format!(
            r#"fetch({endpoint}, {{
                method: "POST",
                credentials: "include",
                headers: {{ "Content-Type": "application/json" }},
                body: {body}
            }}).then(r => r.text())"#
        ))
    }
}

impl QueryTransport for BrowserSession {
    fn post_json(&self, payload: &Value) -> Result<Value, ScrapeError> {
        let script = self.fetch_script(payload)?;

        let result = self.tab.evaluate(&script, true).map_err(browser_err)?;
        let text = result
            .value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::Browser("query returned no body".into()))?;

        Ok(serde_json::from_str(text)?)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(err) = self.tab.close(true) {
            log::debug!("closing tab: {err}");
        }
        log::debug!("browser session closed");
    }
}

fn origin_of(endpoint: &str) -> Result<String, ScrapeError> {
    let url = reqwest::Url::parse(endpoint).map_err(browser_err)?;
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path() {
        assert_eq!(
            origin_of("https://www.kijiji.ca/anvil/api").unwrap(),
            "https://www.kijiji.ca"
        );
        assert!(origin_of("nope").is_err());
    }

    #[test]
    #[ignore = "requires chromium and network access"]
    fn resolves_location_through_browser() {
        let session = BrowserSession::open(
            &BrowserConfig::default(),
            "https://www.kijiji.ca/anvil/api",
        )
        .unwrap();

        let id = crate::scrape::location::LocationResolver::new()
            .resolve(&session, "ChIJI__egEUioFMRXRX2SgygH0E")
            .unwrap();
        assert!(id.is_some());
    }
}
