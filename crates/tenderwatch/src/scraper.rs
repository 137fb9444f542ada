use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Tab};

use crate::browser::{self, LookupError, SETTLE_RENDER, SETTLE_SHORT};
use crate::types::Tender;
use crate::{filter, parser};

/// Ordered candidates for the results container; first visible match wins.
const RESULTS_TABLE_SELECTORS: [&str; 4] = ["table", "tbody", "[class*='table']", "[id*='table']"];

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("failed to launch browser: {0}")]
    Launch(anyhow::Error),
    #[error("failed to open tenders page: {0}")]
    PageLoad(#[from] LookupError),
    #[error("browser error: {0}")]
    Browser(anyhow::Error),
}

/// One live browser session on the active-tenders page.
///
/// The session is released when the value drops, on every exit path.
pub struct TenderScraper {
    // Kept alive for the tab; dropping it shuts Chrome down.
    _browser: Browser,
    tab: Arc<Tab>,
    timeout: Duration,
}

impl TenderScraper {
    /// Launches the browser, opens the listing page and blocks until the
    /// document reports itself loaded.
    pub fn start(headless: bool, timeout: Duration) -> Result<Self, ScraperError> {
        let browser = browser::launch(headless).map_err(ScraperError::Launch)?;
        let tab = browser.new_tab().map_err(ScraperError::Browser)?;

        log::info!("opening {}", crate::ACTIVE_TENDERS_URL);
        tab.navigate_to(crate::ACTIVE_TENDERS_URL)
            .map_err(ScraperError::Browser)?;
        tab.wait_until_navigated().map_err(ScraperError::Browser)?;
        browser::wait_until_loaded(&tab, timeout)?;
        // readyState flips before the app finishes drawing its widgets.
        browser::settle(SETTLE_RENDER);

        Ok(TenderScraper {
            _browser: browser,
            tab,
            timeout,
        })
    }

    /// Narrows the listing to one city; `false` means the listing stays
    /// unfiltered and the caller may proceed regardless.
    pub fn apply_city_filter(&self, city: &str) -> bool {
        filter::apply_city_filter(&self.tab, city, self.timeout)
    }

    /// Extracts the currently rendered listing. A page without a results
    /// table is a valid empty listing, not an error; individual broken
    /// rows are skipped inside the parser.
    pub fn extract_tenders(&self) -> Vec<Tender> {
        browser::settle(SETTLE_SHORT);

        let Some(table) = browser::find_first_visible_css(&self.tab, &RESULTS_TABLE_SELECTORS)
        else {
            log::warn!("no results table found, treating listing as empty");
            return Vec::new();
        };

        match browser::outer_html(&table) {
            Ok(html) => parser::parse_tender_table(&html, crate::PAGE_ORIGIN),
            Err(e) => {
                log::warn!("could not read results table: {e}");
                Vec::new()
            }
        }
    }
}

/// Scrapes the listing once, scoping the whole browser lifetime to this
/// call: the session is released on success, error and panic alike. A
/// failed city filter degrades to the unfiltered listing.
pub fn scrape_once(
    city: Option<&str>,
    headless: bool,
    timeout: Duration,
) -> Result<Vec<Tender>, ScraperError> {
    let scraper = TenderScraper::start(headless, timeout)?;

    if let Some(city) = city
        && !scraper.apply_city_filter(city)
    {
        log::warn!("continuing with the unfiltered listing");
    }

    let tenders = scraper.extract_tenders();
    log::info!("extracted {} tender(s)", tenders.len());
    Ok(tenders)
}
