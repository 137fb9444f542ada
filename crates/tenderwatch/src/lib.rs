pub mod browser;
pub mod filter;
pub mod monitor;
pub mod notify;
pub mod parser;
pub mod scraper;
pub mod store;
pub mod types;

pub use monitor::{Monitor, MonitorConfig};
pub use scraper::TenderScraper;
pub use types::Tender;

/// JavaScript-rendered listing of currently open tenders.
pub(crate) const ACTIVE_TENDERS_URL: &str = "https://ppra.gov.pk/#/tenders/activetenders";

/// Base for absolutizing relative document links.
pub(crate) const PAGE_ORIGIN: &str = "https://ppra.gov.pk";
