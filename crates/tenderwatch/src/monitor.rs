use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tokio::task;

use crate::notify::{AlertOutcome, ChatNotifier, EmailNotifier};
use crate::scraper::{self, ScraperError};
use crate::store;
use crate::types::{RunReport, Tender};

pub const DEFAULT_STORE_PATH: &str = "data/tenders.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Narrow the listing to one city; `None` scrapes everything.
    pub city: Option<String>,
    pub chat_to: Option<String>,
    pub email_to: Option<String>,
    pub headless: bool,
    pub store_path: PathBuf,
    /// Bound for every page wait.
    pub timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            city: None,
            chat_to: None,
            email_to: None,
            headless: true,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("at least one alert channel (chat or email) must be configured")]
    NoChannels,
}

/// Runs the sync browser session on the blocking pool; the pipeline stays
/// strictly sequential, this only keeps the async executor breathing.
pub async fn scrape(config: &MonitorConfig) -> Result<Vec<Tender>, ScraperError> {
    let city = config.city.clone();
    let headless = config.headless;
    let timeout = config.timeout;

    let handle =
        task::spawn_blocking(move || scraper::scrape_once(city.as_deref(), headless, timeout));
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(ScraperError::Browser(anyhow::anyhow!(
            "scrape task failed: {e}"
        ))),
    }
}

/// Scrape → diff against history → alert on the new records → persist.
pub struct Monitor {
    config: MonitorConfig,
    chat: Option<ChatNotifier>,
    email: Option<EmailNotifier>,
}

impl Monitor {
    /// Builds the alert channels from the environment. A channel with
    /// missing credentials or no recipient is skipped with a warning; at
    /// least one channel must come out usable.
    pub fn from_env(mut config: MonitorConfig) -> Result<Self, MonitorError> {
        if config.chat_to.is_none() {
            config.chat_to = env::var("TWILIO_WHATSAPP_TO").ok();
        }
        if config.email_to.is_none() {
            config.email_to = env::var("GMAIL_SMTP_TO")
                .ok()
                .or_else(|| env::var("SENDER_EMAIL").ok());
        }

        let chat = match (&config.chat_to, ChatNotifier::from_env()) {
            (Some(_), Ok(notifier)) => Some(notifier),
            (None, Ok(_)) => {
                log::warn!("chat recipient not configured, disabling chat alerts");
                None
            }
            (_, Err(e)) => {
                log::warn!("chat channel not available: {e}");
                None
            }
        };
        let email = match (&config.email_to, EmailNotifier::from_env()) {
            (Some(_), Ok(notifier)) => Some(notifier),
            (None, Ok(_)) => {
                log::warn!("email recipient not configured, disabling email alerts");
                None
            }
            (_, Err(e)) => {
                log::warn!("email channel not available: {e}");
                None
            }
        };

        Monitor::with_notifiers(config, chat, email)
    }

    pub fn with_notifiers(
        config: MonitorConfig,
        chat: Option<ChatNotifier>,
        email: Option<EmailNotifier>,
    ) -> Result<Self, MonitorError> {
        if chat.is_none() && email.is_none() {
            return Err(MonitorError::NoChannels);
        }
        Ok(Monitor {
            config,
            chat,
            email,
        })
    }

    /// One full monitoring pass. Always returns a report; only a failed
    /// session open or a failed history write marks the run unsuccessful.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::begin();
        log::info!("starting tender monitor run");

        let scraped = match scrape(&self.config).await {
            Ok(tenders) => tenders,
            Err(e) => {
                log::error!("scrape failed: {e}");
                report.success = false;
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.scraped = scraped.len();
        if scraped.is_empty() {
            log::info!("no tenders listed, nothing to do");
            return report;
        }

        let existing = store::load_tenders(&self.config.store_path);
        log::info!("{} tender(s) already known", existing.len());

        let outcome = store::merge(&existing, &scraped);
        report.new = outcome.added.len();
        if outcome.added.is_empty() {
            log::info!("no new tenders");
            return report;
        }
        log::info!("{} new tender(s) found", outcome.added.len());

        // Alerts go out before the history is persisted: a crash in
        // between re-alerts on the next run instead of losing a tender.
        for tender in &outcome.added {
            self.dispatch(tender, &mut report).await;
        }

        match store::save_tenders(&self.config.store_path, &outcome.merged) {
            Ok(()) => {
                report.persisted = true;
                log::info!(
                    "history saved to {} ({} total)",
                    self.config.store_path.display(),
                    outcome.merged.len()
                );
            }
            Err(e) => {
                log::error!("failed to persist history: {e}");
                report.success = false;
                report.error = Some(e.to_string());
            }
        }

        report
    }

    /// Alerts on every currently listed tender, bypassing the history
    /// store entirely. Useful for initial setup and full refreshes.
    pub async fn send_all(&self) -> RunReport {
        let mut report = RunReport::begin();

        let scraped = match scrape(&self.config).await {
            Ok(tenders) => tenders,
            Err(e) => {
                log::error!("scrape failed: {e}");
                report.success = false;
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.scraped = scraped.len();
        report.new = scraped.len();

        for tender in &scraped {
            self.dispatch(tender, &mut report).await;
        }
        report
    }

    async fn dispatch(&self, tender: &Tender, report: &mut RunReport) {
        log::info!("alerting for {tender}");

        if let (Some(chat), Some(to)) = (&self.chat, &self.config.chat_to) {
            let outcome = chat.send_tender_alert(to, tender).await;
            record_outcome("chat", outcome, report);
        }
        if let (Some(email), Some(to)) = (&self.email, &self.config.email_to) {
            let outcome = email.send_tender_alert(to, tender).await;
            record_outcome("email", outcome, report);
        }
    }
}

fn record_outcome(channel: &str, outcome: AlertOutcome, report: &mut RunReport) {
    if outcome.success {
        report.alerts_sent += 1;
        let id = outcome
            .provider_id
            .map(|id| format!(" ({id})"))
            .unwrap_or_default();
        log::info!("{channel} alert sent{id}");
    } else {
        report.alerts_failed += 1;
        let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
        log::warn!("{channel} alert failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_requires_a_channel() {
        let result = Monitor::with_notifiers(MonitorConfig::default(), None, None);
        assert!(matches!(result, Err(MonitorError::NoChannels)));
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert!(config.headless);
        assert!(config.city.is_none());
        assert_eq!(config.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
