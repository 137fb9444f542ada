use std::fmt::Display;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One procurement tender as listed on the active-tenders page.
///
/// JSON field names match the storage schema of earlier deployments, so
/// history files written by them load unchanged. Every field is tolerated
/// missing on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tender {
    #[serde(rename = "tender_title")]
    pub title: String,
    pub category: String,
    pub department_owner: String,
    /// Advertisement date as printed on the page. The source format is
    /// inconsistent, so dates stay free text and are never parsed.
    pub start_date: String,
    pub closing_date: String,
    /// Tender number as printed. Empty when the page omits it; such a
    /// record has no stable identity (see `store::merge`).
    #[serde(rename = "tender_number")]
    pub number: String,
    /// Serial token extracted from the tender number, when present.
    pub tse: String,
    #[serde(rename = "pdf_links")]
    pub document_links: Vec<String>,
}

impl Display for Tender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let number = if self.number.is_empty() {
            "(no number)"
        } else {
            self.number.as_str()
        };
        write!(f, "[{}] {}", number, self.title)?;
        if !self.closing_date.is_empty() {
            write!(f, " — closes {}", self.closing_date)?;
        }
        if !self.document_links.is_empty() {
            write!(f, " ({} document(s))", self.document_links.len())?;
        }
        Ok(())
    }
}

/// Outcome of one monitor run. Always materializes with counts, even when
/// parts of the pipeline failed.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub scraped: usize,
    pub new: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub persisted: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl RunReport {
    pub(crate) fn begin() -> Self {
        RunReport {
            started_at: Local::now(),
            scraped: 0,
            new: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            persisted: false,
            success: true,
            error: None,
        }
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSummary ({})", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  Tenders scraped: {}", self.scraped)?;
        writeln!(f, "  New tenders:     {}", self.new)?;
        writeln!(f, "  Alerts sent:     {}", self.alerts_sent)?;
        writeln!(f, "  Alerts failed:   {}", self.alerts_failed)?;
        let history = if self.persisted {
            "saved"
        } else if self.new == 0 {
            "unchanged"
        } else {
            "not saved"
        };
        writeln!(f, "  History:         {}", history)?;
        if let Some(error) = &self.error {
            writeln!(f, "  Error:           {}", error)?;
        }
        Ok(())
    }
}
