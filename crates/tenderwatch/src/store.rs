use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::types::Tender;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write history file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Canonical form of a tender number for identity comparison.
pub fn normalize_number(number: &str) -> String {
    number.trim().to_lowercase()
}

/// A tender duplicates an existing one iff both numbers are non-empty and
/// equal after normalization. A tender without a number never duplicates
/// anything.
pub fn is_duplicate(tender: &Tender, existing: &[Tender]) -> bool {
    let key = normalize_number(&tender.number);
    if key.is_empty() {
        return false;
    }
    existing
        .iter()
        .any(|known| normalize_number(&known.number) == key)
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Existing history followed by the appended newcomers, order preserved.
    pub merged: Vec<Tender>,
    /// The newly appended records, in input order.
    pub added: Vec<Tender>,
}

impl MergeOutcome {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

/// Appends the incoming records that are not already known, suppressing
/// duplicates within the incoming batch itself. Existing entries are never
/// edited, removed or reordered.
///
/// A record with an empty number has no identity and is appended on every
/// call; repeated runs therefore duplicate it. Known gap, kept as-is.
pub fn merge(existing: &[Tender], incoming: &[Tender]) -> MergeOutcome {
    let mut merged = existing.to_vec();
    let mut added = Vec::new();
    for tender in incoming {
        if !is_duplicate(tender, &merged) {
            merged.push(tender.clone());
            added.push(tender.clone());
        }
    }
    MergeOutcome { merged, added }
}

/// Loads the tender history. An absent file is simply an empty history; a
/// file that fails to read or parse is logged and treated the same, never
/// as a fatal condition.
pub fn load_tenders(path: &Path) -> Vec<Tender> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("could not read history file {}: {e}", path.display());
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Tender>>(&raw) {
        Ok(tenders) => tenders,
        Err(e) => {
            log::warn!(
                "history file {} does not contain a tender array, starting empty: {e}",
                path.display()
            );
            Vec::new()
        }
    }
}

/// Writes the full history as a pretty-printed JSON array, creating parent
/// directories as needed.
pub fn save_tenders(path: &Path, tenders: &[Tender]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(tenders)?;
    fs::write(path, json)?;
    Ok(())
}

const CSV_COLUMNS: [&str; 8] = [
    "tender_title",
    "category",
    "department_owner",
    "start_date",
    "closing_date",
    "tender_number",
    "tse",
    "pdf_links",
];

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders tenders as CSV with the same columns as the JSON store; links
/// collapse into one `;`-separated field.
pub fn to_csv(tenders: &[Tender]) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    for tender in tenders {
        let links = tender.document_links.join("; ");
        let fields = [
            tender.title.as_str(),
            tender.category.as_str(),
            tender.department_owner.as_str(),
            tender.start_date.as_str(),
            tender.closing_date.as_str(),
            tender.number.as_str(),
            tender.tse.as_str(),
            links.as_str(),
        ];
        let row = fields.map(csv_field).join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}
