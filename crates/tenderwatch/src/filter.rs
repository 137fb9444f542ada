//! Locates and operates the city filter of the active-tenders page.
//!
//! The page is a JavaScript app whose filter widget carries no stable ids,
//! so the control is hunted through a fixed order of heuristic strategies.
//! Each strategy is a pure query-builder paired with a thin executor; the
//! query tables below are the single place to adjust when the page markup
//! shifts.

use std::time::Duration;

use headless_chrome::{Element, Tab};

use crate::browser::{self, LookupError, SETTLE_SHORT};

const CITY_LABEL: &str = "City";

/// Class fragments that suggest a form/filter group around the label.
const CONTAINER_HINTS: [&str; 5] = ["form", "filter", "row", "col", "group"];
const ANCESTOR_DEPTH: usize = 5;

/// Patterns for the clickable "Select" control inside a candidate
/// container, relative to that container.
const SELECTOR_PATTERNS: [&str; 5] = [
    ".//*[normalize-space(text())='Select']",
    ".//*[contains(text(), 'Select')]",
    ".//*[contains(@class, 'select')]",
    ".//button[contains(text(), 'Select')]",
    ".//*[@role='button' and contains(text(), 'Select')]",
];

const SEARCH_TRIGGER: &str = "//button[contains(text(), 'Search')]";
const RESULTS_SELECTORS: [&str; 2] = ["table", "tbody"];

/// Dropdown widgets animate open; re-querying too early sees nothing.
const DROPDOWN_OPEN_DELAY: Duration = Duration::from_millis(1500);
const OPTION_SCROLL_DELAY: Duration = Duration::from_millis(300);
const TYPE_AHEAD_DELAY: Duration = Duration::from_secs(1);
const RESULTS_REFRESH_DELAY: Duration = Duration::from_secs(3);

fn label_xpath(label: &str) -> String {
    format!("//*[normalize-space(text())='{label}' or contains(text(), '{label}')]")
}

/// Strategy 1: walk up from the label to a container that looks like a
/// form/filter group, then search for a selector control inside it.
fn strategy_label_container(label: &str) -> Vec<String> {
    let mut queries = Vec::new();
    for hint in CONTAINER_HINTS {
        for pattern in SELECTOR_PATTERNS {
            queries.push(format!(
                "{}/ancestor::*[position() <= {ANCESTOR_DEPTH}][contains(@class, '{hint}')]{}",
                label_xpath(label),
                pattern.trim_start_matches('.'),
            ));
        }
    }
    queries
}

/// Strategy 2: first "Select"-like element after the label in document
/// order, anywhere in the page.
fn strategy_document_order(label: &str) -> Vec<String> {
    vec![format!(
        "//*[normalize-space(text())='{label}']\
         /following::*[normalize-space(text())='Select' or contains(text(), 'Select')][1]"
    )]
}

/// Strategy 3: generic attribute-based fallbacks.
fn strategy_generic(label: &str) -> Vec<String> {
    let lower = label.to_lowercase();
    vec![
        format!("//*[contains(@placeholder, '{label}')]"),
        format!("//*[contains(@aria-label, '{label}')]"),
        format!("//select[contains(@name, '{lower}') or contains(@id, '{lower}')]"),
        format!("//*[contains(@class, '{lower}')]//*[contains(text(), 'Select')]"),
        "//button[contains(text(), 'Select')]".to_string(),
    ]
}

type QueryBuilder = fn(&str) -> Vec<String>;

/// Tried in order; first strategy that yields a visible element wins, and
/// no strategy is retried within one invocation.
const CONTROL_STRATEGIES: [(&str, QueryBuilder); 3] = [
    ("label-container", strategy_label_container),
    ("document-order", strategy_document_order),
    ("generic-selectors", strategy_generic),
];

fn option_queries(city: &str) -> Vec<String> {
    vec![
        format!("//*[normalize-space(text())='{city}']"),
        format!("//*[contains(text(), '{city}')]"),
        format!("//li[contains(text(), '{city}')]"),
        format!("//*[@role='option' and contains(text(), '{city}')]"),
        format!("//*[@role='menuitem' and contains(text(), '{city}')]"),
    ]
}

fn locate_filter_control<'t>(tab: &'t Tab) -> Option<Element<'t>> {
    for (name, build_queries) in CONTROL_STRATEGIES {
        let queries = build_queries(CITY_LABEL);
        if let Some(element) = browser::find_first_visible_xpath(tab, &queries) {
            log::debug!("city filter control located via {name} strategy");
            return Some(element);
        }
        log::debug!("{name} strategy found no city filter control");
    }
    None
}

/// Narrows the listing to one city. Returns `false` on any miss — an
/// unfiltered listing is still usable, so the caller carries on.
pub fn apply_city_filter(tab: &Tab, city: &str, timeout: Duration) -> bool {
    match try_apply(tab, city, timeout) {
        Ok(()) => {
            log::info!("city filter applied: {city}");
            true
        }
        Err(e) => {
            log::warn!("could not apply city filter for {city}: {e}");
            false
        }
    }
}

fn try_apply(tab: &Tab, city: &str, timeout: Duration) -> Result<(), LookupError> {
    let control = locate_filter_control(tab)
        .ok_or_else(|| LookupError::NotFound("city filter control".to_string()))?;

    if let Err(e) = control.scroll_into_view() {
        log::debug!("could not scroll filter control into view: {e}");
    }
    browser::settle(SETTLE_SHORT);
    control.click()?;
    browser::settle(DROPDOWN_OPEN_DELAY);

    let queries = option_queries(city);
    let option = match browser::wait_for_any_xpath(tab, &queries, timeout) {
        Ok(element) => element,
        Err(LookupError::Timeout(..)) => {
            // Searchable combo boxes only show options once typed into.
            log::debug!("no visible option for {city}, trying type-ahead");
            if let Err(e) = control.type_into(city) {
                log::debug!("type-ahead input failed: {e}");
            }
            browser::settle(TYPE_AHEAD_DELAY);
            browser::find_first_visible_xpath(tab, &queries)
                .ok_or_else(|| LookupError::NotFound(format!("city option '{city}'")))?
        }
        Err(e) => return Err(e),
    };

    if let Err(e) = option.scroll_into_view() {
        log::debug!("could not scroll city option into view: {e}");
    }
    browser::settle(OPTION_SCROLL_DELAY);
    option.click()?;
    browser::settle(SETTLE_SHORT);

    let trigger = browser::wait_for_any_xpath(tab, &[SEARCH_TRIGGER.to_string()], timeout)?;
    trigger.click()?;
    browser::settle(RESULTS_REFRESH_DELAY);
    browser::wait_for_any_css(tab, &RESULTS_SELECTORS, timeout)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_container_queries_scope_to_hinted_ancestors() {
        let queries = strategy_label_container("City");

        assert_eq!(queries.len(), CONTAINER_HINTS.len() * SELECTOR_PATTERNS.len());
        for query in &queries {
            assert!(query.contains("'City'"), "label missing in {query}");
            assert!(
                query.contains("ancestor::*[position() <= 5]"),
                "ancestor bound missing in {query}"
            );
        }
        // Container hints vary slowest: all selector patterns are tried
        // within one container kind before moving on.
        assert!(queries[0].contains("'form'"));
        assert!(queries[SELECTOR_PATTERNS.len()].contains("'filter'"));
    }

    #[test]
    fn test_document_order_query_uses_following_axis() {
        let queries = strategy_document_order("City");
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("/following::*"));
        assert!(queries[0].ends_with("[1]"));
    }

    #[test]
    fn test_generic_queries_cover_attribute_fallbacks() {
        let queries = strategy_generic("City");

        assert!(queries[0].contains("@placeholder"));
        assert!(queries[1].contains("@aria-label"));
        assert!(queries[2].starts_with("//select["));
        assert!(queries[2].contains("'city'"), "name/id match is lowercased");
        assert_eq!(queries.last().expect("fallback"), "//button[contains(text(), 'Select')]");
    }

    #[test]
    fn test_strategy_order_is_fixed() {
        let names: Vec<&str> = CONTROL_STRATEGIES.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            ["label-container", "document-order", "generic-selectors"]
        );
    }

    #[test]
    fn test_option_queries_exact_match_first() {
        let queries = option_queries("Chakwal");

        assert_eq!(queries[0], "//*[normalize-space(text())='Chakwal']");
        assert!(queries.iter().all(|q| q.contains("Chakwal")));
        assert!(queries.iter().any(|q| q.contains("@role='option'")));
        assert!(queries.iter().any(|q| q.contains("@role='menuitem'")));
    }
}
