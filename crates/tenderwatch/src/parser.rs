use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::Tender;

/// Phrases a results row shows instead of data when the query matched
/// nothing.
const SENTINEL_PHRASES: [&str; 2] = ["no record", "no data"];

/// Column captions of the results table. A row containing one of these and
/// no digit at all is a header; a row containing one alongside digits is
/// data that happens to mention the phrase.
const HEADER_KEYWORDS: [&str; 6] = [
    "sr no",
    "tender no",
    "tender details",
    "downloads",
    "advertisement",
    "closing",
];

/// Tokens announcing the owning body inside the details cell.
const OWNER_KEYWORDS: [&str; 5] = ["department", "dept", "owner", "organization", "org"];

const CATEGORY_KEYWORD: &str = "category";

/// Sr No, Tender No, Tender Details, Downloads, Advertisement Date,
/// Closing Date. The last column is tolerated missing.
const MIN_CELLS: usize = 5;
const COL_NUMBER: usize = 1;
const COL_DETAILS: usize = 2;
const COL_LINKS: usize = 3;
const COL_START_DATE: usize = 4;
const COL_CLOSING_DATE: usize = 5;

static SEL_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody tr, tr").expect("invalid selector: rows"));
static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: cells"));
static SEL_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("invalid selector: anchors"));

static RE_TSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TSE[:\s-]?(\w+)").expect("invalid regex: tse"));

/// Title/category/owner substructure recovered from the free-text details
/// cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenderDetails {
    pub title: String,
    pub category: String,
    pub department_owner: String,
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flattens an element's text the way a browser renders it: `<br>` and
/// block-level children become line breaks, everything else concatenates.
fn append_rendered_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let block = matches!(
                child_element.value().name(),
                "br" | "p" | "div" | "li" | "tr" | "ul" | "ol"
            );
            if block && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            append_rendered_text(child_element, out);
            if block && !out.ends_with('\n') {
                out.push('\n');
            }
        }
    }
}

/// Non-blank, whitespace-normalized lines of a table cell.
pub(crate) fn cell_lines(cell: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    append_rendered_text(cell, &mut raw);
    raw.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_whitespace(&cell.text().collect::<String>())
}

/// Splits a details blob, already line-split, into title, category and
/// owning department. Pure text heuristics; blank lines are ignored.
pub fn parse_details(lines: &[String]) -> TenderDetails {
    let lines: Vec<&str> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();

    let mut details = TenderDetails::default();

    if let Some(first) = lines.first() {
        details.title = (*first).to_string();
    }

    for line in &lines {
        let lower = line.to_lowercase();
        if let Some(at) = lower.find(CATEGORY_KEYWORD) {
            details.category = if let Some((_, rest)) = line.split_once(':') {
                rest.trim().to_string()
            } else if let Some((_, rest)) = line.split_once('-') {
                rest.trim().to_string()
            } else {
                // Keyword with no separator: drop the keyword, keep the rest.
                let mut stripped = (*line).to_string();
                stripped.replace_range(at..at + CATEGORY_KEYWORD.len(), "");
                stripped.trim().to_string()
            };
            break;
        }
    }

    for line in &lines {
        let lower = line.to_lowercase();
        if !OWNER_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
            continue;
        }
        let prefixed = OWNER_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(&format!("{keyword}:")));
        if prefixed {
            if let Some((_, rest)) = line.split_once(':') {
                details.department_owner = rest.trim().to_string();
            }
        } else if let Some((_, rest)) = line.split_once('-') {
            details.department_owner = rest.trim().to_string();
        }
        break;
    }

    if details.category.is_empty() && lines.len() > 1 {
        details.category = lines[1].to_string();
    }
    if details.department_owner.is_empty() && lines.len() > 2 {
        details.department_owner = lines[2].to_string();
    }

    details
}

/// Serial token embedded in a tender number, e.g. `TSE-431` in
/// `PPRA TSE-431/2024`. Empty when no such token exists.
pub(crate) fn extract_tse(number: &str) -> String {
    RE_TSE
        .captures(number)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}

/// Parses the rendered results table into tender records.
///
/// Any row that cannot be understood is logged and skipped; one bad row
/// never aborts the batch. An input without a recognizable table yields an
/// empty vec, which is a valid "no listings" state rather than an error.
pub fn parse_tender_table(html: &str, base_url: &str) -> Vec<Tender> {
    // The located results container may be a bare <tbody>, which a
    // body-context fragment parse would silently drop. Re-wrapping in
    // <table> keeps the rows; an already-wrapped table nests harmlessly.
    let fragment = Html::parse_fragment(&format!("<table>{html}</table>"));
    let mut tenders = Vec::new();
    for row in fragment.select(&SEL_ROW) {
        if let Some(tender) = parse_row(row, base_url) {
            tenders.push(tender);
        }
    }
    tenders
}

fn parse_row(row: ElementRef<'_>, base_url: &str) -> Option<Tender> {
    let row_text = row
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if row_text.is_empty() {
        return None;
    }
    if SENTINEL_PHRASES
        .iter()
        .any(|phrase| row_text.contains(phrase))
    {
        log::debug!("skipping sentinel row: {row_text}");
        return None;
    }
    if HEADER_KEYWORDS
        .iter()
        .any(|keyword| row_text.contains(keyword))
        && !row_text.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }

    let cells: Vec<ElementRef<'_>> = row.select(&SEL_CELL).collect();
    if cells.len() < MIN_CELLS {
        log::debug!(
            "skipping row with {} cell(s), expected at least {MIN_CELLS}",
            cells.len()
        );
        return None;
    }

    let number = cell_text(cells[COL_NUMBER]);
    if number.is_empty() {
        log::debug!("skipping row without a tender number: {row_text}");
        return None;
    }

    let details = parse_details(&cell_lines(cells[COL_DETAILS]));
    let document_links = cells[COL_LINKS]
        .select(&SEL_ANCHOR)
        .filter_map(|anchor| anchor.attr("href"))
        .map(|href| absolutize(base_url, href))
        .collect();

    Some(Tender {
        tse: extract_tse(&number),
        title: details.title,
        category: details.category,
        department_owner: details.department_owner,
        start_date: cell_text(cells[COL_START_DATE]),
        closing_date: cells
            .get(COL_CLOSING_DATE)
            .map(|cell| cell_text(*cell))
            .unwrap_or_default(),
        number,
        document_links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_details_with_labelled_fields() {
        let details = parse_details(&lines(&[
            "Widget Supply Contract",
            "Category: IT Hardware",
            "Department: Ministry of Works",
        ]));

        assert_eq!(details.title, "Widget Supply Contract");
        assert_eq!(details.category, "IT Hardware");
        assert_eq!(details.department_owner, "Ministry of Works");
    }

    #[test]
    fn test_parse_details_dash_separators() {
        let details = parse_details(&lines(&[
            "Bridge Rehabilitation",
            "Category - Civil Works",
            "Dept - Highways Authority",
        ]));

        assert_eq!(details.category, "Civil Works");
        assert_eq!(details.department_owner, "Highways Authority");
    }

    #[test]
    fn test_parse_details_keyword_without_separator() {
        let details = parse_details(&lines(&["Generator Maintenance", "Category Electrical"]));
        assert_eq!(details.category, "Electrical");
    }

    #[test]
    fn test_parse_details_positional_fallbacks() {
        let details = parse_details(&lines(&[
            "Supply of Stationery",
            "Office Supplies",
            "District Education Office",
        ]));

        assert_eq!(details.title, "Supply of Stationery");
        assert_eq!(details.category, "Office Supplies");
        assert_eq!(details.department_owner, "District Education Office");
    }

    #[test]
    fn test_parse_details_single_line() {
        let details = parse_details(&lines(&["Lone Title"]));
        assert_eq!(details.title, "Lone Title");
        assert!(details.category.is_empty());
        assert!(details.department_owner.is_empty());
    }

    #[test]
    fn test_parse_details_ignores_blank_lines() {
        let details = parse_details(&lines(&["  ", "Security Services", "", "Category: Guarding"]));
        assert_eq!(details.title, "Security Services");
        assert_eq!(details.category, "Guarding");
    }

    #[test]
    fn test_parse_details_empty_input() {
        let details = parse_details(&[]);
        assert_eq!(details, TenderDetails::default());
    }

    #[test]
    fn test_extract_tse_variants() {
        assert_eq!(extract_tse("TSE-431"), "431");
        assert_eq!(extract_tse("tse 99/2024"), "99");
        assert_eq!(extract_tse("PD/PPRA-007"), "");
        assert_eq!(extract_tse(""), "");
    }

    const BASE: &str = "https://ppra.gov.pk";

    fn row(number: &str, details: &str, links: &str, start: &str, closing: &str) -> String {
        format!(
            "<tr><td>1</td><td>{number}</td><td>{details}</td><td>{links}</td>\
             <td>{start}</td><td>{closing}</td></tr>"
        )
    }

    #[test]
    fn test_parse_table_single_row() {
        let html = format!(
            "<table><tbody>{}</tbody></table>",
            row(
                "TSE-2024-001",
                "Supply of Laptops<br>Category: IT Equipment<br>Department: Ministry of Education",
                r#"<a href="/docs/1.pdf">Download</a><a href="https://cdn.example.com/2.pdf">Mirror</a>"#,
                "01-02-2024",
                "15-02-2024",
            )
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders.len(), 1);

        let tender = &tenders[0];
        assert_eq!(tender.number, "TSE-2024-001");
        assert_eq!(tender.title, "Supply of Laptops");
        assert_eq!(tender.category, "IT Equipment");
        assert_eq!(tender.department_owner, "Ministry of Education");
        assert_eq!(tender.start_date, "01-02-2024");
        assert_eq!(tender.closing_date, "15-02-2024");
        assert_eq!(tender.tse, "2024");
        assert_eq!(
            tender.document_links,
            vec![
                "https://ppra.gov.pk/docs/1.pdf",
                "https://cdn.example.com/2.pdf",
            ]
        );
    }

    #[test]
    fn test_parse_table_skips_header_row() {
        let html = format!(
            "<table><tr><td>Sr No</td><td>Tender No</td><td>Tender Details</td>\
             <td>Downloads</td><td>Advertisement Date</td><td>Closing Date</td></tr>\
             {}</table>",
            row("T-1", "Road Works", "", "01-01-2024", "10-01-2024"),
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].number, "T-1");
    }

    #[test]
    fn test_parse_table_header_phrase_with_digits_is_data() {
        // "Closing" appears in the details text; the digits elsewhere in the
        // row mark it as data, not a header.
        let html = format!(
            "<table>{}</table>",
            row(
                "T-7",
                "Closing of open drains, phase 2",
                "",
                "01-01-2024",
                "10-01-2024",
            )
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].title, "Closing of open drains, phase 2");
    }

    #[test]
    fn test_parse_table_sentinel_row_yields_empty() {
        let html = "<table><tr><td colspan=\"6\">No Records Found</td></tr></table>";
        assert!(parse_tender_table(html, BASE).is_empty());
    }

    #[test]
    fn test_parse_table_short_row_skipped_batch_continues() {
        let html = format!(
            "<table><tr><td>orphan</td><td>cell</td></tr>{}</table>",
            row("T-2", "Water Supply Scheme", "", "02-01-2024", "12-01-2024"),
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].number, "T-2");
    }

    #[test]
    fn test_parse_table_row_without_number_skipped() {
        let html = format!(
            "<table>{}{}</table>",
            row("", "Unnumbered Notice", "", "03-01-2024", "13-01-2024"),
            row("T-3", "Numbered Notice", "", "03-01-2024", "13-01-2024"),
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].number, "T-3");
    }

    #[test]
    fn test_parse_table_missing_closing_date_tolerated() {
        let html = "<table><tr><td>1</td><td>T-4</td><td>Five Cell Row</td>\
                    <td></td><td>04-01-2024</td></tr></table>";

        let tenders = parse_tender_table(html, BASE);
        assert_eq!(tenders.len(), 1);
        assert_eq!(tenders[0].start_date, "04-01-2024");
        assert!(tenders[0].closing_date.is_empty());
    }

    #[test]
    fn test_parse_table_link_order_preserved() {
        let links = r#"<a href="/c.pdf">c</a><a href="/a.pdf">a</a><a href="/b.pdf">b</a>"#;
        let html = format!(
            "<table>{}</table>",
            row("T-5", "Ordered Links", links, "05-01-2024", "15-01-2024"),
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(
            tenders[0].document_links,
            vec![
                "https://ppra.gov.pk/c.pdf",
                "https://ppra.gov.pk/a.pdf",
                "https://ppra.gov.pk/b.pdf",
            ]
        );
    }

    #[test]
    fn test_parse_table_no_table_at_all() {
        assert!(parse_tender_table("<div>loading…</div>", BASE).is_empty());
    }

    #[test]
    fn test_details_cell_block_elements_become_lines() {
        let html = format!(
            "<table>{}</table>",
            row(
                "T-6",
                "<div>Hostel Furniture</div><div>Category: Furniture</div><div>Owner: University of Punjab</div>",
                "",
                "06-01-2024",
                "16-01-2024",
            )
        );

        let tenders = parse_tender_table(&html, BASE);
        assert_eq!(tenders[0].title, "Hostel Furniture");
        assert_eq!(tenders[0].category, "Furniture");
        assert_eq!(tenders[0].department_owner, "University of Punjab");
    }
}
