use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::normalize::parse_count;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Column '{0}' not found in table header")]
    MissingColumn(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid count: {0:?}")]
    InvalidCount(String),
}

/// Header labels a census table must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeys {
    pub islands: String,
    pub dogs: String,
}

impl Default for TableKeys {
    fn default() -> Self {
        Self {
            islands: "Islas".to_string(),
            dogs: "Perros".to_string(),
        }
    }
}

/// A table split into columns, in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusTable {
    pub header: Vec<String>,
    pub columns: Vec<Vec<String>>,
}

impl CensusTable {
    pub fn column(&self, label: &str) -> Option<&[String]> {
        self.header
            .iter()
            .position(|h| h == label)
            .and_then(|i| self.columns.get(i))
            .map(Vec::as_slice)
    }
}

pub const TEGUISE_TOTAL_ID: &str = "dnn_ctr383_View_lblTotal";

const TEGUISE_HIDDEN_FIELDS: [&str; 5] = [
    "__dnnVariable",
    "__RequestVerificationToken",
    "__VIEWSTATE",
    "__VIEWSTATEGENERATOR",
    "__EVENTVALIDATION",
];

static SEL_HEADER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table thead th").expect("invalid selector: header"));
static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tbody td").expect("invalid selector: cell"));
static SEL_SMALL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("small").expect("invalid selector: small"));
static SEL_TEGUISE_TOTAL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span#dnn_ctr383_View_lblTotal").expect("invalid selector: teguise total")
});
static RE_ANIMALES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([\d.]+)\s*animales\s*$").expect("invalid regex: animales")
});

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits row-major `cells` into `header.len()` columns using `index mod column_count`.
///
/// Assumes a rectangular table. A short or long row shifts every cell after it
/// into the wrong column; nothing here detects that.
pub fn reshape_columns(header: &[String], cells: Vec<String>) -> Vec<Vec<String>> {
    let column_count = header.len();
    if column_count == 0 {
        return Vec::new();
    }

    let mut columns = vec![Vec::with_capacity(cells.len() / column_count + 1); column_count];
    for (i, cell) in cells.into_iter().enumerate() {
        columns[i % column_count].push(cell);
    }
    columns
}

pub fn parse_header(document: &Html, keys: &TableKeys) -> Result<Vec<String>, ParseError> {
    let header: Vec<String> = document
        .select(&SEL_HEADER)
        .map(|th| normalize_whitespace(&elem_text(th)))
        .collect();

    check_header(&header, keys)?;
    Ok(header)
}

fn check_header(header: &[String], keys: &TableKeys) -> Result<(), ParseError> {
    for label in [&keys.islands, &keys.dogs] {
        if !header.iter().any(|h| h == label) {
            return Err(ParseError::MissingColumn(label.clone()));
        }
    }
    Ok(())
}

pub fn parse_census_table(html: &str, keys: &TableKeys) -> Result<CensusTable, ParseError> {
    let document = Html::parse_document(html);
    let header = parse_header(&document, keys)?;

    let cells: Vec<String> = document
        .select(&SEL_CELL)
        .map(|td| normalize_whitespace(&elem_text(td)))
        .collect();

    log::debug!(
        "Census table: {} column(s), {} cell(s)",
        header.len(),
        cells.len()
    );
    if cells.len() % header.len() != 0 {
        log::warn!(
            "Census table is not rectangular: {} cells for {} columns",
            cells.len(),
            header.len()
        );
    }

    let columns = reshape_columns(&header, cells);
    Ok(CensusTable { header, columns })
}

/// Reads `"<n> animales"` from the first `<small>` element.
pub fn parse_animal_count(html: &str) -> Result<i64, ParseError> {
    let document = Html::parse_document(html);
    let raw = document
        .select(&SEL_SMALL)
        .next()
        .map(elem_text)
        .ok_or_else(|| ParseError::MissingField("small element with animal count".to_string()))?;

    let caps = RE_ANIMALES
        .captures(&raw)
        .ok_or_else(|| ParseError::InvalidCount(raw.trim().to_string()))?;
    parse_count(&caps[1]).map_err(|_| ParseError::InvalidCount(raw.trim().to_string()))
}

/// Builds the async postback that lists dogs on the Teguise shelter page.
pub fn teguise_search_form(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);

    let hidden = |name: &str| -> String {
        Selector::parse(&format!("input[name='{name}']"))
            .ok()
            .and_then(|sel| {
                document
                    .select(&sel)
                    .next()
                    .and_then(|e| e.value().attr("value"))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                log::warn!("Hidden field {name} not found on Teguise page");
                String::new()
            })
    };

    let mut form: Vec<(String, String)> = [
        ("ScriptManager", "ScriptManager|dnn$ctr383$View$lnkSearch"),
        ("dnn$dnnSearch2$txtSearch", ""),
        ("dnn$ctr383$View$chkPerro", "on"),
        ("dnn$ctr383$View$num_resultados", "19"),
        ("dnn$ctr383$View$pagina_actual", "1"),
        ("ScrollTop", "0"),
        ("__EVENTTARGET", "dnn$ctr383$View$lnkSearch"),
        ("__EVENTARGUMENT", ""),
        ("__VIEWSTATEENCRYPTED", ""),
        ("__ASYNCPOST", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for name in TEGUISE_HIDDEN_FIELDS {
        form.push((name.to_string(), hidden(name)));
    }
    form
}

/// Pulls the dog total out of an ASP.NET pipe-delimited partial response.
pub fn parse_teguise_total(body: &str) -> Result<i64, ParseError> {
    let fragment = body
        .split('|')
        .find(|part| part.contains(TEGUISE_TOTAL_ID))
        .ok_or_else(|| ParseError::MissingField(format!("{TEGUISE_TOTAL_ID} segment")))?;

    let document = Html::parse_fragment(fragment);
    let raw = document
        .select(&SEL_TEGUISE_TOTAL)
        .next()
        .map(elem_text)
        .ok_or_else(|| ParseError::MissingField(format!("span#{TEGUISE_TOTAL_ID}")))?;

    parse_count(&raw).map_err(|_| ParseError::InvalidCount(raw.trim().to_string()))
}

pub fn count_elements(html: &str, selector: &Selector) -> usize {
    Html::parse_document(html).select(selector).count()
}
