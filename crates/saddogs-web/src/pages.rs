use std::collections::BTreeMap;

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::{Datelike, SecondsFormat};
use saddogs::StoreError;
use saddogs::types::{CensusRecord, Island, RescueRecord};
use serde::Serialize;

#[derive(Template)]
#[template(path = "census.html")]
pub struct CensusTemplate {
    pub title: String,
    pub table: String,
}

#[derive(Template)]
#[template(path = "chart.html")]
pub struct ChartTemplate {
    pub title: String,
    pub title_json: String,
    pub data_json: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub title: String,
    pub message: String,
}

/// Read failure rendered as a 500 HTML page.
#[derive(Debug)]
pub struct PageError(String);

impl From<StoreError> for PageError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

impl From<askama::Error> for PageError {
    fn from(err: askama::Error) -> Self {
        Self(format!("Failed to render template: {}", err))
    }
}

impl From<serde_json::Error> for PageError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("Failed to encode chart data: {}", err))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        log::error!("Failed to render page: {}", self.0);
        match error_page(&self.0) {
            Ok(html) => (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response(),
            Err(e) => {
                log::error!("Failed to render error page: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Option<i64>>,
}

/// Chart.js `data` object: one x label per point, one dataset per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

fn table_line(cells: &[&str], widths: &[usize]) -> String {
    let cells: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, &width)| format!(" {:<width$} ", cells.get(i).copied().unwrap_or("")))
        .collect();
    format!("|{}|", cells.join("|"))
}

/// Plain-text grid. Returns `"No data"` when there are no rows.
pub fn ascii_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return "No data".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut lines = vec![border.clone(), table_line(headers, &widths), border.clone()];
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(table_line(&cells, &widths));
    }
    lines.push(border);
    lines.join("\n")
}

pub fn census_table(records: &[CensusRecord]) -> String {
    let mut headers = vec!["year", "month", "day"];
    headers.extend(Island::ALL.iter().map(Island::key));

    let mut records = records.to_vec();
    records.sort_by_key(|r| r.date);

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let mut row = vec![
                record.date.year().to_string(),
                record.date.month().to_string(),
                record.date.day().to_string(),
            ];
            row.extend(Island::ALL.iter().map(|island| {
                record
                    .count(*island)
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            }));
            row
        })
        .collect();

    ascii_table(&headers, &rows)
}

/// One line per island over capture date.
pub fn census_chart(records: &[CensusRecord]) -> ChartData {
    let mut records = records.to_vec();
    records.sort_by_key(|r| r.date);

    ChartData {
        labels: records.iter().map(|r| r.date.to_string()).collect(),
        datasets: Island::ALL
            .iter()
            .map(|island| Dataset {
                label: island.to_string(),
                data: records.iter().map(|r| r.count(*island)).collect(),
            })
            .collect(),
    }
}

/// One line per rescue over `created_at`, one x label per stored row.
///
/// Rows the table has not stamped are skipped.
pub fn rescue_chart(records: &[RescueRecord]) -> ChartData {
    let mut stamped: Vec<(chrono::DateTime<chrono::Utc>, &RescueRecord)> = records
        .iter()
        .filter_map(|r| r.created_at.map(|at| (at, r)))
        .collect();
    stamped.sort_by_key(|(at, _)| *at);

    let labels = stamped
        .iter()
        .map(|(at, _)| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .collect();

    let mut by_rescue: BTreeMap<&str, Vec<Option<i64>>> = BTreeMap::new();
    for (i, (_, record)) in stamped.iter().enumerate() {
        by_rescue
            .entry(record.rescue_name.as_str())
            .or_insert_with(|| vec![None; stamped.len()])[i] = Some(record.total_dogs);
    }

    let datasets = by_rescue
        .into_iter()
        .map(|(name, data)| Dataset {
            label: name.to_string(),
            data,
        })
        .collect();

    ChartData { labels, datasets }
}

pub fn census_page(records: &[CensusRecord]) -> Result<String, askama::Error> {
    CensusTemplate {
        title: "Canary Islands dog census".to_string(),
        table: census_table(records),
    }
    .render()
}

/// Embeds `data` as JSON in an inline script.
pub fn chart_page(title: &str, data: &ChartData) -> Result<String, PageError> {
    // keep "</script>" inside string values from closing the tag
    let guard = |json: String| json.replace("</", "<\\/");
    let template = ChartTemplate {
        title: title.to_string(),
        title_json: guard(serde_json::to_string(title)?),
        data_json: guard(serde_json::to_string(data)?),
    };
    Ok(template.render()?)
}

pub fn error_page(message: &str) -> Result<String, askama::Error> {
    ErrorTemplate {
        title: "Something went wrong".to_string(),
        message: message.to_string(),
    }
    .render()
}
