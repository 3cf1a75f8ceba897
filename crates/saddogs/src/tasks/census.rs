use futures::FutureExt;
use futures::future::BoxFuture;

use super::{Task, TaskContext, TaskError, TaskOutcome};
use crate::parser::{ParseError, parse_census_table};
use crate::types::CensusRecord;

pub const URL: &str = "https://www.zoocan.net/Paginas/Censos.aspx";

pub const TASK: Task = Task::new(
    "census",
    "ZOOCAN dog census per island (upsert by day)",
    URL,
    run,
);

fn run(ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
    scrape(ctx, URL).boxed()
}

pub async fn scrape(ctx: &TaskContext, url: &str) -> Result<TaskOutcome, TaskError> {
    let html = ctx.scraper.get_html(url).await?;
    let record = extract(ctx, &html)?;
    ctx.store_census(record).await
}

/// Census table -> record dated with the context's capture date.
pub fn extract(ctx: &TaskContext, html: &str) -> Result<CensusRecord, TaskError> {
    let keys = &ctx.table_keys;
    let table = parse_census_table(html, keys)?;

    let column = |label: &str| {
        table
            .column(label)
            .ok_or_else(|| ParseError::MissingColumn(label.to_string()))
    };
    let islands = column(&keys.islands)?;
    let dogs = column(&keys.dogs)?;

    Ok(ctx.normalizer.normalize(islands, dogs, ctx.capture_date)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizeError;
    use crate::store::{MemoryStore, RecordStore};
    use crate::types::{Island, Record};
    use chrono::NaiveDate;
    use std::fs;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    async fn serve(html: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Paginas/Censos.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_census_task_upserts_fixture() {
        let html = fs::read_to_string("fixtures/zoocan_censos.html")
            .expect("Failed to read census fixture");
        let server = serve(html).await;
        let store = Arc::new(MemoryStore::new());
        let ctx = TaskContext::new(store.clone())
            .unwrap()
            .with_capture_date(day(9));

        let url = format!("{}/Paginas/Censos.aspx", server.uri());
        let outcome = scrape(&ctx, &url).await.unwrap();

        assert!(outcome.stored);
        let Record::Census(record) = outcome.record else {
            panic!("expected a census record");
        };
        assert_eq!(record.date, day(9));
        assert_eq!(record.count(Island::Lanzarote), Some(27_158));

        // same-day rerun overwrites instead of adding a row
        scrape(&ctx, &url).await.unwrap();
        assert_eq!(store.fetch_census().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_census_task_without_required_column_writes_nothing() {
        let html = r#"
            <table>
                <thead><tr><th>Islas</th><th>Gatos</th></tr></thead>
                <tbody><tr><td>Tenerife</td><td>10</td></tr></tbody>
            </table>
        "#;
        let server = serve(html.to_string()).await;
        let store = Arc::new(MemoryStore::new());
        let ctx = TaskContext::new(store.clone()).unwrap();

        let err = scrape(&ctx, &format!("{}/Paginas/Censos.aspx", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Parse(ParseError::MissingColumn(_))));
        assert!(store.fetch_census().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_census_task_with_missing_island_writes_nothing() {
        let html = r#"
            <table>
                <thead><tr><th>Islas</th><th>Perros</th></tr></thead>
                <tbody>
                    <tr><td>Tenerife</td><td>10</td></tr>
                    <tr><td>Lanzarote</td><td>5</td></tr>
                </tbody>
            </table>
        "#;
        let server = serve(html.to_string()).await;
        let store = Arc::new(MemoryStore::new());
        let ctx = TaskContext::new(store.clone()).unwrap();

        let err = scrape(&ctx, &format!("{}/Paginas/Censos.aspx", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskError::Normalize(NormalizeError::MissingIsland(_))
        ));
        assert!(store.fetch_census().await.unwrap().is_empty());
    }
}
