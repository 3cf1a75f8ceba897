use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, Privilege, SupabaseConfig};
use crate::types::{CensusRecord, RescueRecord};

pub const CENSUS_TABLE: &str = "census";
pub const RESCUES_TABLE: &str = "rescues";
pub const CENSUS_CONFLICT_COLUMNS: &str = "year,month,day";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Table '{table}' rejected request ({status}): {message}")]
    Rejected {
        table: String,
        status: u16,
        message: String,
    },
    #[error("Failed to decode rows from '{table}': {source}")]
    Decode {
        table: String,
        source: serde_json::Error,
    },
    #[error("A client using the {0} key cannot write")]
    ReadOnly(Privilege),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Remote tables the scrapers write to and the web services read from.
///
/// Writes return the rows as the table reports them back.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert-or-update keyed by `(year, month, day)`.
    async fn upsert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError>;

    /// Plain insert; a second row for the same day violates the unique key.
    async fn insert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError>;

    async fn fetch_census(&self) -> Result<Vec<CensusRecord>, StoreError>;

    /// Append-only; identical inserts produce separate rows.
    async fn insert_rescue(&self, record: &RescueRecord) -> Result<Vec<RescueRecord>, StoreError>;

    async fn fetch_rescues(&self) -> Result<Vec<RescueRecord>, StoreError>;
}

#[derive(Debug, serde::Deserialize)]
struct PostgrestError {
    message: String,
}

/// PostgREST client for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    key: String,
    privilege: Privilege,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig, privilege: Privilege) -> Result<Self, StoreError> {
        let key = config.key(privilege)?.to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", config.url),
            key,
            privilege,
        })
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn write<T, R>(
        &self,
        table: &str,
        body: &T,
        on_conflict: Option<&str>,
    ) -> Result<Vec<R>, StoreError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        if !self.privilege.can_write() {
            return Err(StoreError::ReadOnly(self.privilege));
        }

        let mut request = self.request(Method::POST, table).json(body);
        request = match on_conflict {
            Some(columns) => request
                .query(&[("on_conflict", columns)])
                .header("Prefer", "resolution=merge-duplicates,return=representation"),
            None => request.header("Prefer", "return=representation"),
        };

        log::debug!("Writing to {} (on_conflict: {:?})", table, on_conflict);
        let response = request
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error writing {table}: {e:?}"))?;
        Self::decode(table, response).await
    }

    async fn select<R: DeserializeOwned>(&self, table: &str) -> Result<Vec<R>, StoreError> {
        log::debug!("Selecting all rows from {}", table);
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error reading {table}: {e:?}"))?;
        Self::decode(table, response).await
    }

    async fn decode<R: DeserializeOwned>(table: &str, response: Response) -> Result<Vec<R>, StoreError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<PostgrestError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(StoreError::Rejected {
                table: table.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| StoreError::Decode {
            table: table.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn upsert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError> {
        self.write(CENSUS_TABLE, record, Some(CENSUS_CONFLICT_COLUMNS))
            .await
    }

    async fn insert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError> {
        self.write(CENSUS_TABLE, record, None).await
    }

    async fn fetch_census(&self) -> Result<Vec<CensusRecord>, StoreError> {
        self.select(CENSUS_TABLE).await
    }

    async fn insert_rescue(&self, record: &RescueRecord) -> Result<Vec<RescueRecord>, StoreError> {
        self.write(RESCUES_TABLE, record, None).await
    }

    async fn fetch_rescues(&self) -> Result<Vec<RescueRecord>, StoreError> {
        self.select(RESCUES_TABLE).await
    }
}

/// In-process tables with the same key semantics as the remote ones.
#[derive(Debug, Default)]
pub struct MemoryStore {
    census: Mutex<BTreeMap<NaiveDate, CensusRecord>>,
    rescues: Mutex<Vec<RescueRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError> {
        let mut census = self.census.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = census
            .entry(record.date)
            .or_insert_with(|| CensusRecord::new(record.date));
        stored.counts.extend(record.counts.iter().map(|(k, v)| (*k, *v)));
        Ok(vec![stored.clone()])
    }

    async fn insert_census(&self, record: &CensusRecord) -> Result<Vec<CensusRecord>, StoreError> {
        let mut census = self.census.lock().unwrap_or_else(PoisonError::into_inner);
        if census.contains_key(&record.date) {
            return Err(StoreError::Rejected {
                table: CENSUS_TABLE.to_string(),
                status: 409,
                message: format!(
                    "duplicate key value violates unique constraint \"census_year_month_day_key\" ({})",
                    record.date
                ),
            });
        }
        census.insert(record.date, record.clone());
        Ok(vec![record.clone()])
    }

    async fn fetch_census(&self) -> Result<Vec<CensusRecord>, StoreError> {
        let census = self.census.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(census.values().cloned().collect())
    }

    async fn insert_rescue(&self, record: &RescueRecord) -> Result<Vec<RescueRecord>, StoreError> {
        let mut stored = record.clone();
        stored.created_at = Some(Utc::now());
        self.rescues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stored.clone());
        Ok(vec![stored])
    }

    async fn fetch_rescues(&self) -> Result<Vec<RescueRecord>, StoreError> {
        Ok(self
            .rescues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Island;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn config(server: &MockServer) -> SupabaseConfig {
        SupabaseConfig::new(server.uri())
            .with_service_role_key("service-key")
            .with_publishable_key("public-key")
    }

    #[tokio::test]
    async fn test_census_upsert_keeps_one_row_per_day() {
        let store = MemoryStore::new();
        let first = CensusRecord::new(date(9))
            .with_count(Island::Tenerife, 10)
            .with_count(Island::Lanzarote, 5);
        let second = CensusRecord::new(date(9))
            .with_count(Island::Tenerife, 12)
            .with_count(Island::Lanzarote, 6);

        store.upsert_census(&first).await.unwrap();
        store.upsert_census(&second).await.unwrap();

        let rows = store.fetch_census().await.unwrap();
        assert_eq!(rows, vec![second]);
    }

    #[tokio::test]
    async fn test_census_upsert_on_new_day_adds_row() {
        let store = MemoryStore::new();
        store
            .upsert_census(&CensusRecord::new(date(9)).with_count(Island::LaPalma, 1))
            .await
            .unwrap();
        store
            .upsert_census(&CensusRecord::new(date(10)).with_count(Island::LaPalma, 2))
            .await
            .unwrap();

        let rows = store.fetch_census().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(9));
        assert_eq!(rows[1].count(Island::LaPalma), Some(2));
    }

    #[tokio::test]
    async fn test_census_insert_rejects_same_day() {
        let store = MemoryStore::new();
        let record = CensusRecord::new(date(9)).with_count(Island::ElHierro, 3);

        store.insert_census(&record).await.unwrap();
        let err = store.insert_census(&record).await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected { status: 409, .. }));
        assert_eq!(store.fetch_census().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rescue_inserts_are_not_deduplicated() {
        let store = MemoryStore::new();
        let record = RescueRecord::new(37, "Sara", "Lanzarote");

        store.insert_rescue(&record).await.unwrap();
        store.insert_rescue(&record).await.unwrap();

        let rows = store.fetch_rescues().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.total_dogs == 37 && r.created_at.is_some()));
    }

    #[tokio::test]
    async fn test_supabase_upsert_targets_natural_key() {
        let server = MockServer::start().await;
        let record = CensusRecord::new(date(9)).with_count(Island::Tenerife, 98_311);

        Mock::given(method("POST"))
            .and(path("/rest/v1/census"))
            .and(query_param("on_conflict", "year,month,day"))
            .and(header("apikey", "service-key"))
            .and(header("Authorization", "Bearer service-key"))
            .and(body_json(json!({"tenerife": 98311, "year": 2025, "month": 3, "day": 9})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                {"id": 1, "tenerife": 98311, "year": 2025, "month": 3, "day": 9}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::ServiceRole).unwrap();
        let rows = store.upsert_census(&record).await.unwrap();
        assert_eq!(rows, vec![record]);

        let requests = server.received_requests().await.unwrap();
        let prefer = requests[0].headers.get("Prefer").unwrap().to_str().unwrap();
        assert_eq!(prefer, "resolution=merge-duplicates,return=representation");
    }

    #[tokio::test]
    async fn test_supabase_rescue_insert_is_plain_insert() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rescues"))
            .and(body_json(json!({"total_dogs": 64, "rescue_name": "Teguise", "island": "Lanzarote"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": 3,
                "total_dogs": 64,
                "rescue_name": "Teguise",
                "island": "Lanzarote",
                "created_at": "2025-03-09T06:00:01.52+00:00"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::ServiceRole).unwrap();
        let rows = store
            .insert_rescue(&RescueRecord::new(64, "Teguise", "Lanzarote"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].created_at.is_some());

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].url.query().is_none());
        let prefer = requests[0].headers.get("Prefer").unwrap().to_str().unwrap();
        assert_eq!(prefer, "return=representation");
    }

    #[tokio::test]
    async fn test_supabase_rejection_carries_postgrest_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/census"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "details": null,
                "hint": null,
                "message": "duplicate key value violates unique constraint"
            })))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::ServiceRole).unwrap();
        let err = store
            .insert_census(&CensusRecord::new(date(9)))
            .await
            .unwrap_err();

        match err {
            StoreError::Rejected {
                table,
                status,
                message,
            } => {
                assert_eq!(table, "census");
                assert_eq!(status, 409);
                assert_eq!(message, "duplicate key value violates unique constraint");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publishable_client_cannot_write() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::Publishable).unwrap();
        let err = store
            .insert_rescue(&RescueRecord::new(1, "Sara", "Lanzarote"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly(Privilege::Publishable)));
    }

    #[tokio::test]
    async fn test_publishable_client_reads_with_its_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/census"))
            .and(query_param("select", "*"))
            .and(header("apikey", "public-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "no_canario": 1204, "year": 2025, "month": 3, "day": 9},
                {"id": 2, "no_canario": 1210, "year": 2025, "month": 3, "day": 10}
            ])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::Publishable).unwrap();
        let rows = store.fetch_census().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].count(Island::NoCanario), Some(1210));
    }

    #[tokio::test]
    async fn test_undecodable_rows_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/rescues"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&config(&server), Privilege::ServiceRole).unwrap();
        let err = store.fetch_rescues().await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref table, .. } if table == "rescues"));
    }

    #[test]
    fn test_missing_key_fails_construction() {
        let config = SupabaseConfig::new("https://abc.supabase.co").with_service_role_key("k");
        let err = SupabaseStore::new(&config, Privilege::Publishable).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Config(ConfigError::MissingKey(Privilege::Publishable))
        ));
    }
}
