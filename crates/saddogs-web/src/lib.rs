pub mod api_error;
pub mod pages;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use saddogs::RecordStore;
use saddogs::types::{CensusRecord, CensusRow};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

pub use api_error::ApiError;
use pages::PageError;

pub const API_BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const DASHBOARD_BIND_ADDRESS: &str = "127.0.0.1:8001";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// `POST /census` body. Every island is required.
#[derive(Debug, Clone, Deserialize)]
pub struct CensusItem {
    pub no_canario: i64,
    pub el_hierro: i64,
    pub fuerteventura: i64,
    pub gran_canaria: i64,
    pub la_gomera: i64,
    pub la_palma: i64,
    pub lanzarote: i64,
    pub tenerife: i64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<CensusItem> for CensusRow {
    fn from(item: CensusItem) -> Self {
        CensusRow {
            no_canario: Some(item.no_canario),
            el_hierro: Some(item.el_hierro),
            fuerteventura: Some(item.fuerteventura),
            gran_canaria: Some(item.gran_canaria),
            la_gomera: Some(item.la_gomera),
            la_palma: Some(item.la_palma),
            lanzarote: Some(item.lanzarote),
            tenerife: Some(item.tenerife),
            year: item.year,
            month: item.month,
            day: item.day,
        }
    }
}

async fn create_census(
    State(state): State<AppState>,
    Json(item): Json<CensusItem>,
) -> Result<(StatusCode, Json<DataResponse<Vec<CensusRecord>>>), ApiError> {
    let record = CensusRecord::try_from(CensusRow::from(item))?;
    log::info!("Inserting census row for {}", record.date);

    let data = state.store.insert_census(&record).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

async fn list_census(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<CensusRecord>>>, ApiError> {
    let data = state.store.fetch_census().await?;
    Ok(Json(DataResponse { data }))
}

async fn census_page(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let records = state.store.fetch_census().await?;
    Ok(Html(pages::census_page(&records)?))
}

async fn census_graph(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let records = state.store.fetch_census().await?;
    let html = pages::chart_page("Dogs per island", &pages::census_chart(&records))?;
    Ok(Html(html))
}

async fn rescues_graph(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let records = state.store.fetch_rescues().await?;
    let html = pages::chart_page("Dogs per rescue", &pages::rescue_chart(&records))?;
    Ok(Html(html))
}

/// JSON write API over the census table.
pub fn api_router(store: Arc<dyn RecordStore>) -> Router {
    Router::new()
        .route("/census", get(list_census).post(create_census))
        .with_state(AppState { store })
}

/// Read-only HTML pages over both tables.
pub fn dashboard_router(store: Arc<dyn RecordStore>) -> Router {
    Router::new()
        .route("/", get(census_page))
        .route("/graph", get(census_graph))
        .route("/graph-rescues", get(rescues_graph))
        .with_state(AppState { store })
}

/// Binds `BIND_ADDRESS` (or `default_address`) and serves until Ctrl-C.
pub async fn serve(router: Router, default_address: &str) -> anyhow::Result<()> {
    let address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| default_address.into());
    let router = router.layer(CorsLayer::permissive());
    let tcp_listener = tokio::net::TcpListener::bind(&address).await?;

    log::info!("Starting server on address: {}", address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
