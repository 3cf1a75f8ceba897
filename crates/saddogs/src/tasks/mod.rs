//! Registry of scrape tasks, one per source page.
//!
//! Tasks are listed statically in [`TASKS`]; nothing is discovered at runtime.

pub mod census;
pub mod lanzarote;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;

use crate::browser::RenderOptions;
use crate::normalize::{CensusNormalizer, NormalizeError};
use crate::parser::{ParseError, TableKeys};
use crate::scraper::{FetchError, WebScraper};
use crate::store::{RecordStore, StoreError};
use crate::types::{CensusRecord, Record, RescueRecord};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a task produced and whether the remote table accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub record: Record,
    pub stored: bool,
}

pub type TaskFn = for<'a> fn(&'a TaskContext) -> BoxFuture<'a, Result<TaskOutcome, TaskError>>;

pub struct Task {
    pub name: &'static str,
    pub description: &'static str,
    pub url: &'static str,
    run: TaskFn,
}

impl Task {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        url: &'static str,
        run: TaskFn,
    ) -> Self {
        Self {
            name,
            description,
            url,
            run,
        }
    }

    pub async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        (self.run)(ctx).await
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<26} {}", self.name, self.description)
    }
}

pub static TASKS: &[Task] = &[
    census::TASK,
    lanzarote::SARA,
    lanzarote::TEGUISE,
    lanzarote::CASA_ESTRELLAS,
];

/// Tasks whose name contains `filter` (case-insensitive); all tasks for `None`.
pub fn select_tasks(filter: Option<&str>) -> Vec<&'static Task> {
    let filter = filter.map(str::to_lowercase);
    TASKS
        .iter()
        .filter(|task| {
            filter
                .as_deref()
                .is_none_or(|f| task.name.to_lowercase().contains(f))
        })
        .collect()
}

/// Shared, read-only inputs for a run.
pub struct TaskContext {
    pub scraper: WebScraper,
    pub store: Arc<dyn RecordStore>,
    pub normalizer: CensusNormalizer,
    pub table_keys: TableKeys,
    pub render: RenderOptions,
    pub capture_date: NaiveDate,
}

impl TaskContext {
    /// Defaults plus today's UTC date as the capture date.
    pub fn new(store: Arc<dyn RecordStore>) -> Result<Self, FetchError> {
        Ok(Self {
            scraper: WebScraper::new()?,
            store,
            normalizer: CensusNormalizer::default(),
            table_keys: TableKeys::default(),
            render: RenderOptions::default(),
            capture_date: Utc::now().date_naive(),
        })
    }

    pub fn with_normalizer(mut self, normalizer: CensusNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_table_keys(mut self, table_keys: TableKeys) -> Self {
        self.table_keys = table_keys;
        self
    }

    pub fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    pub fn with_capture_date(mut self, capture_date: NaiveDate) -> Self {
        self.capture_date = capture_date;
        self
    }

    /// Upserts by day. A failed write fails the task.
    async fn store_census(&self, record: CensusRecord) -> Result<TaskOutcome, TaskError> {
        let rows = self
            .store
            .upsert_census(&record)
            .await
            .inspect_err(|e| log::error!("Upsert failed: {e}"))?;
        log::info!("Upsert successful: {} row(s) for {}", rows.len(), record.date);

        Ok(TaskOutcome {
            record: Record::Census(record),
            stored: true,
        })
    }

    /// Inserts a new row. A failed write is logged and the record reported unstored.
    async fn store_rescue(&self, record: RescueRecord) -> TaskOutcome {
        let stored = match self.store.insert_rescue(&record).await {
            Ok(rows) => {
                log::info!(
                    "Saved {} row(s) for rescue {}",
                    rows.len(),
                    record.rescue_name
                );
                true
            }
            Err(e) => {
                log::error!("Failed to insert rescue {}: {}", record.rescue_name, e);
                false
            }
        };

        TaskOutcome {
            record: Record::Rescue(record),
            stored,
        }
    }
}
