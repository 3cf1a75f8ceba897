pub mod browser;
pub mod config;
pub mod normalize;
pub mod parser;
pub mod runner;
pub mod scraper;
pub mod store;
pub mod tasks;
pub mod types;

pub use config::{Privilege, SupabaseConfig};
pub use runner::{RunSummary, run_tasks};
pub use scraper::{FetchError, WebScraper};
pub use store::{MemoryStore, RecordStore, StoreError, SupabaseStore};
pub use tasks::{TASKS, Task, TaskContext, TaskError, select_tasks};
