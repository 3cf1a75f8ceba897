use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use saddogs::config::{Privilege, SupabaseConfig};
use saddogs::store::{MemoryStore, RecordStore, SupabaseStore};
use saddogs::tasks::{TASKS, TaskContext, select_tasks};

#[derive(Parser)]
#[command(name = "saddogs")]
#[command(about = "Canary Islands dog census and shelter scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered scrape tasks
    Tasks,
    /// Scrape source pages and store the extracted counts
    Scrape {
        #[arg(
            long,
            help = "Only run tasks whose name contains this text (case-insensitive)"
        )]
        task: Option<String>,

        #[arg(long, help = "Keep records in memory instead of writing to Supabase")]
        dry_run: bool,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Print every stored census row
    Census {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Print every stored rescue row
    Rescues {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn load_config() -> SupabaseConfig {
    SupabaseConfig::from_env().unwrap_or_else(|e| {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    })
}

fn remote_store(config: &SupabaseConfig, privilege: Privilege) -> Arc<dyn RecordStore> {
    let store = SupabaseStore::new(config, privilege).unwrap_or_else(|e| {
        log::error!("Error creating Supabase client: {}", e);
        process::exit(1);
    });
    Arc::new(store)
}

fn reader() -> Arc<dyn RecordStore> {
    let config = load_config();
    let privilege = config.read_privilege();
    log::debug!("Reading with the {} key", privilege);
    remote_store(&config, privilege)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Tasks => {
            for (i, task) in TASKS.iter().enumerate() {
                println!("{:>3}. {}", i + 1, task);
            }
        }

        Commands::Scrape {
            task,
            dry_run,
            format,
        } => {
            let store: Arc<dyn RecordStore> = if dry_run {
                log::info!("Dry run: records are kept in memory");
                Arc::new(MemoryStore::new())
            } else {
                remote_store(&load_config(), Privilege::ServiceRole)
            };

            let ctx = TaskContext::new(store).unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });

            let tasks = select_tasks(task.as_deref());
            if let Some(filter) = &task {
                log::info!("Selected {} task(s) matching '{}'", tasks.len(), filter);
            }

            let summary = saddogs::run_tasks(&ctx, &tasks).await;

            match format {
                OutputFormat::Json => serialize_json(&summary.records()),
                OutputFormat::Text => print!("{}", summary),
            }

            if !summary.is_success() {
                process::exit(1);
            }
        }

        Commands::Census { format } => {
            let rows = reader().fetch_census().await.unwrap_or_else(|e| {
                log::error!("Error fetching census rows: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&rows),
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No entries to display.");
                    }
                    for (i, row) in rows.iter().enumerate() {
                        println!("{:>3}. {}", i + 1, row);
                    }
                }
            }
        }

        Commands::Rescues { format } => {
            let rows = reader().fetch_rescues().await.unwrap_or_else(|e| {
                log::error!("Error fetching rescue rows: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&rows),
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No entries to display.");
                    }
                    for (i, row) in rows.iter().enumerate() {
                        println!("{:>3}. {}", i + 1, row);
                    }
                }
            }
        }
    }
}
