use std::sync::Arc;

use saddogs::{Privilege, SupabaseConfig, SupabaseStore};
use saddogs_web::{API_BIND_ADDRESS, api_router, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let config = SupabaseConfig::from_env()?;
    let store = SupabaseStore::new(&config, Privilege::ServiceRole)?;
    log::info!("Writing to {} with the {} key", config.url, store.privilege());

    serve(api_router(Arc::new(store)), API_BIND_ADDRESS).await
}
