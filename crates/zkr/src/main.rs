use std::sync::Arc;

use tracing::info;

use zkr_core::config::Config;
use zkr_sqlite::SqliteStore;
use zkr_translate::HttpProviderFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zkr_core::logging::init("zkr")?;

    let cfg = Arc::new(Config::load()?);
    info!(database_url = %cfg.database_url, "starting relay bot");

    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    let factory = Arc::new(HttpProviderFactory::new(cfg.openai_model.clone())?);

    zkr_discord::router::run_gateway(cfg, store, factory).await
}
