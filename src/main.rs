use std::sync::Arc;

use carpool::api::DynAPI;
use carpool::config::Config;
use carpool::engine::Engine;
use carpool::error::{enable_diagnostics, Error};
use carpool::server::serve;
use carpool::store::PgStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if config.is_development() {
        enable_diagnostics();
    }

    let store = PgStore::new(&config.database_url, config.database_max_connections).await?;
    let engine = Engine::new(Arc::new(store))?;

    serve(Arc::new(engine) as DynAPI, config.bind_addr).await
}
