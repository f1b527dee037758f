use dotenvy::dotenv;
use tracing::info;

use crypto_rebalancer_bot::config::Config;
use crypto_rebalancer_bot::db::{connection, schema};
use crypto_rebalancer_bot::logging;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    logging::init_logging();

    let config = Config::load();
    let pool = connection::create_pool(&config).await?;
    schema::init_schema(&pool).await?;
    info!("Database schema initialized");

    Ok(())
}
