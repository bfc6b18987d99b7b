use actix_web::{web, App, HttpServer};
use std::error::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use neurosync_rewards::api;
use neurosync_rewards::config::Config;
use neurosync_rewards::database::Database;
use neurosync_rewards::RewardsLedger;

async fn start_api(ledger: RewardsLedger<Database>, config: &Config) -> std::io::Result<()> {
    let ledger_data = web::Data::new(ledger);

    HttpServer::new(move || {
        App::new()
            .app_data(ledger_data.clone())
            .configure(api::configure::<Database>)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    info!(database = %config.database_url, "opening rewards store");
    let database = Database::new(&config.database_url).await?;
    let ledger = RewardsLedger::new(database, config.ledger());

    info!(
        "starting NeuroSync rewards API on http://{}:{}",
        config.bind_address, config.port
    );
    start_api(ledger, &config).await?;

    Ok(())
}
