mod app_config;
mod config;
mod data;
mod db;
mod generator;
mod seed;
mod service;

use chrono::Local;
use ::config::FileFormat;
use env_logger::Env;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::app_config::AppConfig;
use crate::config::Config;
use crate::db::postgres::PostgresService;
use service::{local::LocalService, Gateway};

/// Looked up as `seed.toml`, `seed.json`, ... in the working directory.
const DEFAULT_SETTINGS: &str = "seed";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // an explicit settings path must exist; the default one may not
    let app_config = match std::env::args().nth(1) {
        Some(path) => AppConfig::init().from_file(&path, FileFormat::Toml)?,
        None => AppConfig::init().from_optional_file(DEFAULT_SETTINGS)?,
    };
    let settings = app_config.from_env()?.parse()?;

    let gateway: Box<dyn Gateway> = match &settings.output_dir {
        Some(dir) => {
            info!("Using local gateway");
            Box::new(LocalService::init(dir)?)
        }
        None => {
            info!("Using postgres gateway");
            let config = Config::from_env()?;
            Box::new(
                PostgresService::new(
                    &config,
                    settings.batch_size,
                    settings.schema_file.as_deref(),
                )
                .await?,
            )
        }
    };

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let now = Local::now().naive_local();
    let summary = seed::run(gateway.as_ref(), &settings, &mut rng, now).await?;
    info!(
        "Done: inserted users={}, events={}, orders={}",
        summary.inserted.users, summary.inserted.events, summary.inserted.orders
    );
    Ok(())
}
