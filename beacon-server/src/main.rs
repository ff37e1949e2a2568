use std::{env, sync::Arc};

use beacon_core::{Beacon, Config, DatabaseError, PgDatabase};
use beacon_server::{init_logger, run_server, ServerContext};
use colored::Colorize;
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum BootError {
    #[error("Could not initialize storage: {0}")]
    Storage(#[from] DatabaseError),
    #[error("BEACON_DATABASE_URL is not set")]
    MissingDatabaseUrl,
}

impl BootError {
    fn hint(&self) -> String {
        match self {
            BootError::Storage(_) => {
                "This is a storage error. Make sure the postgres instance is running and reachable, then try again."
                    .to_string()
            }
            BootError::MissingDatabaseUrl => {
                "Set BEACON_DATABASE_URL to a postgres connection string.".to_string()
            }
        }
    }
}

async fn boot() -> Result<Arc<Beacon>, BootError> {
    let url = env::var("BEACON_DATABASE_URL").map_err(|_| BootError::MissingDatabaseUrl)?;

    info!("Connecting to storage...");
    let database = Arc::new(PgDatabase::connect(&url).await?);

    info!("Restoring presence state...");
    let beacon = Beacon::new(database, Config::default()).await?;

    Ok(Arc::new(beacon))
}

#[tokio::main]
async fn main() {
    init_logger();

    let beacon = match boot().await {
        Ok(beacon) => beacon,
        Err(error) => {
            error!("{}", "Beacon failed to start!".bold().red());
            error!("{error}");
            error!("{}", format!("Hint: {}", error.hint()).italic());
            return;
        }
    };

    beacon.start();
    info!("Initialized successfully.");

    let context = ServerContext {
        beacon: beacon.clone(),
    };

    run_server(context, async {
        tokio::signal::ctrl_c()
            .await
            .expect("listens for shutdown signal");
    })
    .await;

    info!("Shutting down...");
    beacon.stop().await;
}
