use mongodb::{Client, options::ClientOptions};
use anyhow::{Result, Context};
use tracing::{debug, info};

use crate::config::Settings;

/// Build a client from `settings`. With `verify` set, ping the server so a
/// bad URI or unreachable host fails here instead of on first use.
pub async fn connect(settings: &Settings, verify: bool) -> Result<Client> {
    let mut options = ClientOptions::parse(&settings.uri)
        .await
        .context("Failed to parse MongoDB connection URI")?;

    options.app_name = Some(settings.app_name.clone());

    let client = Client::with_options(options)
        .context("Failed to create MongoDB client with options")?;

    if verify {
        client
            .database("admin")
            .run_command(mongodb::bson::doc! {"ping": 1}, None)
            .await
            .context("Failed to ping MongoDB server - connection test failed")?;
        info!(app_name = %settings.app_name, "connected to MongoDB");
    } else {
        debug!(app_name = %settings.app_name, "created MongoDB client without ping");
    }

    Ok(client)
}
