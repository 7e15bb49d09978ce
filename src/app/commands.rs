use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mongodb::bson::Document;
use serde_json::Value;
use tracing::{debug, info};

use crate::app::cli::{Cli, Commands};
use crate::config::Settings;
use crate::mongo::aggregation::Pipeline;
use crate::mongo::client;
use crate::mongo::stage::Stage;
use crate::utils::export::{CursorFormatter, Destination, OutputOptions};
use crate::utils::json;

pub async fn dispatch(cli: Cli, mut settings: Settings) -> Result<()> {
    if let Some(uri) = cli.uri {
        settings.uri = uri;
    }
    let db = cli
        .db
        .or_else(|| settings.database.clone())
        .context("No database given: pass --db or set MONGO_AGG_DATABASE")?;

    match cli.command {
        Commands::Run {
            pipeline,
            format,
            output,
            fields,
            dates,
            time_format,
        } => {
            let client = client::connect(&settings, true).await?;
            let collection = client.database(&db).collection::<Document>(&cli.collection);
            let mut pipeline = load_pipeline(&pipeline, collection)?;
            debug!(pipeline = %pipeline, "loaded pipeline");

            let stream = pipeline.execute().await?;
            let mut formatter = CursorFormatter::new(stream, Destination::parse(&output), format);
            let options = OutputOptions {
                fields,
                date_fields: dates,
                time_format: Some(time_format.unwrap_or(settings.time_format)),
            };
            let count = formatter.output(&options).await?;

            info!(
                count,
                elapsed_ms = pipeline.elapsed().map(|d| d.num_milliseconds()),
                "aggregation finished"
            );
        }
        Commands::Show { pipeline, style } => {
            // rendering needs only the collection name
            let client = client::connect(&settings, false).await?;
            let collection = client.database(&db).collection::<Document>(&cli.collection);
            let pipeline = load_pipeline(&pipeline, collection)?;
            print!("{}", pipeline.render(style)?);
        }
        Commands::CreateView {
            pipeline,
            name,
            collation,
        } => {
            let collation = collation
                .map(|text| -> Result<Document> {
                    let value: Value =
                        serde_json::from_str(&text).context("Failed to parse collation JSON")?;
                    Ok(json::json_to_bson(value)?)
                })
                .transpose()?;

            let client = client::connect(&settings, true).await?;
            let database = client.database(&db);
            let pipeline = load_pipeline(&pipeline, database.collection::<Document>(&cli.collection))?;

            let reply = pipeline.define_view(&database, &name, collation).await?;
            println!("{}", serde_json::to_string_pretty(&json::bson_to_json(reply))?);
        }
    }

    Ok(())
}

/// Read a JSON array of stage documents and build a pipeline from it.
pub fn load_pipeline<C>(path: &Path, target: C) -> Result<Pipeline<C>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Pipeline file {} is not valid JSON", path.display()))?;

    let mut pipeline = Pipeline::new(target);
    for (index, doc) in json::json_array_to_documents(value)?.into_iter().enumerate() {
        let stage = Stage::try_from(doc).with_context(|| format!("Invalid stage #{}", index + 1))?;
        pipeline.push_stage(stage)?;
    }
    Ok(pipeline)
}
