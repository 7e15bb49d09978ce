//! # mongo-agg
//!
//! Convenience layer over the MongoDB driver for aggregation work:
//!
//! - [`Pipeline`] accumulates stages in order and runs, renders or saves
//!   them as a view
//! - [`SortSpec`] keeps `$sort` fields in insertion order
//! - [`CursorFormatter`] writes a result stream as CSV or pretty JSON lines,
//!   with dotted-path projection and date formatting
//! - [`utils::nested`] reads and inserts values at dotted paths
//!
//! ```rust,ignore
//! use mongo_agg::{CursorFormatter, OutputFormat, OutputOptions, Pipeline};
//! use mongodb::bson::doc;
//!
//! let mut pipeline = Pipeline::new(collection);
//! pipeline.add_match(doc! { "status": "A" })?.add_limit(Some(5))?;
//!
//! let stream = pipeline.execute().await?;
//! let mut formatter = CursorFormatter::new(stream, "-", OutputFormat::Csv);
//! formatter.output(&OutputOptions { fields: vec!["_id".into()], ..Default::default() }).await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod mongo;
pub mod utils;

pub use config::Settings;
pub use error::{Error, Result};
pub use mongo::aggregation::{Pipeline, RunTiming, ShellStyle};
pub use mongo::cursor_engine::{AggregateTarget, CommandTarget, DocumentStream};
pub use mongo::sort::{SortDirection, SortSpec};
pub use mongo::stage::{cond, if_null, Stage};
pub use utils::export::{project_fields, CursorFormatter, Destination, OutputFormat, OutputOptions};
pub use utils::dates::normalize_dates;
