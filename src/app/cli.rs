use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::mongo::aggregation::ShellStyle;
use crate::utils::export::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mongo-agg")]
#[command(about = "Run, render and save MongoDB aggregation pipelines", long_about = None)]
pub struct Cli {
    /// MongoDB connection string (default: $MONGODB_URI)
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Database name (default: $MONGO_AGG_DATABASE)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Collection the pipeline runs against
    #[arg(short, long)]
    pub collection: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline and write its results
    Run {
        /// JSON file holding an array of stage documents
        #[arg(short, long)]
        pipeline: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Output file, or "-" for stdout
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Comma-separated dotted paths to keep
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Comma-separated dotted paths to format as dates
        #[arg(long, value_delimiter = ',')]
        dates: Vec<String>,

        /// strftime pattern for date fields (default: $MONGO_AGG_TIME_FORMAT)
        #[arg(long)]
        time_format: Option<String>,
    },

    /// Print the equivalent shell command
    Show {
        #[arg(short, long)]
        pipeline: PathBuf,

        #[arg(long, value_enum, default_value_t = ShellStyle::Json)]
        style: ShellStyle,
    },

    /// Create a view backed by the pipeline
    CreateView {
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Name of the view to create
        #[arg(long)]
        name: String,

        /// Collation document as JSON
        #[arg(long)]
        collation: Option<String>,
    },
}
