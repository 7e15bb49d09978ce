//! Result formatting: CSV or pretty JSON lines, to a file or stdout.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::ValueEnum;
use futures::{Stream, TryStreamExt};
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mongo::cursor_engine::{first_batch, stream_from_documents, DocumentStream};
use crate::utils::dates::{iso_string, normalize_dates};
use crate::utils::json::bson_to_json;
use crate::utils::nested::{flatten_paths, get_path, insert_path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    /// One pretty-printed JSON document per record.
    #[default]
    Json,
}

/// Where output goes. `-` (or an empty name) means standard output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Destination {
    #[default]
    Stdout,
    File(PathBuf),
}

impl Destination {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "" | "-" => Destination::Stdout,
            path => Destination::File(PathBuf::from(path)),
        }
    }

    /// Open for writing, truncating an existing file.
    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            Destination::Stdout => Ok(Box::new(io::stdout())),
            Destination::File(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        }
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Destination::parse(name)
    }
}

impl From<PathBuf> for Destination {
    fn from(path: PathBuf) -> Self {
        Destination::File(path)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("-"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Per-record shaping applied before writing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// Dotted paths to keep. Empty keeps everything.
    pub fields: Vec<String>,
    /// Dotted paths holding dates or epoch milliseconds.
    pub date_fields: Vec<String>,
    pub time_format: Option<String>,
}

/// New document holding only the listed paths that exist in `doc`. An empty
/// list returns `doc` unchanged.
pub fn project_fields<S: AsRef<str>>(doc: &Document, fields: &[S]) -> Document {
    if fields.is_empty() {
        return doc.clone();
    }

    let mut projected = Document::new();
    for field in fields {
        let field = field.as_ref();
        if let Some(value) = get_path(doc, field) {
            insert_path(&mut projected, field, value.clone());
        }
    }
    projected
}

/// Writes a result stream in the bound format, keeping every record it reads.
pub struct CursorFormatter {
    stream: Option<DocumentStream>,
    format: OutputFormat,
    destination: Destination,
    results: Vec<Document>,
}

impl CursorFormatter {
    pub fn new(
        stream: DocumentStream,
        destination: impl Into<Destination>,
        format: OutputFormat,
    ) -> Self {
        Self {
            stream: Some(stream),
            format,
            destination: destination.into(),
            results: Vec::new(),
        }
    }

    /// Bind to a raw command reply (`{cursor: {firstBatch: [...]}}`).
    pub fn from_command_reply(
        reply: &Bson,
        destination: impl Into<Destination>,
        format: OutputFormat,
    ) -> Result<Self> {
        let documents = first_batch(reply)?;
        Ok(Self::new(stream_from_documents(documents), destination, format))
    }

    /// Start the accumulator from previously collected records.
    pub fn with_results(mut self, results: Vec<Document>) -> Self {
        self.results = results;
        self
    }

    /// Every record read so far, exactly as it came from the stream.
    pub fn results(&self) -> &[Document] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Document> {
        self.results
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Write the bound stream in the bound format. The stream can only be
    /// written once.
    pub async fn output(&mut self, options: &OutputOptions) -> Result<usize> {
        let stream = self.stream.take().ok_or(Error::StreamConsumed)?;
        let count = match self.format {
            OutputFormat::Csv => self.write_csv(stream, options).await?,
            OutputFormat::Json => self.write_json_lines(stream, options).await?,
        };
        info!(count, destination = %self.destination, format = ?self.format, "wrote records");
        Ok(count)
    }

    /// CSV with a header row. Without `options.fields` the header is taken
    /// from the leaf paths of the first record, so an empty stream writes
    /// an empty file. A record with a leaf path the header does not cover
    /// fails with [`Error::UnexpectedField`].
    pub async fn write_csv<S>(&mut self, mut stream: S, options: &OutputOptions) -> Result<usize>
    where
        S: Stream<Item = mongodb::error::Result<Document>> + Unpin,
    {
        let mut writer = csv::Writer::from_writer(self.destination.open()?);
        let mut header: Option<Vec<String>> = None;
        if !options.fields.is_empty() {
            writer.write_record(&options.fields)?;
            header = Some(options.fields.clone());
        }

        let mut count = 0;
        while let Some(doc) = stream.try_next().await? {
            let record = self.accept(doc, options)?;

            if header.is_none() {
                let derived = flatten_paths(&record);
                debug!(columns = ?derived, "derived CSV header from first record");
                writer.write_record(&derived)?;
                header = Some(derived);
            }
            let columns = header.as_deref().unwrap_or_default();

            if let Some(path) = flatten_paths(&record)
                .into_iter()
                .find(|path| !columns.iter().any(|column| path_covers(column, path)))
            {
                return Err(Error::UnexpectedField(path));
            }

            let row: Vec<String> = columns
                .iter()
                .map(|column| get_path(&record, column).map(cell_text).unwrap_or_default())
                .collect();
            writer.write_record(&row)?;
            count += 1;
        }

        writer.flush()?;
        Ok(count)
    }

    /// Each record as pretty-printed JSON followed by a newline.
    pub async fn write_json_lines<S>(
        &mut self,
        mut stream: S,
        options: &OutputOptions,
    ) -> Result<usize>
    where
        S: Stream<Item = mongodb::error::Result<Document>> + Unpin,
    {
        let mut out = self.destination.open()?;

        let mut count = 0;
        while let Some(doc) = stream.try_next().await? {
            let record = self.accept(doc, options)?;
            serde_json::to_writer_pretty(&mut out, &bson_to_json(record))?;
            writeln!(out)?;
            count += 1;
        }

        out.flush()?;
        Ok(count)
    }

    /// Keep the raw record, then project and normalize a copy of it.
    fn accept(&mut self, doc: Document, options: &OutputOptions) -> Result<Document> {
        let mut record = project_fields(&doc, &options.fields);
        self.results.push(doc);
        normalize_dates(
            &mut record,
            &options.date_fields,
            options.time_format.as_deref(),
        )?;
        Ok(record)
    }
}

/// True when one dotted path is the other or lies beneath it.
fn path_covers(column: &str, path: &str) -> bool {
    fn within(outer: &str, inner: &str) -> bool {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
    within(column, path) || within(path, column)
}

/// Text of a single CSV cell.
fn cell_text(value: &Bson) -> String {
    match value {
        Bson::Null | Bson::Undefined => String::new(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::String(s) => s.clone(),
        Bson::DateTime(dt) => iso_string(dt.timestamp_millis()),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Array(items) => {
            let items: Vec<String> = items.iter().map(cell_text).collect();
            format!("[{}]", items.join(";"))
        }
        Bson::Document(doc) => bson_to_json(doc.clone()).to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime};
    use std::fs;
    use tempfile::tempdir;

    fn options(fields: &[&str], dates: &[&str]) -> OutputOptions {
        OutputOptions {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            date_fields: dates.iter().map(|s| s.to_string()).collect(),
            time_format: None,
        }
    }

    #[test]
    fn test_project_nested_field() {
        let d = doc! { "a": { "b": 1, "c": 2 } };
        assert_eq!(project_fields(&d, &["a.b"]), doc! { "a": { "b": 1 } });
    }

    #[test]
    fn test_project_skips_missing_and_keeps_all_when_empty() {
        let d = doc! { "a": 1, "b": { "c": 2 } };
        assert_eq!(project_fields(&d, &["a", "b.x", "zz"]), doc! { "a": 1 });
        assert_eq!(project_fields::<&str>(&d, &[]), d);
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("-"), Destination::Stdout);
        assert_eq!(Destination::parse(""), Destination::Stdout);
        assert_eq!(
            Destination::parse("out.csv"),
            Destination::File(PathBuf::from("out.csv"))
        );
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Bson::Null), "");
        assert_eq!(cell_text(&Bson::Array(vec![1.into(), "x".into()])), "[1;x]");
        assert_eq!(cell_text(&Bson::Document(doc! { "k": "v" })), r#"{"k":"v"}"#);
    }

    #[tokio::test]
    async fn test_csv_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! { "a": 1, "b": 2 }, doc! { "a": 3, "b": 4 }];

        let mut formatter = CursorFormatter::new(
            stream_from_documents(records.clone()),
            path.clone(),
            OutputFormat::Csv,
        );
        let count = formatter.output(&options(&["a"], &[])).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n1\n3\n");
        // accumulator keeps the unprojected records
        assert_eq!(formatter.results(), records.as_slice());
    }

    #[tokio::test]
    async fn test_csv_nested_fields_and_dates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! {
            "user": { "name": "Ann, B", "id": 7 },
            "at": DateTime::from_millis(1_500_000_000_000),
        }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path.clone(), OutputFormat::Csv);
        formatter
            .output(&options(&["user.name", "at"], &["at"]))
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "user.name,at\n\"Ann, B\",14-Jul-2017 02:40\n"
        );
    }

    #[tokio::test]
    async fn test_csv_header_from_first_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! { "a": 1, "b": { "c": 2 } }, doc! { "a": 3 }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path.clone(), OutputFormat::Csv);
        formatter.output(&OutputOptions::default()).await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b.c\n1,2\n3,\n");
    }

    #[tokio::test]
    async fn test_csv_rejects_fields_outside_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! { "a": 1 }, doc! { "a": 2, "extra": true }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path, OutputFormat::Csv);
        let err = formatter.output(&OutputOptions::default()).await.unwrap_err();

        assert!(matches!(err, Error::UnexpectedField(ref f) if f == "extra"));
        assert_eq!(formatter.results().len(), 2);
    }

    #[tokio::test]
    async fn test_json_lines_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![
            doc! { "n": 1, "t": 0_i64, "skip": "x" },
            doc! { "n": 2, "t": 60_000_i64, "skip": "y" },
        ];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path.clone(), OutputFormat::Json);
        let opts = OutputOptions {
            fields: vec!["n".into(), "t".into()],
            date_fields: vec!["t".into()],
            time_format: Some("%H:%M".into()),
        };
        let count = formatter.output(&opts).await.unwrap();

        assert_eq!(count, 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\n  \"n\": 1,\n  \"t\": \"00:00\"\n}\n{\n  \"n\": 2,\n  \"t\": \"00:01\"\n}\n"
        );
    }

    #[tokio::test]
    async fn test_bad_date_aborts_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![doc! { "t": 0_i64 }, doc! { "t": "soon" }, doc! { "t": 1_i64 }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path, OutputFormat::Json);
        let err = formatter
            .output(&options(&[], &["t"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidDateField { .. }));
        assert_eq!(formatter.results().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_is_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut formatter = CursorFormatter::new(
            stream_from_documents(vec![doc! { "a": 1 }]),
            path,
            OutputFormat::Json,
        );
        formatter.output(&OutputOptions::default()).await.unwrap();
        assert!(matches!(
            formatter.output(&OutputOptions::default()).await,
            Err(Error::StreamConsumed)
        ));
    }

    #[test]
    fn test_from_command_reply_requires_cursor_reply() {
        let err = CursorFormatter::from_command_reply(
            &Bson::Document(doc! { "ok": 1.0 }),
            "-",
            OutputFormat::Json,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let reply = Bson::Document(doc! { "cursor": { "firstBatch": [ { "a": 1 } ] } });
        let formatter = CursorFormatter::from_command_reply(&reply, "-", OutputFormat::Csv)
            .ok()
            .unwrap();
        assert_eq!(formatter.format(), OutputFormat::Csv);
        assert_eq!(formatter.destination(), &Destination::Stdout);
    }

    #[tokio::test]
    async fn test_preloaded_results_are_extended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut formatter = CursorFormatter::new(
            stream_from_documents(vec![doc! { "a": 2 }]),
            path,
            OutputFormat::Json,
        )
        .with_results(vec![doc! { "a": 1 }]);
        formatter.output(&OutputOptions::default()).await.unwrap();
        assert_eq!(formatter.into_results(), vec![doc! { "a": 1 }, doc! { "a": 2 }]);
    }

    #[tokio::test]
    async fn test_csv_rejects_nested_field_outside_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! { "a": { "b": 1 } }, doc! { "a": { "b": 2, "c": 3 } }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path, OutputFormat::Csv);
        let err = formatter.output(&OutputOptions::default()).await.unwrap_err();

        assert!(matches!(err, Error::UnexpectedField(ref f) if f == "a.c"));
    }

    #[tokio::test]
    async fn test_csv_parent_column_covers_nested_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![doc! { "a": { "b": 1, "c": 2 } }];

        let mut formatter =
            CursorFormatter::new(stream_from_documents(records), path.clone(), OutputFormat::Csv);
        formatter.output(&options(&["a"], &[])).await.unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a\n\"{\"\"b\"\":1,\"\"c\"\":2}\"\n"
        );
    }

    #[test]
    fn test_path_covers() {
        assert!(path_covers("a.b", "a.b"));
        assert!(path_covers("a", "a.b"));
        assert!(path_covers("a.b", "a"));
        assert!(!path_covers("a.b", "a.c"));
        assert!(!path_covers("ab", "a"));
    }

    #[tokio::test]
    async fn test_existing_file_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale header\nstale row one\nstale row two\n").unwrap();

        let mut formatter = CursorFormatter::new(
            stream_from_documents(vec![doc! { "a": 1 }]),
            path.clone(),
            OutputFormat::Csv,
        );
        formatter.output(&OutputOptions::default()).await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n1\n");
    }

    #[tokio::test]
    async fn test_csv_empty_stream_without_fields_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut formatter =
            CursorFormatter::new(stream_from_documents(Vec::new()), path.clone(), OutputFormat::Csv);
        let count = formatter.output(&OutputOptions::default()).await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
