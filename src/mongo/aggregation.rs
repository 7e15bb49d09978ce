//! Aggregation pipeline builder.
//!
//! A [`Pipeline`] owns its target collection and an ordered list of
//! [`Stage`]s. Stages are appended with the `add_*` methods, which chain
//! through `?`:
//!
//! ```rust,ignore
//! let mut pipeline = Pipeline::new(collection);
//! pipeline
//!     .add_match(doc! { "status": "A" })?
//!     .add_limit(Some(5))?
//!     .add_out(Some("results"))?;
//! let stream = pipeline.execute().await?;
//! ```
//!
//! Once a `$out` stage has been added the pipeline is terminated and every
//! further append fails.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use mongodb::bson::{doc, Bson, Document};
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mongo::cursor_engine::{AggregateTarget, CommandTarget, DocumentStream};
use crate::mongo::sort::SortSpec;
use crate::mongo::stage::{expect_document, Stage, DEFAULT_SAMPLE_SIZE};
use crate::utils::json::to_shell_json;

/// How [`Pipeline::render`] writes stage documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShellStyle {
    /// One compact JSON object per stage, dates as `ISODate( .. )`.
    #[default]
    Json,
    /// BSON's own display form.
    Literal,
}

/// Wall-clock bounds of the last [`Pipeline::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

impl RunTiming {
    pub fn elapsed(&self) -> Duration {
        self.finished - self.started
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline<C = Collection<Document>> {
    target: C,
    stages: Vec<Stage>,
    style: ShellStyle,
    last_run: Option<RunTiming>,
}

impl<C> Pipeline<C> {
    pub fn new(target: C) -> Self {
        Self {
            target,
            stages: Vec::new(),
            style: ShellStyle::default(),
            last_run: None,
        }
    }

    /// Style used by the `Display` impl.
    pub fn with_style(mut self, style: ShellStyle) -> Self {
        self.style = style;
        self
    }

    pub fn target(&self) -> &C {
        &self.target
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The stage documents, in order, as sent to the server.
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// True once a `$out` stage has been added.
    pub fn is_terminated(&self) -> bool {
        self.stages.last().is_some_and(Stage::is_terminal)
    }

    pub fn last_run(&self) -> Option<RunTiming> {
        self.last_run
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.last_run.map(|run| run.elapsed())
    }

    /// Append any stage, enforcing the `$out` rule.
    pub fn push_stage(&mut self, stage: Stage) -> Result<&mut Self> {
        if let Some(last) = self.stages.last().filter(|s| s.is_terminal()) {
            return Err(if stage.is_terminal() {
                Error::DuplicateTerminalStage {
                    existing: last.to_string(),
                }
            } else {
                Error::PipelineTerminated {
                    stage: stage.to_string(),
                }
            });
        }

        debug!(stage = %stage, "adding pipeline stage");
        self.stages.push(stage);
        Ok(self)
    }

    fn ensure_open(&self, operator: &str, argument: &Bson) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::PipelineTerminated {
                stage: format!("{}: {}", operator, argument),
            });
        }
        Ok(())
    }

    /// No-op when `size` is `None`.
    pub fn add_limit(&mut self, size: Option<i64>) -> Result<&mut Self> {
        match size {
            Some(size) => self.push_stage(Stage::Limit(size)),
            None => Ok(self),
        }
    }

    pub fn add_sample(&mut self, size: Option<i64>) -> Result<&mut Self> {
        self.push_stage(Stage::Sample(size.unwrap_or(DEFAULT_SAMPLE_SIZE)))
    }

    pub fn add_match(&mut self, predicate: impl Into<Bson>) -> Result<&mut Self> {
        let predicate = predicate.into();
        self.ensure_open("$match", &predicate)?;
        let predicate = expect_document("$match predicate", predicate)?;
        self.push_stage(Stage::Match(predicate))
    }

    pub fn add_project(&mut self, projection: impl Into<Bson>) -> Result<&mut Self> {
        let projection = projection.into();
        self.ensure_open("$project", &projection)?;
        let projection = expect_document("$project spec", projection)?;
        self.push_stage(Stage::Project(projection))
    }

    pub fn add_group(&mut self, grouping: impl Into<Bson>) -> Result<&mut Self> {
        let grouping = grouping.into();
        self.ensure_open("$group", &grouping)?;
        let grouping = expect_document("$group spec", grouping)?;
        self.push_stage(Stage::Group(grouping))
    }

    pub fn add_unwind(&mut self, unwind: impl Into<Bson>) -> Result<&mut Self> {
        self.push_stage(Stage::Unwind(unwind.into()))
    }

    pub fn add_sort(&mut self, sort: &SortSpec) -> Result<&mut Self> {
        self.push_stage(Stage::Sort(sort.clone()))
    }

    /// Append a `$sort` from a raw `{field: 1|-1}` document.
    pub fn add_sort_document(&mut self, sort: impl Into<Bson>) -> Result<&mut Self> {
        let sort = sort.into();
        self.ensure_open("$sort", &sort)?;
        let sort = expect_document("$sort spec", sort)?;
        let spec = SortSpec::try_from(&sort)?;
        self.push_stage(Stage::Sort(spec))
    }

    /// Append `{"$match": {field: {"$gte": start, "$lte": end}}}` using the
    /// bounds that are present. No-op when both are `None`.
    pub fn add_range_match(
        &mut self,
        field: &str,
        start: Option<Bson>,
        end: Option<Bson>,
    ) -> Result<&mut Self> {
        let mut range = Document::new();
        if let Some(start) = start {
            range.insert("$gte", start);
        }
        if let Some(end) = end {
            range.insert("$lte", end);
        }
        if range.is_empty() {
            return Ok(self);
        }

        let mut predicate = Document::new();
        predicate.insert(field, range);
        self.add_match(predicate)
    }

    /// Append the terminal `$out` stage. No-op when `target` is `None`.
    pub fn add_out(&mut self, target: Option<&str>) -> Result<&mut Self> {
        match target {
            Some(target) => self.push_stage(Stage::Out(Bson::String(target.to_string()))),
            None => Ok(self),
        }
    }

    /// Empty, non-terminated, no timing.
    pub fn clear(&mut self) -> &mut Self {
        self.stages.clear();
        self.last_run = None;
        self
    }
}

impl<C: AggregateTarget> Pipeline<C> {
    /// Run the pipeline against the target and return the result stream.
    pub async fn execute(&mut self) -> Result<DocumentStream> {
        let collection = self.target.collection_name().to_string();
        let pipeline = self.to_documents();
        debug!(%collection, stages = pipeline.len(), "running aggregation");

        let started = Utc::now();
        let stream = self.target.run_pipeline(pipeline).await?;
        let finished = Utc::now();

        let timing = RunTiming { started, finished };
        info!(
            %collection,
            elapsed_ms = timing.elapsed().num_milliseconds(),
            "aggregation cursor opened"
        );
        self.last_run = Some(timing);

        Ok(stream)
    }

    /// Run the pipeline and copy every yielded record into `sink`.
    pub async fn tee<'s>(
        &mut self,
        sink: &'s mut Vec<Document>,
    ) -> Result<BoxStream<'s, Result<Document>>> {
        let stream = self.execute().await?;
        Ok(stream
            .map_err(Error::from)
            .inspect_ok(move |doc| sink.push(doc.clone()))
            .boxed())
    }

    /// Create a server-side view named `view_name` backed by this pipeline.
    /// Returns the command reply unchanged.
    pub async fn define_view<D>(
        &self,
        database: &D,
        view_name: &str,
        collation: Option<Document>,
    ) -> Result<Document>
    where
        D: CommandTarget + ?Sized,
    {
        let view_on = self.target.collection_name();
        let pipeline = self.to_documents();
        let mut command = doc! {
            "create": view_name,
            "viewOn": view_on,
            "pipeline": pipeline,
        };
        if let Some(collation) = collation {
            command.insert("collation", collation);
        }

        info!(view = view_name, view_on, "creating view");
        Ok(database.command(command).await?)
    }

    /// Shell text equivalent to this pipeline, for debugging.
    pub fn render(&self, style: ShellStyle) -> Result<String> {
        let (open, entries) = match style {
            ShellStyle::Json => {
                let entries = self
                    .stages
                    .iter()
                    .map(|stage| -> Result<String> {
                        let json = to_shell_json(&Bson::Document(stage.to_document()))?;
                        Ok(serde_json::to_string(&json)?)
                    })
                    .collect::<Result<Vec<String>>>()?;
                ("aggregate([\n", entries)
            }
            ShellStyle::Literal => {
                let entries: Vec<String> = self
                    .stages
                    .iter()
                    .map(|stage| stage.to_document().to_string())
                    .collect();
                ("aggregate( [\n", entries)
            }
        };

        Ok(format!(
            "db.{}.{}{}])\n",
            self.target.collection_name(),
            open,
            entries.join(",\n")
        ))
    }
}

impl<C: AggregateTarget> fmt::Display for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Literal rendering cannot fail.
        let text = self
            .render(self.style)
            .or_else(|_| self.render(ShellStyle::Literal))
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}
