use std::fmt;

use mongodb::bson::{doc, Bson, Document};

use crate::error::{Error, Result};
use crate::mongo::sort::SortSpec;
use crate::utils::json::whole_number;

/// `$sample` size used when none is given.
pub const DEFAULT_SAMPLE_SIZE: i64 = 100;

/// One aggregation stage. Renders as a single-key document such as
/// `{"$limit": 5}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Limit(i64),
    Sample(i64),
    Match(Document),
    Project(Document),
    Group(Document),
    Unwind(Bson),
    Sort(SortSpec),
    /// Terminal: no stage may follow it.
    Out(Bson),
}

impl Stage {
    pub fn operator(&self) -> &'static str {
        match self {
            Stage::Limit(_) => "$limit",
            Stage::Sample(_) => "$sample",
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Group(_) => "$group",
            Stage::Unwind(_) => "$unwind",
            Stage::Sort(_) => "$sort",
            Stage::Out(_) => "$out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Out(_))
    }

    /// Argument of the stage, as sent to the server.
    pub fn argument(&self) -> Bson {
        match self {
            Stage::Limit(n) => Bson::Int64(*n),
            Stage::Sample(size) => {
                let size = *size;
                Bson::Document(doc! { "size": size })
            }
            Stage::Match(d) | Stage::Project(d) | Stage::Group(d) => Bson::Document(d.clone()),
            Stage::Unwind(v) | Stage::Out(v) => v.clone(),
            Stage::Sort(spec) => Bson::Document(spec.to_document()),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut stage = Document::new();
        stage.insert(self.operator(), self.argument());
        stage
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operator(), self.argument())
    }
}

impl From<Stage> for Document {
    fn from(stage: Stage) -> Self {
        stage.to_document()
    }
}

impl TryFrom<Document> for Stage {
    type Error = Error;

    /// Parse a stage document such as `{"$match": {...}}`.
    fn try_from(doc: Document) -> Result<Self> {
        let rendered = doc.to_string();
        let mut entries = doc.into_iter();
        let (operator, argument) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(Error::TypeMismatch {
                    context: "a pipeline stage".into(),
                    found: "a document without exactly one operator".into(),
                    value: rendered,
                })
            }
        };

        match operator.as_str() {
            "$limit" => Ok(Stage::Limit(integer_argument("$limit", &argument)?)),
            "$sample" => {
                let spec = expect_document("$sample", argument)?;
                let size = match spec.get("size") {
                    Some(size) => integer_argument("$sample size", size)?,
                    None => DEFAULT_SAMPLE_SIZE,
                };
                Ok(Stage::Sample(size))
            }
            "$match" => Ok(Stage::Match(expect_document("$match predicate", argument)?)),
            "$project" => Ok(Stage::Project(expect_document("$project spec", argument)?)),
            "$group" => Ok(Stage::Group(expect_document("$group spec", argument)?)),
            "$unwind" => Ok(Stage::Unwind(argument)),
            "$sort" => {
                let spec = expect_document("$sort spec", argument)?;
                Ok(Stage::Sort(SortSpec::try_from(&spec)?))
            }
            "$out" => match argument {
                Bson::String(_) | Bson::Document(_) => Ok(Stage::Out(argument)),
                other => Err(Error::type_mismatch("$out target", &other)),
            },
            other => Err(Error::UnknownStage(other.to_string())),
        }
    }
}

/// Require `value` to be a document.
pub(crate) fn expect_document(context: &str, value: Bson) -> Result<Document> {
    match value {
        Bson::Document(doc) => Ok(doc),
        other => Err(Error::type_mismatch(context, &other)),
    }
}

fn integer_argument(context: &str, value: &Bson) -> Result<i64> {
    match value {
        Bson::Int32(n) => Ok(i64::from(*n)),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(f) => whole_number(*f).ok_or_else(|| Error::type_mismatch(context, value)),
        other => Err(Error::type_mismatch(context, other)),
    }
}

/// `{"$cond": {"if": .., "then": .., "else": ..}}`
pub fn cond(if_expr: impl Into<Bson>, then: impl Into<Bson>, otherwise: impl Into<Bson>) -> Document {
    let (if_expr, then, otherwise): (Bson, Bson, Bson) = (if_expr.into(), then.into(), otherwise.into());
    doc! {
        "$cond": {
            "if": if_expr,
            "then": then,
            "else": otherwise,
        }
    }
}

/// `{"$ifNull": [expr, fallback]}`
pub fn if_null(expr: impl Into<Bson>, fallback: impl Into<Bson>) -> Document {
    let (expr, fallback): (Bson, Bson) = (expr.into(), fallback.into());
    doc! { "$ifNull": [expr, fallback] }
}
