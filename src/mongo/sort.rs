//! Ordered `$sort` specifications.
//!
//! Field order matters to the server, so pairs are kept in a `Vec` in the
//! order they were added.

use std::fmt;
use std::str::FromStr;

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::json::whole_number;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Server representation: 1 or -1.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(SortDirection::Ascending),
            -1 => Ok(SortDirection::Descending),
            other => Err(Error::InvalidSortDirection(other.to_string())),
        }
    }
}

impl TryFrom<&Bson> for SortDirection {
    type Error = Error;

    fn try_from(value: &Bson) -> Result<Self> {
        match value {
            Bson::Int32(n) => SortDirection::try_from(i64::from(*n)),
            Bson::Int64(n) => SortDirection::try_from(*n),
            Bson::Double(f) => whole_number(*f)
                .ok_or_else(|| Error::InvalidSortDirection(f.to_string()))
                .and_then(SortDirection::try_from),
            Bson::String(s) => s.parse(),
            other => Err(Error::InvalidSortDirection(other.to_string())),
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "asc" | "ascending" => Ok(SortDirection::Ascending),
            "-1" | "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(Error::InvalidSortDirection(s.to_string())),
        }
    }
}

impl From<SortDirection> for Bson {
    fn from(direction: SortDirection) -> Self {
        Bson::Int32(direction.as_i32())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    fields: Vec<(String, SortDirection)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from field/direction pairs, validating every direction.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        let mut spec = Self::new();
        for (field, direction) in pairs {
            spec.add_sort_value(field, direction)?;
        }
        Ok(spec)
    }

    /// Add or replace the direction for `field`. A replaced field keeps its
    /// original position.
    pub fn add_sort(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = direction,
            None => self.fields.push((field, direction)),
        }
        self
    }

    /// Like [`SortSpec::add_sort`], for directions given as raw values
    /// (`1`, `-1`, `"asc"`, `"descending"`, ...).
    pub fn add_sort_value(
        &mut self,
        field: impl Into<String>,
        direction: impl Into<Bson>,
    ) -> Result<&mut Self> {
        let direction = SortDirection::try_from(&direction.into())?;
        Ok(self.add_sort(field, direction))
    }

    pub fn sort_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(field, _)| field.as_str())
    }

    pub fn sort_items(&self) -> impl Iterator<Item = (&str, SortDirection)> + '_ {
        self.fields.iter().map(|(field, dir)| (field.as_str(), *dir))
    }

    pub fn sort_directions(&self) -> impl Iterator<Item = SortDirection> + '_ {
        self.fields.iter().map(|(_, dir)| *dir)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `{field: 1|-1, ...}` argument of a `$sort` stage.
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, dir)| (field.clone(), Bson::from(*dir)))
            .collect()
    }

    /// A complete `{"$sort": {...}}` stage.
    pub fn to_stage(&self) -> Document {
        doc! { "$sort": self.to_document() }
    }
}

impl TryFrom<&Document> for SortSpec {
    type Error = Error;

    fn try_from(doc: &Document) -> Result<Self> {
        SortSpec::from_pairs(doc.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_stage())
    }
}
