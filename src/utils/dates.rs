use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use mongodb::bson::{Bson, Document};

use crate::error::{bson_type_name, Error, Result};
use crate::utils::json::whole_number;
use crate::utils::nested::{get_path, insert_path};

/// Default output pattern, e.g. `14-Jul-2017 02:40`.
pub const DEFAULT_TIME_FORMAT: &str = "%d-%b-%Y %H:%M";

/// UTC timestamp for epoch milliseconds, `None` when out of range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// RFC 3339 text for epoch milliseconds, falling back to the raw number when
/// the value is out of range.
pub fn iso_string(millis: i64) -> String {
    match from_epoch_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => millis.to_string(),
    }
}

/// Format `dt` with a strftime-style pattern. An unusable pattern is an
/// error instead of a panic.
pub fn format_datetime(dt: &DateTime<Utc>, time_format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(time_format))
        .map_err(|_| Error::InvalidTimeFormat(time_format.to_string()))?;
    Ok(out)
}

/// Rewrite each listed date field that is present in `doc` as a formatted
/// string. Date values are formatted directly; integers and whole doubles
/// are read as epoch milliseconds first. Any other value is an error.
pub fn normalize_dates<S: AsRef<str>>(
    doc: &mut Document,
    date_fields: &[S],
    time_format: Option<&str>,
) -> Result<()> {
    let time_format = time_format.unwrap_or(DEFAULT_TIME_FORMAT);

    for field in date_fields {
        let field = field.as_ref();
        let Some(value) = get_path(doc, field) else {
            continue;
        };

        let millis = match value {
            Bson::DateTime(dt) => dt.timestamp_millis(),
            Bson::Int64(n) => *n,
            Bson::Int32(n) => i64::from(*n),
            Bson::Double(f) if whole_number(*f).is_some() => *f as i64,
            other => {
                return Err(Error::InvalidDateField {
                    field: field.to_string(),
                    found: bson_type_name(other),
                })
            }
        };

        let dt = from_epoch_millis(millis).ok_or_else(|| Error::InvalidDateField {
            field: field.to_string(),
            found: format!("out-of-range timestamp {}", millis),
        })?;
        let formatted = format_datetime(&dt, time_format)?;
        insert_path(doc, field, formatted);
    }

    Ok(())
}
