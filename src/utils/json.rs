use mongodb::bson::{Bson, Document};
use serde_json::{Map, Number, Value};

use crate::error::{bson_type_name, Error, Result};
use crate::utils::dates::iso_string;

/// Convert BSON Document → JSON Value (relaxed extended JSON)
pub fn bson_to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

/// Convert JSON Value → BSON Document
pub fn json_to_bson(value: Value) -> Result<Document> {
    let bson = Bson::try_from(value).map_err(|e| Error::TypeMismatch {
        context: "extended JSON input".into(),
        found: "invalid extended JSON".into(),
        value: e.to_string(),
    })?;
    match bson {
        Bson::Document(doc) => Ok(doc),
        other => Err(Error::type_mismatch("JSON input", &other)),
    }
}

/// Convert a JSON array of objects → list of BSON Documents
pub fn json_array_to_documents(value: Value) -> Result<Vec<Document>> {
    match value {
        Value::Array(items) => items.into_iter().map(json_to_bson).collect(),
        other => json_to_bson(other).map(|doc| vec![doc]),
    }
}

/// A double with no fractional part that fits in an `i64`.
pub(crate) fn whole_number(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

/// Plain JSON for shell text. Dates become `"ISODate( ... )"` strings; any
/// type without a JSON form is rejected.
pub fn to_shell_json(value: &Bson) -> Result<Value> {
    let json = match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| Error::Unserializable(format!("Double({})", f)))?,
        Bson::String(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => {
            Value::String(format!("ISODate( {} )", iso_string(dt.timestamp_millis())))
        }
        Bson::Array(items) => Value::Array(
            items
                .iter()
                .map(to_shell_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Bson::Document(doc) => {
            let mut map = Map::new();
            for (key, item) in doc {
                map.insert(key.clone(), to_shell_json(item)?);
            }
            Value::Object(map)
        }
        other => return Err(Error::Unserializable(bson_type_name(other))),
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, DateTime};
    use serde_json::json;

    #[test]
    fn test_whole_number() {
        assert_eq!(whole_number(5.0), Some(5));
        assert_eq!(whole_number(-1.0), Some(-1));
        assert_eq!(whole_number(2.5), None);
        assert_eq!(whole_number(1e30), None);
        assert_eq!(whole_number(f64::NAN), None);
        assert_eq!(whole_number(f64::INFINITY), None);
    }

    #[test]
    fn test_shell_json_renders_dates_as_isodate() {
        let value = Bson::Document(doc! { "at": { "$gte": DateTime::from_millis(0) } });
        let json = to_shell_json(&value).unwrap();
        assert_eq!(
            json,
            json!({ "at": { "$gte": "ISODate( 1970-01-01T00:00:00.000Z )" } })
        );
    }

    #[test]
    fn test_shell_json_rejects_object_id() {
        let value = Bson::Document(doc! { "_id": ObjectId::new() });
        let err = to_shell_json(&value).unwrap_err();
        assert!(matches!(err, Error::Unserializable(ref t) if t == "ObjectId"));
    }

    #[test]
    fn test_json_to_bson_reads_extended_json() {
        let doc = json_to_bson(json!({ "n": { "$numberLong": "5" }, "s": "x" })).unwrap();
        assert_eq!(doc, doc! { "n": 5_i64, "s": "x" });
    }

    #[test]
    fn test_json_to_bson_rejects_scalars() {
        assert!(matches!(
            json_to_bson(json!(3)),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
