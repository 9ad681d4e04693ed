//! CSV rendering of a batch of records.

use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::model::Record;
use crate::Error;

/// Union of the keys of all records, in the order they were first seen.
pub fn columns(records: &[Record]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for key in records.iter().flat_map(|record| record.keys()) {
        if seen.insert(key.as_str()) {
            columns.push(key.as_str());
        }
    }

    columns
}

/// Header row plus one row per record, in buffer order. Missing fields and
/// nulls become empty cells; nested objects and arrays are rejected.
pub fn encode_csv(records: &[Record]) -> Result<Vec<u8>, Error> {
    let columns = columns(records);
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&columns)?;

    for (idx, record) in records.iter().enumerate() {
        let row = columns
            .iter()
            .map(|column| render_cell(record.get(*column), column, idx))
            .collect::<Result<Vec<_>, _>>()?;

        writer.write_record(row.iter().map(|cell| cell.as_bytes()))?;
    }

    writer
        .into_inner()
        .map_err(|err| Error::Serialization(err.to_string()))
}

fn render_cell<'a>(
    value: Option<&'a JsonValue>,
    column: &str,
    idx: usize,
) -> Result<Cow<'a, str>, Error> {
    match value {
        None | Some(JsonValue::Null) => Ok(Cow::Borrowed("")),
        Some(JsonValue::String(x)) => Ok(Cow::Borrowed(x)),
        Some(JsonValue::Number(x)) => Ok(Cow::Owned(x.to_string())),
        Some(JsonValue::Bool(x)) => Ok(Cow::Owned(x.to_string())),
        Some(JsonValue::Array(_) | JsonValue::Object(_)) => Err(Error::Serialization(format!(
            "field `{column}` of record {idx} is not a scalar value"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn records(values: JsonValue) -> Vec<Record> {
        serde_json::from_value(values).unwrap()
    }

    fn encode_str(records: &[Record]) -> String {
        String::from_utf8(encode_csv(records).unwrap()).unwrap()
    }

    #[test]
    fn header_follows_first_seen_key_order() {
        let batch = records(json!([
            {"id": 1, "name": "ada"},
            {"email": "x@y.z", "id": 2},
        ]));

        assert_eq!(columns(&batch), vec!["id", "name", "email"]);
        assert_eq!(
            encode_str(&batch),
            "id,name,email\n1,ada,\n2,,x@y.z\n"
        );
    }

    #[test]
    fn scalars_are_rendered_as_text() {
        let batch = records(json!([
            {"s": "a,b", "f": 1.5, "b": true, "n": null, "q": "say \"hi\""},
        ]));

        assert_eq!(
            encode_str(&batch),
            "s,f,b,n,q\n\"a,b\",1.5,true,,\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        let batch = records(json!([
            {"id": 1},
            {"id": 2, "tags": ["a", "b"]},
        ]));

        match encode_csv(&batch) {
            Err(Error::Serialization(msg)) => {
                assert!(msg.contains("tags"), "{msg}");
                assert!(msg.contains("record 1"), "{msg}");
            }
            other => panic!("expected serialization error, got {other:?}"),
        }
    }
}
