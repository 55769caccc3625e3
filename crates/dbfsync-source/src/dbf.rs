use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dbase::{ErrorKind, FieldValue};
use dbfsync_core::{RawRecord, Value};
use tracing::{debug, info};

use crate::error::{SourceError, SourceResult};
use crate::RecordSource;

/// dBASE table reader.
///
/// Text is decoded with the code page declared in the table header. Tables
/// without one are read as cp1252. Memo fields require their companion memo file.
#[derive(Debug, Default, Clone)]
pub struct DbfSource;

impl DbfSource {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSource for DbfSource {
    fn open(&self, path: &Path) -> SourceResult<Vec<RawRecord>> {
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(SourceError::NotFound(shown));
        }

        let mut reader = dbase::Reader::from_path(path).map_err(|e| classify(&shown, e))?;
        let names: Vec<String> = reader
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        debug!(path = %shown, fields = names.len(), "Opened table");

        let rows = reader.read().map_err(|e| classify(&shown, e))?;

        let records: Vec<RawRecord> = rows
            .into_iter()
            .map(|row| {
                let mut record = RawRecord::new();
                for name in &names {
                    let value = row.get(name).cloned().map(convert).unwrap_or(Value::Null);
                    record.insert(name.clone(), value);
                }
                record
            })
            .collect();

        info!(path = %shown, records = records.len(), "Read table");
        Ok(records)
    }
}

fn classify(path: &str, err: dbase::Error) -> SourceError {
    match err.kind() {
        ErrorKind::MissingMemoFile | ErrorKind::ErrorOpeningMemoFile(_) => {
            SourceError::MissingMemo(path.to_string())
        }
        _ => SourceError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        },
    }
}

fn convert_date(date: dbase::Date) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year() as i32, date.month(), date.day())
}

/// Converts a dBASE field value into the pipeline's value model.
pub(crate) fn convert(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => Value::String(s),
        FieldValue::Character(None) => Value::Null,
        FieldValue::Numeric(n) => n.map(Value::Float).unwrap_or(Value::Null),
        FieldValue::Float(f) => f.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null),
        FieldValue::Logical(b) => b.map(Value::Bool).unwrap_or(Value::Null),
        FieldValue::Integer(i) => Value::Int(i as i64),
        FieldValue::Currency(c) | FieldValue::Double(c) => Value::Float(c),
        FieldValue::Date(d) => d
            .and_then(convert_date)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        FieldValue::DateTime(dt) => {
            let time = dt.time();
            let date = convert_date(dt.date());
            let time = NaiveTime::from_hms_opt(time.hours(), time.minutes(), time.seconds());
            match (date, time) {
                (Some(d), Some(t)) => Value::DateTime(NaiveDateTime::new(d, t)),
                _ => Value::Null,
            }
        }
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
