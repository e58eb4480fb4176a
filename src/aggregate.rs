//! Record Aggregator
//!
//! The service answers with one line per (timestamp, tag). Readings sharing a
//! timestamp belong to one device measurement and are folded into a single
//! dense row whose positions come from the family's tag table.

use crate::error::FieldConversionError;
use crate::schema::{ColumnType, MetricFamily, TagColumn, MODEL_COLUMN, TIME_COLUMN};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

/// Output format for timestamps in rows and checkpoints
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of an API response
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedMeasurement {
    pub timestamp: NaiveDateTime,
    pub tag: String,
    pub model: Option<String>,
    pub value: String,
}

impl TaggedMeasurement {
    pub fn new(
        timestamp: NaiveDateTime,
        tag: impl Into<String>,
        model: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            tag: tag.into(),
            model: Some(model.into()),
            value: value.into(),
        }
    }
}

/// A typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Timestamp(NaiveDateTime),
    Text(String),
    Long(i64),
    Double(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Text(s) => f.write_str(s),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
        }
    }
}

/// Dense fixed-width record. Unset cells mean "not reported".
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    fn new(timestamp: NaiveDateTime, width: usize) -> Self {
        let mut values = vec![None; width];
        values[TIME_COLUMN] = Some(Value::Timestamp(timestamp));
        Self { values }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        match &self.values[TIME_COLUMN] {
            Some(Value::Timestamp(ts)) => *ts,
            _ => unreachable!("time column is always set"),
        }
    }

    pub fn model(&self) -> Option<&str> {
        match &self.values[MODEL_COLUMN] {
            Some(Value::Text(m)) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(|v| v.as_ref())
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Rows for one window plus what the engine needs to track progress
#[derive(Debug, Default)]
pub struct AggregatedWindow {
    /// Rows in ascending timestamp order
    pub rows: Vec<Row>,
    /// Largest timestamp among `rows`
    pub latest: Option<NaiveDateTime>,
    pub conversion_errors: Vec<FieldConversionError>,
}

/// Fold sparse tagged measurements into dense rows.
pub fn aggregate(family: MetricFamily, measurements: &[TaggedMeasurement]) -> AggregatedWindow {
    let width = family.width();
    let mut grouped: BTreeMap<NaiveDateTime, Row> = BTreeMap::new();
    let mut conversion_errors = Vec::new();

    for m in measurements {
        let row = grouped
            .entry(m.timestamp)
            .or_insert_with(|| Row::new(m.timestamp, width));

        if row.values[MODEL_COLUMN].is_none() {
            if let Some(model) = &m.model {
                row.values[MODEL_COLUMN] = Some(Value::Text(model.clone()));
            }
        }

        let Some((position, column)) = family.column_for_tag(&m.tag) else {
            continue;
        };

        match convert(column, &m.value) {
            Ok(value) => row.values[position] = value,
            Err(e) => conversion_errors.push(e),
        }
    }

    let latest = grouped.keys().next_back().copied();
    AggregatedWindow {
        rows: grouped.into_values().collect(),
        latest,
        conversion_errors,
    }
}

/// Convert raw text to the column's declared type. Blank text is unset.
fn convert(column: &TagColumn, raw: &str) -> Result<Option<Value>, FieldConversionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let error = || FieldConversionError {
        column: column.key.to_string(),
        value: raw.to_string(),
        expected: column.column_type.as_str(),
    };

    let value = match column.column_type {
        ColumnType::Double => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Double)
            .ok_or_else(error)?,
        ColumnType::Long => match text.parse::<i64>() {
            Ok(v) => Value::Long(v),
            // "20.0" is still an integer reading
            Err(_) => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                // `as` would saturate; 2^63 itself is already out of range
                .filter(|v| *v >= i64::MIN as f64 && *v < i64::MAX as f64)
                .map(|v| Value::Long(v as i64))
                .ok_or_else(error)?,
        },
        ColumnType::String => Value::Text(raw.to_string()),
        ColumnType::Timestamp => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .map(Value::Timestamp)
            .map_err(|_| error())?,
    };
    Ok(Some(value))
}
