//! Row Sinks
//!
//! Where finished rows go. The engine only sees `RowSink`; the binary picks
//! CSV or JSON lines, tests collect rows in memory.

use crate::aggregate::{Row, Value};
use crate::error::{SyncError, SyncResult};
use crate::schema::Column;
use std::io::Write;

/// Receiver of emitted rows
pub trait RowSink {
    fn add(&mut self, row: &Row) -> SyncResult<()>;

    /// Flush buffered output at the end of a run
    fn finish(&mut self) -> SyncResult<()>;
}

/// Collects rows in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<Row>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowSink for MemorySink {
    fn add(&mut self, row: &Row) -> SyncResult<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> SyncResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// CSV with a header of display names; unset cells are empty
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    header: Vec<String>,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W, columns: &[Column]) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            header: columns.iter().map(|c| c.name.clone()).collect(),
            header_written: false,
        }
    }

    fn write_header(&mut self) -> SyncResult<()> {
        if !self.header_written {
            self.writer.write_record(&self.header)?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> SyncResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| SyncError::Sink(e.to_string()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn add(&mut self, row: &Row) -> SyncResult<()> {
        self.write_header()?;
        let record: Vec<String> = row
            .values()
            .iter()
            .map(|v| v.as_ref().map(Value::to_string).unwrap_or_default())
            .collect();
        self.writer.write_record(&record)?;
        Ok(())
    }

    fn finish(&mut self) -> SyncResult<()> {
        self.write_header()?;
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per line, keyed by column display name
pub struct JsonLinesSink<W: Write> {
    out: W,
    names: Vec<String>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W, columns: &[Column]) -> Self {
        Self {
            out,
            names: columns.iter().map(|c| c.name.clone()).collect(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn json_value(value: Option<&Value>) -> serde_json::Value {
    match value {
        None => serde_json::Value::Null,
        Some(Value::Long(v)) => serde_json::Value::from(*v),
        Some(Value::Double(v)) => serde_json::Value::from(*v),
        Some(other) => serde_json::Value::String(other.to_string()),
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn add(&mut self, row: &Row) -> SyncResult<()> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), json_value(row.get(i))))
            .collect();

        serde_json::to_writer(&mut self.out, &object)
            .map_err(|e| SyncError::Sink(e.to_string()))?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> SyncResult<()> {
        self.out.flush()?;
        Ok(())
    }
}
