//! Record sinks
//!
//! A sink receives the finished, ordered record set once the fetch has
//! succeeded. The fetch engine never writes anything itself.

use crate::error::{SinkError, SinkResult};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Consumes the final record set
pub trait RecordSink<R> {
    /// Write all records, returning the number of bytes produced
    fn write_records(&mut self, records: &[R]) -> SinkResult<u64>;
}

/// Writes each record as one JSON document per line
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> JsonLinesSink<W> {
    /// Wrap any writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Flush and return the inner writer
    pub fn into_inner(self) -> SinkResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl JsonLinesSink<File> {
    /// Create (or truncate) a file, creating parent directories as needed
    pub fn create(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "Creating output directory");
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self::new(File::create(path)?))
    }
}

impl JsonLinesSink<io::Stdout> {
    /// Write to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<R: Serialize, W: Write> RecordSink<R> for JsonLinesSink<W> {
    fn write_records(&mut self, records: &[R]) -> SinkResult<u64> {
        let mut bytes = 0u64;

        for (index, record) in records.iter().enumerate() {
            let line = serde_json::to_vec(record)
                .map_err(|source| SinkError::Serialize { index, source })?;
            self.writer.write_all(&line)?;
            self.writer.write_all(b"\n")?;
            bytes += line.len() as u64 + 1;
        }

        self.writer.flush()?;
        info!(records = records.len(), bytes, "Records written");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Row {
        id: u32,
        name: &'static str,
    }

    #[test]
    fn test_json_lines_to_buffer() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let rows = [Row { id: 1, name: "a" }, Row { id: 2, name: "b" }];

        let bytes = sink.write_records(&rows[..]).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();

        assert_eq!(out, "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n");
        assert_eq!(bytes, out.len() as u64);
    }

    #[test]
    fn test_empty_record_set() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let rows: [Row; 0] = [];
        assert_eq!(sink.write_records(&rows[..]).unwrap(), 0);
        assert!(sink.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/records.jsonl");

        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.write_records(&[Row { id: 7, name: "x" }][..]).unwrap();
        drop(sink);

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
    }
}
