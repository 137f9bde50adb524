//! The `crashfile` record: `KEY=VALUE` lines terminated by `_END`.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ParseError;
use crate::fields::{ExtractedFields, FieldKey};

pub const RECORD_FILE_NAME: &str = "crashfile";
pub const EVENT_NAME: &str = "CRASH";
pub const PARSER_NAME: &str = "LEGACY_PARSER";
pub const END_MARKER: &str = "_END";

/// Event metadata written ahead of the extractor fields.
#[derive(Debug, Clone, Default)]
pub struct RecordHeader<'a> {
    pub id: &'a str,
    pub serial: &'a str,
    pub date: &'a str,
    pub uptime: &'a str,
    pub build: &'a str,
    pub board: &'a str,
    pub imei: &'a str,
    /// Normalized tag.
    pub tag: &'a str,
    pub data_ready: bool,
    pub operator: &'a str,
}

/// Append-only writer for one record.
///
/// Dropping a writer that was never finished still terminates the file with
/// `_END`, so a reader never sees a truncated record.
pub struct RecordWriter {
    path: PathBuf,
    out: BufWriter<File>,
    finished: bool,
}

impl RecordWriter {
    /// Create `<dir>/crashfile` (truncating any previous one) and write the header.
    pub fn create(dir: &Path, header: &RecordHeader<'_>) -> Result<Self, ParseError> {
        let path = dir.join(RECORD_FILE_NAME);
        let file = File::create(&path).map_err(|source| ParseError::RecordOpen {
            path: path.clone(),
            source,
        })?;
        let mut writer = Self {
            path,
            out: BufWriter::new(file),
            finished: false,
        };

        writer.line("EVENT", EVENT_NAME)?;
        writer.line("ID", header.id)?;
        writer.line("SN", header.serial)?;
        writer.line("DATE", header.date)?;
        writer.line("UPTIME", header.uptime)?;
        writer.line("BUILD", header.build)?;
        writer.line("BOARD", header.board)?;
        writer.line("IMEI", header.imei)?;
        writer.line("TYPE", header.tag)?;
        writer.line("DATA_READY", if header.data_ready { "1" } else { "0" })?;
        writer.line("OPERATOR", header.operator)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn line(&mut self, key: impl Display, value: &str) -> Result<(), ParseError> {
        writeln!(self.out, "{}={}", key, value).map_err(|source| ParseError::RecordWrite {
            path: self.path.clone(),
            source,
        })
    }

    /// Append a single field line, independent of the extractor fields.
    pub fn write_field(&mut self, key: FieldKey, value: &str) -> Result<(), ParseError> {
        self.line(key, value)
    }

    /// Append the extractor fields in their order.
    pub fn write_fields(&mut self, fields: &ExtractedFields) -> Result<(), ParseError> {
        for (key, value) in fields.iter() {
            self.line(key, value)?;
        }
        Ok(())
    }

    /// Write the footer and flush; returns the record path.
    pub fn finish(mut self, critical: bool) -> Result<PathBuf, ParseError> {
        self.line("CRITICAL", if critical { "YES" } else { "NO" })?;
        self.line("PARSER", PARSER_NAME)?;
        // Mark finished before the sentinel so a failing write is not retried on drop
        self.finished = true;
        writeln!(self.out, "{}", END_MARKER)
            .and_then(|_| self.out.flush())
            .map_err(|source| ParseError::RecordWrite {
                path: self.path.clone(),
                source,
            })?;
        Ok(self.path.clone())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let terminated = writeln!(self.out, "{}", END_MARKER).and_then(|_| self.out.flush());
        if let Err(e) = terminated {
            warn!(record = %self.path.display(), error = %e, "failed to terminate crash record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{DATA0, DATA2};
    use std::fs;
    use tempfile::TempDir;

    fn header() -> RecordHeader<'static> {
        RecordHeader {
            id: "abc123",
            serial: "SN42",
            date: "2016-01-01/00:00:00",
            uptime: "0000:01:02",
            build: "build-1",
            board: "moorefield",
            imei: "350000000000000",
            tag: "IPANIC",
            data_ready: true,
            operator: "op",
        }
    }

    #[test]
    fn test_full_record_layout() {
        let dir = TempDir::new().unwrap();
        let mut writer = RecordWriter::create(dir.path(), &header()).unwrap();
        let mut fields = ExtractedFields::new();
        fields.set(DATA0, "sig");
        fields.set(DATA2, "");
        writer.write_fields(&fields).unwrap();
        let path = writer.finish(true).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "EVENT=CRASH",
                "ID=abc123",
                "SN=SN42",
                "DATE=2016-01-01/00:00:00",
                "UPTIME=0000:01:02",
                "BUILD=build-1",
                "BOARD=moorefield",
                "IMEI=350000000000000",
                "TYPE=IPANIC",
                "DATA_READY=1",
                "OPERATOR=op",
                "DATA0=sig",
                "DATA2=",
                "CRITICAL=YES",
                "PARSER=LEGACY_PARSER",
                "_END",
            ]
        );
    }

    #[test]
    fn test_drop_terminates_unfinished_record() {
        let dir = TempDir::new().unwrap();
        let writer = RecordWriter::create(dir.path(), &header()).unwrap();
        let path = writer.path().to_path_buf();
        drop(writer);

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().last(), Some("_END"));
        assert_eq!(content.matches("_END").count(), 1);
        assert!(!content.contains("CRITICAL="));
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let err = RecordWriter::create(&missing, &header()).err().unwrap();
        assert!(matches!(err, ParseError::RecordOpen { .. }));
    }
}
