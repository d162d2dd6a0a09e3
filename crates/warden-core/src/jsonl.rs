//! JSONL storage: one JSON record per line.
//!
//! Every append-only surface (repair log, prevention ledger, validation log,
//! historical events, telemetry) uses this format. Blank lines and `#`
//! comment lines are skipped on read.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Read records from a JSONL reader.
pub fn read_records<T: DeserializeOwned>(reader: impl BufRead) -> Result<Vec<T>, JsonlError> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| JsonlError::Io(line_no + 1, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: T = serde_json::from_str(trimmed)
            .map_err(|e| JsonlError::Parse(line_no + 1, e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Records read leniently: good lines kept, bad lines reported by number.
#[derive(Debug)]
pub struct LenientRead<T> {
    pub records: Vec<T>,
    pub errors: Vec<JsonlError>,
}

/// Read records, skipping lines that do not parse. An I/O error ends the
/// read; records before it are kept.
pub fn read_records_lenient<T: DeserializeOwned>(reader: impl BufRead) -> LenientRead<T> {
    let mut read = LenientRead {
        records: Vec::new(),
        errors: Vec::new(),
    };
    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                read.errors.push(JsonlError::Io(line_no + 1, e.to_string()));
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(record) => read.records.push(record),
            Err(e) => read.errors.push(JsonlError::Parse(line_no + 1, e.to_string())),
        }
    }
    read
}

/// Read records from a JSONL file path. A missing file reads as empty.
pub fn read_records_from_path<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Vec<T>, JsonlError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(path).map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    read_records(BufReader::new(file))
}

/// Append one record as a single line, creating the file and parents on demand.
pub fn append_record<T: Serialize>(path: impl AsRef<Path>, record: &T) -> Result<(), JsonlError> {
    let path = path.as_ref();
    let line = serde_json::to_string(record).map_err(|e| JsonlError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", parent.display())))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    writeln!(file, "{line}").map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    file.flush()
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))
}

/// Errors from JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
        n: u32,
    }

    #[test]
    fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/rows.jsonl");
        append_record(&path, &Row { id: "a".into(), n: 1 }).expect("append a");
        append_record(&path, &Row { id: "b".into(), n: 2 }).expect("append b");

        let rows: Vec<Row> = read_records_from_path(&path).expect("read rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[1].n, 2);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# header\n\n{\"id\":\"x\",\"n\":7}\n";
        let rows: Vec<Row> = read_records(text.as_bytes()).expect("read rows");
        assert_eq!(rows, vec![Row { id: "x".into(), n: 7 }]);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let text = "{\"id\":\"x\",\"n\":7}\nnot json\n";
        let err = read_records::<Row>(text.as_bytes()).expect_err("second line is malformed");
        assert!(matches!(err, JsonlError::Parse(2, _)));
    }

    #[test]
    fn lenient_read_keeps_good_lines_around_bad_ones() {
        let text = "{\"id\":\"a\",\"n\":1}\nnot json\n{\"id\":\"b\",\"n\":2}\n{\"id\":3}\n";
        let read = read_records_lenient::<Row>(text.as_bytes());
        assert_eq!(read.records.len(), 2);
        assert_eq!(read.records[1], Row { id: "b".into(), n: 2 });
        assert_eq!(read.errors.len(), 2);
        assert!(matches!(read.errors[0], JsonlError::Parse(2, _)));
        assert!(matches!(read.errors[1], JsonlError::Parse(4, _)));
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rows: Vec<Row> =
            read_records_from_path(dir.path().join("absent.jsonl")).expect("missing reads empty");
        assert!(rows.is_empty());
    }
}
