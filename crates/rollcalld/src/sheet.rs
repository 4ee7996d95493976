//! Durable attendance log: an in-memory ordered record list flushed to a
//! session-unique CSV file.
//!
//! The on-disk format does not support row-level appends, so every flush
//! rewrites the whole table, to a temp sibling first and then renamed over
//! the log file. A crash between flushes loses at most one flush interval's
//! worth of records; a crash mid-flush leaves the previous file intact.

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use rollcall_core::Identity;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SHEET_HEADER: &str = "ID,Name,Date,Time,Roll Number,Presence Indicator";

/// Serialized roll number for identities absent from the roster.
const UNKNOWN_ROLL: &str = "unknown";

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("attendance log write failed: {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// One attendance row. Created at most once per (identity, session),
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    /// Monotonic, starts at 1 within one sheet.
    pub sequence_id: u64,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub roll_number: Option<u32>,
}

impl AttendanceRecord {
    fn to_row(&self) -> String {
        let roll = match self.roll_number {
            Some(roll) => roll.to_string(),
            None => UNKNOWN_ROLL.to_string(),
        };
        format!(
            "{},{},{},{},{},1",
            self.sequence_id,
            csv_field(&self.name),
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M:%S"),
            roll,
        )
    }
}

/// Append-only in-memory log with explicit whole-file flush.
pub struct AttendanceSheet {
    path: PathBuf,
    records: Vec<AttendanceRecord>,
    dirty: bool,
}

impl AttendanceSheet {
    /// Create the session log under `log_dir`, named after the session
    /// start timestamp so repeated runs never collide. The header is
    /// flushed immediately so the file exists from the first moment.
    pub fn create(log_dir: &Path, started_at: DateTime<Local>) -> Result<Self, SheetError> {
        fs::create_dir_all(log_dir).map_err(|source| SheetError::Write {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let file_name = format!("attendance-{}.csv", started_at.format("%Y%m%d-%H%M%S"));
        let mut sheet = Self {
            path: log_dir.join(file_name),
            records: Vec::new(),
            dirty: true,
        };
        sheet.flush()?;
        Ok(sheet)
    }

    /// Append a record for `identity` and mark the sheet dirty.
    /// Returns the assigned sequence id.
    pub fn mark(&mut self, identity: &Identity, at: DateTime<Local>) -> u64 {
        let sequence_id = self.records.len() as u64 + 1;
        self.records.push(AttendanceRecord {
            sequence_id,
            name: identity.name.clone(),
            date: at.date_naive(),
            time: at.time(),
            roll_number: identity.roll_number,
        });
        self.dirty = true;
        sequence_id
    }

    /// Persist the full table. No-op when nothing changed since the last
    /// flush.
    pub fn flush(&mut self) -> Result<(), SheetError> {
        if !self.dirty {
            return Ok(());
        }

        let mut table = String::with_capacity(64 * (self.records.len() + 1));
        table.push_str(SHEET_HEADER);
        table.push('\n');
        for record in &self.records {
            table.push_str(&record.to_row());
            table.push('\n');
        }

        let write = |path: &Path| -> io::Result<()> {
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, table.as_bytes())?;
            fs::rename(&tmp, path)
        };
        write(&self.path).map_err(|source| SheetError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.dirty = false;
        Ok(())
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a CSV field when it contains a separator, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn identity(name: &str, roll: Option<u32>) -> Identity {
        Identity {
            name: name.to_string(),
            roll_number: roll,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_create_writes_header_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();
        assert_eq!(read_lines(sheet.path()), vec![SHEET_HEADER.to_string()]);
    }

    #[test]
    fn test_session_unique_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let a = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();
        let b = AttendanceSheet::create(dir.path(), at(9, 0, 1)).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert!(b.path().exists());
    }

    #[test]
    fn test_flush_persists_only_appended_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();

        // Records at t=0 and t=10; flush at t=31 must persist exactly these.
        sheet.mark(&identity("Alice", Some(3)), at(9, 0, 0));
        sheet.mark(&identity("Bob", Some(10)), at(9, 0, 10));
        sheet.flush().unwrap();
        assert_eq!(read_lines(sheet.path()).len(), 3);

        // A later record stays in memory until the next flush.
        sheet.mark(&identity("Carol", None), at(9, 0, 40));
        assert_eq!(read_lines(sheet.path()).len(), 3);
        assert_eq!(sheet.records().len(), 3);

        sheet.flush().unwrap();
        let lines = read_lines(sheet.path());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "3,Carol,2026-03-14,09:00:40,unknown,1");
    }

    #[test]
    fn test_sequence_ids_start_at_one_and_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();

        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            let id = sheet.mark(&identity(name, None), at(9, 0, i as u32));
            assert_eq!(id, i as u64 + 1);
        }
        let ids: Vec<u64> = sheet.records().iter().map(|r| r.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_row_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = AttendanceSheet::create(dir.path(), at(14, 30, 5)).unwrap();
        sheet.mark(&identity("Jafir", Some(3)), at(14, 30, 5));
        sheet.flush().unwrap();

        let lines = read_lines(sheet.path());
        assert_eq!(lines[0], SHEET_HEADER);
        assert_eq!(lines[1], "1,Jafir,2026-03-14,14:30:05,3,1");
    }

    #[test]
    fn test_names_with_separators_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();
        sheet.mark(&identity("Hasnat, Md. Sanzis", Some(26)), at(9, 0, 0));
        sheet.flush().unwrap();

        let lines = read_lines(sheet.path());
        assert_eq!(lines[1], "1,\"Hasnat, Md. Sanzis\",2026-03-14,09:00:00,26,1");
    }

    #[test]
    fn test_flush_when_clean_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sheet = AttendanceSheet::create(dir.path(), at(9, 0, 0)).unwrap();
        sheet.mark(&identity("Alice", None), at(9, 0, 0));
        sheet.flush().unwrap();
        let before = fs::metadata(sheet.path()).unwrap().modified().unwrap();
        sheet.flush().unwrap();
        let after = fs::metadata(sheet.path()).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_quoting_escapes_embedded_quotes() {
        assert_eq!(csv_field(r#"the "boss""#), r#""the ""boss""""#);
        assert_eq!(csv_field("plain"), "plain");
    }
}
