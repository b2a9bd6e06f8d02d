//! CSV files written incrementally while the simulation runs
//!
//! Files are reopened for every write, so they can be tailed while a run is in progress and
//! everything written before a crash is kept. The header is written once per file and run: the
//! first write of a run truncates whatever a previous run left behind.

use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct CsvFile {
    path: PathBuf,
    header: &'static str,
    header_written: bool,
}

impl CsvFile {
    pub fn new(path: PathBuf, header: &'static str) -> Self {
        Self {
            path,
            header,
            header_written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Appends `rows`, preceded by the header if this is the first write of the run
    pub fn append<I>(&mut self, rows: I) -> anyhow::Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        ensure_parent_dir(&self.path)?;

        let file = if self.header_written {
            OpenOptions::new().append(true).open(&self.path)
        } else {
            File::create(&self.path)
        }
        .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut writer = BufWriter::new(file);
        if !self.header_written {
            writeln!(writer, "{}", self.header)?;
            self.header_written = true;
        }

        for row in rows {
            writeln!(writer, "{}", row.as_ref())?;
        }

        writer
            .flush()
            .with_context(|| format!("failed to write to {}", self.path.display()))
    }
}

/// Replaces the contents of `path` with `header` followed by `rows`
pub fn write_table<I>(path: &Path, header: &str, rows: I) -> anyhow::Result<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    ensure_parent_dir(path)?;
    let file =
        File::create(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{header}")?;
    for row in rows {
        writeln!(writer, "{}", row.as_ref())?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write to {}", path.display()))
}

/// Creates `dir` and its ancestors, succeeding if they already exist
pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create directory {}", dir.display()))
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Local wall-clock time, as written in the `timestamp` columns
pub fn wall_clock_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.csv");
        let mut csv = CsvFile::new(path.clone(), "a,b");
        assert_eq!(csv.path(), path);

        csv.append(["1,2"]).unwrap();
        csv.append(["3,4", "5,6"]).unwrap();
        csv.append(Vec::<String>::new()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a,b\n1,2\n3,4\n5,6\n");
    }

    #[test]
    fn test_first_write_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "a,b\nstale,row\n").unwrap();

        let mut csv = CsvFile::new(path.clone(), "a,b");
        assert!(!csv.header_written());
        csv.append(["1,2"]).unwrap();
        assert!(csv.header_written());

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_write_table_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("table.csv");

        write_table(&path, "x", ["1", "2"]).unwrap();
        write_table(&path, "x", ["3"]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n3\n");
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_unwritable_path_reports_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let mut csv = CsvFile::new(blocker.join("log.csv"), "a");
        assert!(csv.append(["1"]).is_err());
        assert!(!csv.header_written());
    }

    #[test]
    fn test_timestamp_format() {
        let timestamp = wall_clock_timestamp();
        assert_eq!(timestamp.len(), "2024-01-01 00:00:00".len());
        assert!(chrono::NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
