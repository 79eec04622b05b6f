//! CSV data logs, one file per worker.

use log::{info, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends rows to one CSV file. A failed write is logged once and turns
/// the recorder off; recording never stops the rig.
#[derive(Debug)]
pub struct CsvRecorder {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl CsvRecorder {
    /// Creates `dir/file` and writes `header` as its first line.
    pub fn create(dir: &Path, file: &str, header: &str) -> std::io::Result<Self> {
        let path = dir.join(file);
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "{}", header)?;
        info!("Recording to {}.", path.display());
        Ok(Self {
            path,
            out: Some(out),
        })
    }

    /// Opens a recorder if `dir` is set. Failure to create the file is
    /// logged and yields `None`.
    pub fn maybe_create(dir: Option<&Path>, file: &str, header: &str) -> Option<Self> {
        let dir = dir?;
        match Self::create(dir, file, header) {
            Ok(rec) => Some(rec),
            Err(e) => {
                warn!("Not recording {}: {}", dir.join(file).display(), e);
                None
            }
        }
    }

    /// Appends one row.
    pub fn record(&mut self, row: fmt::Arguments) {
        let Some(out) = self.out.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(out, "{}", row) {
            warn!("Stopped recording {}: {}", self.path.display(), e);
            self.out = None;
        }
    }

    /// Whether rows are still being written.
    pub fn is_active(&self) -> bool {
        self.out.is_some()
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                warn!("Failed to flush {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut rec = CsvRecorder::create(dir.path(), "stage.csv", "t,x").unwrap();
            rec.record(format_args!("{:.1},{}", 1.0, 2));
            rec.record(format_args!("{:.1},{}", 1.5, 3));
            assert!(rec.is_active());
        }

        let text = fs::read_to_string(dir.path().join("stage.csv")).unwrap();
        assert_eq!(text, "t,x\n1.0,2\n1.5,3\n");
    }

    #[test]
    fn no_directory_means_no_recorder() {
        assert!(CsvRecorder::maybe_create(None, "pose.csv", "t").is_none());
    }

    #[test]
    fn unwritable_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(CsvRecorder::maybe_create(Some(&missing), "pose.csv", "t").is_none());
    }
}
