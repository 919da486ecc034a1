//! Persistent log of inspection verdicts.
//!
//! One JSON object per line, appended to the file so consecutive runs
//! accumulate.

use daq_sim::TimeBase;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A single inspection verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    /// Sequence number of the captured frame within the run
    pub sequence_id: u64,
    pub defect_detected: bool,
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
}

/// Thread-safe result log writing to a JSONL file
pub struct ResultLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    timebase: TimeBase,
}

impl ResultLog {
    /// Open `path` in append mode, creating parent directories as needed.
    pub fn create(path: &Path, timebase: TimeBase) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::with_capacity(8192, file))),
            timebase,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, sequence_id: u64, defect_detected: bool) -> io::Result<()> {
        self.append(&InspectionRecord {
            sequence_id,
            defect_detected,
            timestamp_us: self.timebase.now_us(),
            unix_us: self.timebase.unix_us(),
        })
    }

    pub fn append(&self, record: &InspectionRecord) -> io::Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("result log is closed"))?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Flush and release the file. Later writes fail; closing twice is a no-op.
    pub fn close(&self) -> io::Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Parse every record of a result log.
#[cfg(test)]
pub fn read_records(path: &Path) -> io::Result<Vec<InspectionRecord>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(io::Error::from))
        .collect()
}
