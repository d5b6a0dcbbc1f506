use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::monitoring::domain::violation_log::{
    ViolationLogError, ViolationRecord, ViolationStore,
};
use crate::shared::constants::VIOLATION_LOG_HEADER;

/// Violation log kept as a delimited text file, one record per line,
/// below a single header row.
pub struct CsvViolationStore {
    path: PathBuf,
}

impl CsvViolationStore {
    /// Opens the log at `path`, creating parent directories and the header
    /// row if the file does not exist yet. An existing file is left as-is.
    pub fn open(path: &Path) -> Result<Self, ViolationLogError> {
        let open_err = |e| ViolationLogError::Open {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(open_err)?;
            }
        }
        if !path.exists() {
            fs::write(path, format!("{VIOLATION_LOG_HEADER}\n")).map_err(open_err)?;
        }
        log::info!("Violation log: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ViolationStore for CsvViolationStore {
    fn append(&mut self, record: &ViolationRecord) -> Result<(), ViolationLogError> {
        let append_err = |e| ViolationLogError::Append {
            path: self.path.clone(),
            source: e,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(append_err)?;
        writeln!(file, "{}", record.to_row()).map_err(append_err)
    }

    fn records(&self) -> Result<Vec<ViolationRecord>, ViolationLogError> {
        let read_err = |e| ViolationLogError::Read {
            path: self.path.clone(),
            source: e,
        };
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(read_err)?;
            if i == 0 || line.trim().is_empty() {
                continue;
            }
            match ViolationRecord::from_row(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping row {} of {}: {e}", i + 1, self.path.display()),
            }
        }
        Ok(records)
    }
}
