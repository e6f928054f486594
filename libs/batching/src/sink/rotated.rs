use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use relay_api::RelayError;

use super::{write_lines, FileSink};

/// New file per flush: `<dir>/<epoch-millis><name>.<ext>`.
///
/// Two flushes within the same millisecond land in the same path and the
/// second one overwrites the first.
#[derive(Debug, Clone)]
pub struct RotatedFileSink {
    dir: PathBuf,
    name: String,
    extension: String,
}

impl RotatedFileSink {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", now.timestamp_millis(), self.name, self.extension))
    }
}

impl FileSink for RotatedFileSink {
    fn write_batch(&mut self, messages: &[String], now: DateTime<Utc>) -> Result<PathBuf, RelayError> {
        let path = self.file_path(now);
        let f = std::fs::File::create(&path)
            .map_err(|e| RelayError::sink(format!("create {}: {e}", path.display())))?;
        let mut w = BufWriter::new(f);
        write_lines(&mut w, messages)
            .map_err(|e| RelayError::sink(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }
}
