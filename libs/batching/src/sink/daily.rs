use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use relay_api::{date_string, utc_day, RelayError};

use super::{write_lines, FileSink};

/// Один append-файл на UTC-день: `<dir>/<YYYY-MM-DD>[_<name>].<ext>`.
///
/// Ротация проверяется только при flush: после записи батча текущий день
/// сравнивается с днём открытия файла.
#[derive(Debug)]
pub struct DailyFileSink {
    dir: PathBuf,
    name: Option<String>,
    extension: String,
    day: (i32, u32),
    path: PathBuf,
    writer: BufWriter<File>,
}

impl DailyFileSink {
    /// Open (append) the file for the day of `now`.
    pub fn open(
        dir: impl Into<PathBuf>,
        name: Option<String>,
        extension: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, RelayError> {
        let dir = dir.into();
        let name = name.filter(|n| !n.is_empty());
        let extension = extension.into();
        let path = daily_path(&dir, name.as_deref(), &extension, now);
        let writer = open_append(&path)?;
        tracing::info!(path = %path.display(), "opened archive file");

        Ok(Self {
            dir,
            name,
            extension,
            day: utc_day(now),
            path,
            writer,
        })
    }

    /// Файл, в который пишется текущий день.
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    /// Switch to the file of `now`'s day if it is later than the open one.
    /// On failure the old handle stays in use and the next flush retries.
    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> Result<(), RelayError> {
        let today = utc_day(now);
        if today <= self.day {
            return Ok(());
        }

        let path = daily_path(&self.dir, self.name.as_deref(), &self.extension, now);
        self.writer = open_append(&path)?;

        tracing::info!(from = %self.path.display(), to = %path.display(), "rotated archive file");
        self.path = path;
        self.day = today;
        Ok(())
    }
}

impl FileSink for DailyFileSink {
    fn write_batch(&mut self, messages: &[String], now: DateTime<Utc>) -> Result<PathBuf, RelayError> {
        let written = self.path.clone();
        write_lines(&mut self.writer, messages)
            .map_err(|e| RelayError::sink(format!("write {}: {e}", written.display())))?;
        // the batch is already on disk; a failed rotation only delays the switch
        if let Err(e) = self.rotate_if_needed(now) {
            tracing::error!(path = %self.path.display(), error = %e, "archive rotation failed, retrying on next batch");
        }
        Ok(written)
    }
}

impl Drop for DailyFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "flush on close failed");
        }
    }
}

fn daily_path(dir: &Path, name: Option<&str>, extension: &str, now: DateTime<Utc>) -> PathBuf {
    let date = date_string(now);
    match name {
        Some(name) => dir.join(format!("{date}_{name}.{extension}")),
        None => dir.join(format!("{date}.{extension}")),
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>, RelayError> {
    let f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RelayError::sink(format!("open {}: {e}", path.display())))?;
    Ok(BufWriter::new(f))
}
