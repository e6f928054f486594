use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use relay_api::RelayError;

mod daily;
mod rotated;

pub use daily::DailyFileSink;
pub use rotated::RotatedFileSink;

// ════════════════════════════════════════════════════════════════
//  FileSink
// ════════════════════════════════════════════════════════════════

/// Destination of a flushed batch.
///
/// `now` is the instant of the flush; sinks use it for file naming and
/// rotation instead of reading the clock themselves.
pub trait FileSink {
    /// Write every message of the batch in order. Returns the file written.
    fn write_batch(&mut self, messages: &[String], now: DateTime<Utc>) -> Result<PathBuf, RelayError>;
}

impl<S: FileSink + ?Sized> FileSink for Box<S> {
    fn write_batch(&mut self, messages: &[String], now: DateTime<Utc>) -> Result<PathBuf, RelayError> {
        (**self).write_batch(messages, now)
    }
}

/// Ensure exactly one trailing `\n`. Lines that already end with one are
/// returned untouched.
pub fn normalize_line(message: &str) -> Cow<'_, str> {
    if message.ends_with('\n') {
        Cow::Borrowed(message)
    } else {
        Cow::Owned(format!("{message}\n"))
    }
}

pub(crate) fn write_lines<W: Write>(w: &mut W, messages: &[String]) -> std::io::Result<()> {
    for m in messages {
        w.write_all(normalize_line(m).as_bytes())?;
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_missing_newline() {
        assert_eq!(normalize_line("abc"), "abc\n");
        assert!(matches!(normalize_line("abc"), Cow::Owned(_)));
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["", "x", "x\n", "a\nb", "{\"k\":1}\n"] {
            let once = normalize_line(s).into_owned();
            let twice = normalize_line(&once).into_owned();
            assert_eq!(once, twice);
            assert!(matches!(normalize_line(&once), Cow::Borrowed(_)));
        }
    }

    #[test]
    fn write_lines_keeps_order() {
        let mut buf = Vec::new();
        let msgs = vec!["one".to_string(), "two\n".to_string(), "three".to_string()];
        write_lines(&mut buf, &msgs).unwrap();
        assert_eq!(buf, b"one\ntwo\nthree\n");
    }
}
