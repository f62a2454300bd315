//! Append-only log file writer.
//!
//! Each writer handed out by [`AppendMakeWriter`] buffers one log line and
//! appends it with a single `write_all` when dropped, so concurrent processes
//! appending to the same file never interleave within a line.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared handle on a log file opened in append mode.
#[derive(Clone, Debug)]
pub struct AppendMakeWriter {
    file: Arc<Mutex<File>>,
}

impl AppendMakeWriter {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

/// Buffer for a single log line.
pub struct LineWriter {
    file: Arc<Mutex<File>>,
    buf: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut file = self.file.lock();
        file.write_all(&self.buf)?;
        self.buf.clear();
        file.flush()
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for AppendMakeWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            file: self.file.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join("courier.jsonl");

        assert!(AppendMakeWriter::open(&path).is_ok());
        assert!(path.is_file());
    }

    #[test]
    fn test_line_is_written_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.jsonl");
        let make_writer = AppendMakeWriter::open(&path).unwrap();

        {
            let mut writer = make_writer.make_writer();
            write!(writer, "first ").unwrap();
            writeln!(writer, "line").unwrap();
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        }
        writeln!(make_writer.make_writer(), "second line").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "first line\nsecond line\n"
        );
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.jsonl");

        writeln!(AppendMakeWriter::open(&path).unwrap().make_writer(), "one").unwrap();
        writeln!(AppendMakeWriter::open(&path).unwrap().make_writer(), "two").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
