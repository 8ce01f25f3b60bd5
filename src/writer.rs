//! Timestamp-prefixing wrapper around the access log byte sink

use std::fs::File;
use std::io::{self, Write, stdout};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::timestamp::timestamp;

/// Byte sink shared by every worker. The mutex keeps prefixed lines from interleaving.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Prepends `[<timestamp>] ` to every write before forwarding it to the inner sink.
///
/// The prefix is added once per `write` call, so callers should hand over a complete line at a
/// time. Errors of the inner sink are returned as is.
#[derive(Debug)]
pub struct TimestampWriter<W> {
    inner: W,
    utc: bool,
}

impl<W: Write> TimestampWriter<W> {
    pub fn new(inner: W, utc: bool) -> Self {
        Self { inner, utc }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TimestampWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stamp = timestamp(self.utc);
        let mut line = Vec::with_capacity(stamp.len() + buf.len() + 3);
        line.push(b'[');
        line.extend_from_slice(stamp.as_bytes());
        line.extend_from_slice(b"] ");
        line.extend_from_slice(buf);

        self.inner.write_all(&line)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Opens the access log sink for `path`.
///
/// An empty path or `-` selects standard output. Files are opened in append mode and created if
/// necessary, a file that cannot be opened falls back to standard output.
pub fn open_log_sink(path: &Path) -> Box<dyn Write + Send> {
    if !path.as_os_str().is_empty() && path.as_os_str() != "-" {
        match File::options().append(true).create(true).open(path) {
            Ok(file) => return Box::new(file),
            Err(err) => {
                log::error!(
                    "Failed opening log file {} (cause: {err}), falling back to stdout",
                    path.display()
                );
            }
        }
    }
    Box::new(stdout())
}

/// Writes one complete line to the shared sink, logging failures instead of returning them.
pub(crate) fn write_line(writer: &SharedWriter, line: &str) {
    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(err) = writer.write_all(line.as_bytes()) {
        log::error!("Failed writing access log line: {err}");
    }
}
