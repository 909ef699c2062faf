// ============================================================
// Layer 6 — Logging
// ============================================================
// One global subscriber, two outputs:
//
//   console      coloured, always on
//   LogSink      plain text, pointed at a file per phase:
//                  <save_dir>/log_train.txt
//                  <save_dir>/log_validation.txt
//                  <save_dir>/log_test.txt
//
// The run directory is only known after argument parsing (and
// changes between training and evaluation), so the file side
// starts detached and is redirected with `LogSink::redirect`.
// Until then file writes are dropped.
//
// Filter: RUST_LOG, falling back to `robustqa=info`.

use anyhow::{anyhow, Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt, fmt::MakeWriter, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "robustqa=info";

/// Shared, redirectable file target for the log subscriber.
#[derive(Clone, Default)]
pub struct LogSink {
    file: Arc<Mutex<Option<File>>>,
}

impl LogSink {
    /// Send all following log lines to `path` (appending).
    pub fn redirect(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open log file '{}'", path.display()))?;

        let mut slot = self.file.lock().map_err(|_| anyhow!("Log sink lock poisoned"))?;
        *slot = Some(file);
        Ok(())
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))?;
        match slot.as_mut() {
            Some(f) => f.write(buf),
            None    => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))?;
        match slot.as_mut() {
            Some(f) => f.flush(),
            None    => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber and return the file sink.
pub fn init() -> Result<LogSink> {
    let sink = LogSink::default();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(sink.clone()))
        .try_init()
        .map_err(|e| anyhow!("Cannot install log subscriber: {e}"))?;

    Ok(sink)
}
