//! Progress output of the `export` and `sync` commands.

use ch_sync_export::{ExportEvent, ExportObserver, TracingObserver};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Writes each event as one JSON line and mirrors it into the log.
pub struct ProgressPrinter<W> {
    out: Mutex<W>,
}

impl ProgressPrinter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ExportObserver for ProgressPrinter<W> {
    fn on_event(&self, event: &ExportEvent) {
        TracingObserver.on_event(event);
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode event: {e}");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("Failed to write progress event: {e}");
        }
    }
}
