//! Run log shared by the orchestrator, the workload loop and the background capture.

use time::OffsetDateTime;
use time::macros::format_description;

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

/// Append-only log teed to a console writer and to an in-memory buffer.
///
/// Each call writes one complete line while holding the lock. Nothing is dropped or truncated;
/// the buffer becomes `info.txt` when the archive is sealed.
pub struct RunLog {
    inner: Mutex<LogState>,
}

struct LogState {
    console: Box<dyn Write + Send>,
    buffer: String,
}

impl RunLog {
    pub fn stderr() -> Self {
        Self::with_console(Box::new(std::io::stderr()))
    }

    /// A log that only fills the buffer.
    pub fn quiet() -> Self {
        Self::with_console(Box::new(std::io::sink()))
    }

    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(LogState {
                console,
                buffer: String::new(),
            }),
        }
    }

    pub fn print(&self, message: impl AsRef<str>) {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]/[month]/[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default();
        let message = message.as_ref().trim_end_matches('\n');
        self.write_raw(&format!("{stamp} {message}\n"));
    }

    pub fn printf(&self, args: fmt::Arguments<'_>) {
        self.print(args.to_string());
    }

    /// Appends text verbatim, without a timestamp.
    pub fn write_raw(&self, text: &str) {
        let mut state = self.lock();
        // Console errors are ignored; the buffered copy is what lands in the archive.
        let _ = state.console.write_all(text.as_bytes());
        let _ = state.console.flush();
        state.buffer.push_str(text);
    }

    /// Appends text to the buffer only.
    pub fn record(&self, text: &str) {
        self.lock().buffer.push_str(text);
    }

    pub fn contents(&self) -> String {
        self.lock().buffer.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // Every push is a single call, so a poisoned buffer never holds a partial line.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
