//! Fakes and archive readers shared by the unit tests.

use flate2::read::GzDecoder;

use std::io::Read as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::{QprofError, QprofResult, QueryClient, QueryRows};

/// Query client whose executions take `latency` and fail from call `fail_at` onwards.
#[derive(Default)]
pub struct FakeClient {
    pub latency: Duration,
    pub fail_at: Option<u64>,
    pub calls: AtomicU64,
    /// Longest single execution observed so far.
    pub slowest: Mutex<Duration>,
}

impl QueryClient for FakeClient {
    fn ping(&self) -> QprofResult<Duration> {
        Ok(Duration::from_millis(1))
    }

    fn query(&self, _text: &str, _database: &str) -> QprofResult<QueryRows> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        std::thread::sleep(self.latency);
        let took = started.elapsed();
        let mut slowest = self.slowest.lock().expect("slowest");
        if took > *slowest {
            *slowest = took;
        }
        drop(slowest);
        if self.fail_at.is_some_and(|n| call >= n) {
            return Err(QprofError::Workload("partial write: timeout".to_string()));
        }
        Ok(QueryRows::default())
    }
}

pub struct ReadEntry {
    pub name: String,
    pub mode: u32,
    pub mtime: u64,
    pub data: Vec<u8>,
}

pub fn read_entries(bytes: &[u8]) -> Vec<ReadEntry> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut out = Vec::new();
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        let header = entry.header();
        let name = header.path().expect("path").to_string_lossy().to_string();
        let mode = header.mode().expect("mode");
        let mtime = header.mtime().expect("mtime");
        let size = header.size().expect("size");
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry");
        assert_eq!(size, data.len() as u64);
        out.push(ReadEntry {
            name,
            mode,
            mtime,
            data,
        });
    }
    out
}
