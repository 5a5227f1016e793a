//! In-memory `tar.gz` archive shared between the session's writers.

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};

use std::path::Path;
use std::sync::Mutex;

use crate::{QprofError, QprofResult};

pub const ARCHIVE_FILE_NAME: &str = "profiles.tar.gz";
pub const ENTRY_MODE: u32 = 0o600;

/// Tar builder over a gzip encoder over a byte buffer.
///
/// Every [`ArchiveSink::append`] writes a header and its payload under one lock, so entries
/// from concurrent callers are never interleaved. Entry names are recorded in emission order.
pub struct ArchiveSink {
    inner: Mutex<SinkState>,
}

struct SinkState {
    builder: Builder<GzEncoder<Vec<u8>>>,
    entries: Vec<String>,
}

impl Default for ArchiveSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSink {
    pub fn new() -> Self {
        let gz = GzEncoder::new(Vec::new(), Compression::default());
        Self {
            inner: Mutex::new(SinkState {
                builder: Builder::new(gz),
                entries: Vec::new(),
            }),
        }
    }

    pub fn append(&self, name: &str, payload: &[u8], mode: u32, mtime: u64) -> QprofResult<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(payload.len() as u64);
        header.set_mode(mode);
        header.set_mtime(mtime);

        let mut state = self
            .inner
            .lock()
            .map_err(|_| QprofError::archive("archive sink lock poisoned"))?;
        state
            .builder
            .append_data(&mut header, name, payload)
            .map_err(QprofError::Archive)?;
        state.entries.push(name.to_string());
        tracing::debug!(entry = name, bytes = payload.len(), "archive entry appended");
        Ok(())
    }

    pub fn entries(&self) -> QprofResult<Vec<String>> {
        let state = self
            .inner
            .lock()
            .map_err(|_| QprofError::archive("archive sink lock poisoned"))?;
        Ok(state.entries.clone())
    }

    /// Finishes the tar stream, then the gzip stream, and returns the compressed bytes.
    pub fn seal(self) -> QprofResult<SealedArchive> {
        let state = self
            .inner
            .into_inner()
            .map_err(|_| QprofError::archive("archive sink lock poisoned"))?;
        let gz = state.builder.into_inner().map_err(QprofError::Archive)?;
        let bytes = gz.finish().map_err(QprofError::Archive)?;
        Ok(SealedArchive {
            bytes,
            entries: state.entries,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SealedArchive {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

impl SealedArchive {
    /// Writes next to `path` and renames into place, so `path` is either complete or absent.
    pub fn persist(&self, path: &Path) -> QprofResult<()> {
        let tmp = path.with_extension("gz.tmp");
        let written = std::fs::write(&tmp, &self.bytes).and_then(|()| std::fs::rename(&tmp, path));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(QprofError::Archive(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::read_entries;
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    #[test]
    fn sealed_archive_preserves_order_and_headers() {
        let sink = ArchiveSink::new();
        sink.append("base-heap.pb.gz", b"\x1f\x8bheap", ENTRY_MODE, 1_700_000_000)
            .expect("append");
        sink.append("info.txt", b"Flags:\n", ENTRY_MODE, 1_700_000_001)
            .expect("append");
        let sealed = sink.seal().expect("seal");
        assert_eq!(sealed.entries, vec!["base-heap.pb.gz", "info.txt"]);

        let entries = read_entries(&sealed.bytes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "base-heap.pb.gz");
        assert_eq!(entries[0].data, b"\x1f\x8bheap");
        assert_eq!(entries[0].mode, 0o600);
        assert_eq!(entries[0].mtime, 1_700_000_000);
        assert_eq!(entries[1].name, "info.txt");
    }

    #[test]
    fn empty_payload_is_a_valid_entry() {
        let sink = ArchiveSink::new();
        sink.append("mutex.txt", b"", ENTRY_MODE, 0).expect("append");
        let entries = read_entries(&sink.seal().expect("seal").bytes);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].data.is_empty());
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let sink = Arc::new(ArchiveSink::new());
        let mut handles = Vec::new();
        for t in 0..4u8 {
            let sink = Arc::clone(&sink);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    let payload = vec![t; 4096 + i];
                    sink.append(&format!("t{t}-{i}"), &payload, ENTRY_MODE, 0)
                        .expect("append");
                }
            }));
        }
        for h in handles {
            h.join().expect("writer");
        }
        let sink = Arc::into_inner(sink).expect("sole owner");
        let entries = read_entries(&sink.seal().expect("seal").bytes);
        assert_eq!(entries.len(), 100);
        for entry in entries {
            let (thread_tag, index) = entry.name[1..].split_once('-').expect("name");
            let t: u8 = thread_tag.parse().expect("thread");
            let i: usize = index.parse().expect("index");
            assert_eq!(entry.data.len(), 4096 + i);
            assert!(entry.data.iter().all(|b| *b == t));
        }
    }

    #[test]
    fn persist_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("qprof-archive-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let sink = ArchiveSink::new();
        sink.append("info.txt", b"done\n", ENTRY_MODE, 0).expect("append");
        let sealed = sink.seal().expect("seal");
        let path = dir.join(ARCHIVE_FILE_NAME);
        sealed.persist(&path).expect("persist");

        assert_eq!(std::fs::read(&path).expect("read"), sealed.bytes);
        assert!(!dir.join("profiles.tar.gz.tmp").exists());
    }

    #[test]
    fn failed_write_reports_archive_error_and_leaves_no_output() {
        let dir = std::env::temp_dir().join(format!("qprof-archive-{}", Uuid::new_v4()));
        let tmp = dir.join("profiles.tar.gz.tmp");
        std::fs::create_dir_all(tmp.join("occupied")).expect("mkdir");
        let sink = ArchiveSink::new();
        sink.append("info.txt", b"done\n", ENTRY_MODE, 0).expect("append");
        let path = dir.join(ARCHIVE_FILE_NAME);

        let err = sink.seal().expect("seal").persist(&path).expect_err("must fail");
        assert!(matches!(err, QprofError::Archive(_)), "got {err:?}");
        assert!(!path.exists());
    }
}
