//! Profiling session orchestrator.
//!
//! A session captures every profile kind once before the workload (`base-`), once more for the
//! concurrent-capable kinds while the workload runs (`concurrent-`), and once after it (bare
//! names), then appends the run log as `info.txt` and seals the archive.
//!
//! The mid-run capture happens on one background thread. It is always joined before the final
//! capture starts, so no concurrent entry can land after a final one.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::{
    ArchiveSink, CapturedProfile, ENTRY_MODE, Fetched, Phase, ProfileSource, ProfileSpec,
    QprofResult, QueryClient, RunLog, SessionRunner, SessionStats, Settings, WorkloadMode,
    format_duration,
};

pub const INFO_ENTRY: &str = "info.txt";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub query: String,
    pub database: String,
    pub mode: WorkloadMode,
    /// Delay between the start of the workload and the concurrent capture.
    pub warmup: Duration,
    pub cpu_enabled: bool,
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            query: settings.query.clone(),
            database: settings.database.clone(),
            mode: settings.mode,
            warmup: settings.warmup,
            cpu_enabled: settings.cpu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    BaseCapture,
    Running,
    Draining,
    FinalCapture,
    Sealed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProfile {
    pub phase: Phase,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Stored { entry: String },
    Skipped(SkippedProfile),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    #[serde(rename = "archivePath")]
    pub archive_path: PathBuf,
    #[serde(flatten)]
    pub stats: SessionStats,
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedProfile>,
    #[serde(rename = "shortRun")]
    pub short_run: bool,
}

pub struct ProfileSession<'a, S: ProfileSource, C: QueryClient> {
    id: Uuid,
    source: &'a S,
    client: &'a C,
    log: &'a RunLog,
    specs: &'a [ProfileSpec],
    options: SessionOptions,
    state: Cell<SessionState>,
}

impl<'a, S: ProfileSource, C: QueryClient> ProfileSession<'a, S, C> {
    pub fn new(
        source: &'a S,
        client: &'a C,
        log: &'a RunLog,
        specs: &'a [ProfileSpec],
        options: SessionOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            client,
            log,
            specs,
            options,
            state: Cell::new(SessionState::Idle),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Runs the whole session and writes the archive to `archive_path`.
    ///
    /// Any error other than an unsupported profile kind aborts the session; the in-memory
    /// archive is dropped and nothing is written.
    pub fn run(self, archive_path: &Path) -> QprofResult<SessionReport> {
        self.log.printf(format_args!("Session {} started", self.id));
        let sink = ArchiveSink::new();
        let mut skipped = Vec::new();

        self.enter(SessionState::BaseCapture);
        self.capture_phase(&sink, Phase::Base, &mut skipped)?;

        self.enter(SessionState::Running);
        let concurrent: Vec<&ProfileSpec> = self.specs.iter().filter(|p| p.concurrent).collect();
        let stats = thread::scope(|scope| -> QprofResult<SessionStats> {
            let (result_tx, result_rx) = mpsc::sync_channel(concurrent.len().max(1));
            let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
            let (source, log, sink_ref, specs, warmup) = (
                self.source,
                self.log,
                &sink,
                concurrent.as_slice(),
                self.options.warmup,
            );
            scope.spawn(move || {
                capture_concurrent(source, log, sink_ref, specs, warmup, cancel_rx, result_tx)
            });

            // Returning early drops `cancel_tx`, which stops the background capture.
            self.log.print("Begin query execution...");
            let mut runner = SessionRunner::new(
                self.client,
                self.log,
                &self.options.query,
                &self.options.database,
            );
            let stats = runner.run(self.options.mode)?;
            self.log.printf(format_args!(
                "Executed {} queries in {}",
                stats.executions,
                format_duration(stats.elapsed)
            ));
            if stats.is_short_cpu_run(self.options.cpu_enabled) {
                self.log.write_raw(&stats.short_run_notice());
            }

            self.enter(SessionState::Draining);
            for outcome in result_rx {
                if let CaptureOutcome::Skipped(s) = outcome? {
                    skipped.push(s);
                }
            }
            drop(cancel_tx);
            Ok(stats)
        })?;

        self.enter(SessionState::FinalCapture);
        self.log.print("Taking final profiles...");
        self.capture_phase(&sink, Phase::Final, &mut skipped)?;

        self.log.printf(format_args!(
            "All profiles gathered and saved at {}. Total query executions: {}.",
            archive_path.display(),
            stats.executions
        ));
        sink.append(
            INFO_ENTRY,
            self.log.contents().as_bytes(),
            ENTRY_MODE,
            unix_now(),
        )?;
        let sealed = sink.seal()?;
        sealed.persist(archive_path)?;
        self.enter(SessionState::Sealed);

        Ok(SessionReport {
            session_id: self.id,
            archive_path: archive_path.to_path_buf(),
            stats,
            entries: sealed.entries,
            skipped,
            short_run: stats.is_short_cpu_run(self.options.cpu_enabled),
        })
    }

    fn capture_phase(
        &self,
        sink: &ArchiveSink,
        phase: Phase,
        skipped: &mut Vec<SkippedProfile>,
    ) -> QprofResult<()> {
        for spec in self.specs {
            if let CaptureOutcome::Skipped(s) =
                capture_profile(self.source, self.log, sink, spec, phase)?
            {
                skipped.push(s);
            }
        }
        Ok(())
    }

    fn enter(&self, next: SessionState) {
        let prev = self.state.replace(next);
        tracing::debug!(session = %self.id, from = ?prev, to = ?next, "session state");
    }
}

fn capture_concurrent<S: ProfileSource>(
    source: &S,
    log: &RunLog,
    sink: &ArchiveSink,
    specs: &[&ProfileSpec],
    warmup: Duration,
    cancel: Receiver<()>,
    results: SyncSender<QprofResult<CaptureOutcome>>,
) {
    if specs.is_empty() {
        return;
    }
    log.printf(format_args!(
        "Waiting {} before taking concurrent profiles...",
        format_duration(warmup)
    ));
    match cancel.recv_timeout(warmup) {
        Err(RecvTimeoutError::Timeout) => {}
        _ => return,
    }
    for spec in specs {
        if matches!(cancel.try_recv(), Err(TryRecvError::Disconnected)) {
            tracing::debug!("concurrent capture cancelled");
            return;
        }
        let outcome = capture_profile(source, log, sink, spec, Phase::Concurrent);
        if results.send(outcome).is_err() {
            return;
        }
    }
}

fn capture_profile<S: ProfileSource>(
    source: &S,
    log: &RunLog,
    sink: &ArchiveSink,
    spec: &ProfileSpec,
    phase: Phase,
) -> QprofResult<CaptureOutcome> {
    if spec.is_cpu() {
        log.print("Capturing CPU profile. This will take 30s...");
    }
    let payload = match source.fetch(&spec.name, spec.debug)? {
        Fetched::Profile(bytes) => bytes,
        Fetched::Unsupported => {
            log.printf(format_args!(
                "Skipping profile {:?} (unavailable or profiling disabled)",
                spec.name
            ));
            return Ok(CaptureOutcome::Skipped(SkippedProfile {
                phase,
                kind: spec.name.clone(),
            }));
        }
    };

    let captured = CapturedProfile {
        name: spec.name.clone(),
        entry: phase.entry_name(spec),
        phase,
        payload,
    };
    sink.append(&captured.entry, &captured.payload, ENTRY_MODE, unix_now())?;
    log.printf(format_args!("{:?} profile captured...", captured.name));
    tracing::debug!(kind = %captured.name, phase = ?captured.phase, "profile stored");
    Ok(CaptureOutcome::Stored {
        entry: captured.entry,
    })
}

fn unix_now() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}
