//! Workload loop: one query, repeated a fixed number of times or for a duration.

use serde::Serialize;

use std::time::{Duration, Instant};

use crate::{QprofResult, QueryClient, RunLog, format_duration};

/// Runs shorter than this under-sample the CPU profile.
pub const MIN_CPU_RUN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadMode {
    Repeat(u64),
    /// Keep starting executions until this much time has passed. The execution in flight when
    /// the deadline passes is allowed to finish.
    Duration(Duration),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub executions: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SessionStats {
    pub fn is_short_cpu_run(&self, cpu_enabled: bool) -> bool {
        cpu_enabled && self.elapsed < MIN_CPU_RUN
    }

    pub fn short_run_notice(&self) -> String {
        format!(
            "\n***** NOTICE - QUERY EXECUTION {} *****\n\
             This tool works most effectively if queries are executed for at least one minute\n\
             when capturing CPU profiles. Consider increasing `-n` or setting `-t 1m`.\n\n",
            format_duration(self.elapsed)
        )
    }
}

pub struct SessionRunner<'a, C: QueryClient> {
    client: &'a C,
    log: &'a RunLog,
    query: &'a str,
    database: &'a str,
    executions: u64,
}

impl<'a, C: QueryClient> SessionRunner<'a, C> {
    pub fn new(client: &'a C, log: &'a RunLog, query: &'a str, database: &'a str) -> Self {
        Self {
            client,
            log,
            query,
            database,
            executions: 0,
        }
    }

    /// Drives the workload. The first failing execution aborts the run.
    pub fn run(&mut self, mode: WorkloadMode) -> QprofResult<SessionStats> {
        let started = Instant::now();
        match mode {
            WorkloadMode::Repeat(n) => {
                for _ in 0..n {
                    self.execute()?;
                }
            }
            WorkloadMode::Duration(limit) => {
                while started.elapsed() < limit {
                    self.execute()?;
                }
                self.log.printf(format_args!(
                    "Queries executed for at least {}",
                    format_duration(limit)
                ));
            }
        }
        let elapsed = started.elapsed();
        Ok(SessionStats {
            executions: self.executions,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            elapsed,
        })
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    fn execute(&mut self) -> QprofResult<()> {
        self.executions = self.executions.saturating_add(1);
        let started = Instant::now();
        let result = self.client.query(self.query, self.database);
        self.log.printf(format_args!(
            "Query {:?} took {} to execute.",
            self.query,
            format_duration(started.elapsed())
        ));
        result.map(|_| ())
    }
}
