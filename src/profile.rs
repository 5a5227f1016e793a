//! Profile kinds and the introspection endpoint fetcher.

use serde::{Deserialize, Serialize};

use std::io::Read as _;
use std::time::Duration;

use crate::{QprofError, QprofResult};

/// Name of the CPU profile kind. Always first in the spec list when present.
pub const CPU_PROFILE: &str = "profile";

const PPROF_PATH: &str = "/debug/pprof/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    /// Kind identifier used in the request path.
    pub name: String,
    /// Archive entry name before the phase prefix is applied.
    pub filename: String,
    /// 0 requests the binary encoding, 1 the human-readable one.
    pub debug: u8,
    /// Also captured by the mid-run background pass.
    pub concurrent: bool,
}

impl ProfileSpec {
    fn new(name: &str, filename: &str, debug: u8, concurrent: bool) -> Self {
        Self {
            name: name.to_string(),
            filename: filename.to_string(),
            debug,
            concurrent,
        }
    }

    pub fn is_cpu(&self) -> bool {
        self.name == CPU_PROFILE
    }
}

/// The fixed list of kinds captured in every phase, in archive order.
pub fn profile_specs(include_cpu: bool) -> Vec<ProfileSpec> {
    let mut specs = vec![
        ProfileSpec::new(CPU_PROFILE, "cpu.pb.gz", 0, true),
        ProfileSpec::new("block", "block.txt", 1, false),
        ProfileSpec::new("goroutine", "goroutine.txt", 1, true),
        ProfileSpec::new("heap", "heap.pb.gz", 1, false),
        ProfileSpec::new("mutex", "mutex.txt", 1, false),
    ];
    if !include_cpu {
        specs.remove(0);
    }
    specs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Base,
    Concurrent,
    Final,
}

impl Phase {
    pub fn entry_name(self, spec: &ProfileSpec) -> String {
        match self {
            Self::Base => format!("base-{}", spec.filename),
            Self::Concurrent => format!("concurrent-{}", spec.filename),
            Self::Final => spec.filename.clone(),
        }
    }
}

/// One profile payload on its way into the archive.
#[derive(Debug, Clone)]
pub struct CapturedProfile {
    pub name: String,
    pub entry: String,
    pub phase: Phase,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Profile(Vec<u8>),
    /// The target answered 404: the kind is unavailable or profiling is disabled.
    Unsupported,
}

/// Anything that can hand out raw profile bytes for a kind.
pub trait ProfileSource: Sync {
    fn fetch(&self, name: &str, debug: u8) -> QprofResult<Fetched>;
}

pub fn profile_url(base: &str, name: &str, debug: u8) -> String {
    let mut url = format!("{}{PPROF_PATH}{name}", base.trim_end_matches('/'));
    if debug > 0 {
        url.push_str(&format!("?debug={debug}"));
    }
    url
}

/// Blocking single-attempt fetcher against `<base>/debug/pprof/<kind>`.
#[derive(Debug, Clone)]
pub struct HttpProfileFetcher {
    agent: ureq::Agent,
    base: String,
}

impl HttpProfileFetcher {
    pub fn new(base: impl Into<String>) -> Self {
        // CPU profiles hold the connection for at least 30s.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Self::with_agent(agent, base)
    }

    pub fn with_agent(agent: ureq::Agent, base: impl Into<String>) -> Self {
        Self {
            agent,
            base: base.into(),
        }
    }
}

impl ProfileSource for HttpProfileFetcher {
    fn fetch(&self, name: &str, debug: u8) -> QprofResult<Fetched> {
        let url = profile_url(&self.base, name, debug);
        tracing::debug!(%url, "fetching profile");
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(Fetched::Unsupported),
            Err(err) => return Err(err.into()),
        };
        if response.status() != 200 {
            return Err(QprofError::Status {
                status: response.status(),
                message: response
                    .header("X-Influxdb-Error")
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| QprofError::Network(format!("reading {name} profile: {e}")))?;
        tracing::debug!(kind = name, bytes = body.len(), "profile fetched");
        Ok(Fetched::Profile(body))
    }
}
