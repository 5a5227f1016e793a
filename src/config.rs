//! `qprof.toml` config loading and run settings resolution.

use clap::Args;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{QprofDuration, QprofError, QprofResult, WorkloadMode};

pub const DEFAULT_HOST: &str = "http://localhost:8086";
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// scheme://host:port of the server, cluster or load balancer.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub user: Option<String>,

    /// Output directory for `profiles.tar.gz`.
    #[serde(default = "default_out")]
    pub out: PathBuf,

    /// Include the CPU profile (takes at least 30s per capture).
    #[serde(default = "default_cpu")]
    pub cpu: bool,

    /// Delay before the mid-run profiles are taken.
    #[serde(default = "default_warmup")]
    pub warmup: QprofDuration,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_out() -> PathBuf {
    PathBuf::from(".")
}

fn default_cpu() -> bool {
    true
}

fn default_warmup() -> QprofDuration {
    QprofDuration(DEFAULT_WARMUP)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: None,
            out: default_out(),
            cpu: default_cpu(),
            warmup: default_warmup(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

/// Command-line options for one profiling session. Unset values fall back to [`Config`].
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// scheme://host:port of server/cluster/load balancer (default: http://localhost:8086)
    #[arg(long)]
    pub host: Option<String>,
    /// Username if using authentication
    #[arg(long)]
    pub user: Option<String>,
    /// Password if using authentication
    #[arg(long)]
    pub pass: Option<String>,
    /// Database to query
    #[arg(long)]
    pub db: Option<String>,
    /// Repeat query n times (default 1 if -t not specified)
    #[arg(short = 'n', long = "repeat")]
    pub repeat: Option<u64>,
    /// Repeat query for this period of time (overrides -n)
    #[arg(short = 't', long = "duration")]
    pub duration: Option<QprofDuration>,
    /// Output directory
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Include CPU profile (will take at least 30s)
    #[arg(long, action = clap::ArgAction::Set)]
    pub cpu: Option<bool>,
    /// Wait this long after queries begin before taking concurrent profiles
    #[arg(long)]
    pub warmup: Option<QprofDuration>,
    /// Query to execute, quoted as a single argument
    #[arg(value_name = "QUERY")]
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub database: String,
    pub query: String,
    pub mode: WorkloadMode,
    /// `-n` as given (1 when unset), kept for the flag dump even when `-t` wins.
    pub repeat: u64,
    /// `-t` as given, zero when unset.
    pub duration: Duration,
    pub out: PathBuf,
    pub cpu: bool,
    pub warmup: Duration,
}

impl Settings {
    pub fn resolve(config: &Config, args: &RunArgs) -> QprofResult<Self> {
        let host = args.host.clone().unwrap_or_else(|| config.host.clone());
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(QprofError::Config(format!(
                "host {host:?} must start with http:// or https://"
            )));
        }

        if args.query.trim().is_empty() {
            return Err(QprofError::InvalidArgument(
                "please provide query as positional argument".to_string(),
            ));
        }

        let database = args.db.clone().unwrap_or_default();
        if database.is_empty() {
            return Err(QprofError::InvalidArgument(
                "database to query is required (--db)".to_string(),
            ));
        }

        let repeat = args.repeat.unwrap_or(1);
        let mode = match (args.duration, args.repeat) {
            (Some(d), _) if d.0.is_zero() => {
                return Err(QprofError::InvalidArgument(
                    "-t must be greater than zero".to_string(),
                ));
            }
            (Some(d), _) => WorkloadMode::Duration(d.0),
            (None, Some(0)) => {
                return Err(QprofError::InvalidArgument(
                    "-n must be at least 1".to_string(),
                ));
            }
            (None, _) => WorkloadMode::Repeat(repeat),
        };

        Ok(Self {
            host,
            user: args.user.clone().or_else(|| config.user.clone()),
            pass: args.pass.clone(),
            database,
            query: args.query.clone(),
            mode,
            repeat,
            duration: args.duration.map(|d| d.0).unwrap_or_default(),
            out: args.out.clone().unwrap_or_else(|| config.out.clone()),
            cpu: args.cpu.unwrap_or(config.cpu),
            warmup: args.warmup.map(|w| w.0).unwrap_or(config.warmup.0),
        })
    }

    /// The `Flags:` block that opens `info.txt`. The password is never written out.
    pub fn flag_dump(&self) -> String {
        let rows = [
            ("cpu", self.cpu.to_string()),
            ("db", self.database.clone()),
            ("host", self.host.clone()),
            ("n", self.repeat.to_string()),
            ("out", self.out.display().to_string()),
            (
                "pass",
                if self.pass.as_deref().is_some_and(|p| !p.is_empty()) {
                    "<redacted>".to_string()
                } else {
                    String::new()
                },
            ),
            ("t", QprofDuration(self.duration).to_string()),
            ("user", self.user.clone().unwrap_or_default()),
            ("warmup", QprofDuration(self.warmup).to_string()),
        ];
        let mut out = String::from("Flags:\n");
        for (name, value) in rows {
            out.push_str(&format!("-{name} {value}\n"));
        }
        out.push('\n');
        out
    }
}
