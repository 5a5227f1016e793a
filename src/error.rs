//! Crate-wide error types.

use thiserror::Error;

pub type QprofResult<T> = Result<T, QprofError>;

#[derive(Debug, Error)]
pub enum QprofError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Transport failure talking to the target (connect, TLS, read).
    #[error("network error: {0}")]
    Network(String),

    /// The introspection endpoint answered with something other than 200 or 404.
    #[error("unexpected error {status} returned from server: {message}")]
    Status { status: u16, message: String },

    #[error("query error: {0}")]
    Workload(String),

    /// Sink, encoder or output file failure. The archive is never salvaged.
    #[error("archive error: {0}")]
    Archive(#[source] std::io::Error),
}

impl From<ureq::Error> for QprofError {
    fn from(value: ureq::Error) -> Self {
        match value {
            ureq::Error::Status(status, response) => Self::Status {
                status,
                message: response
                    .header("X-Influxdb-Error")
                    .unwrap_or_default()
                    .to_string(),
            },
            ureq::Error::Transport(transport) => Self::Network(transport.to_string()),
        }
    }
}

impl QprofError {
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(std::io::Error::other(msg.into()))
    }
}
