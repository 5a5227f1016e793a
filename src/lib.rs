//! qprof: capture runtime profiles from a server while a query workload runs against it, and
//! bundle them with the run log into one `profiles.tar.gz`.

mod archive;
mod client;
mod config;
mod duration;
mod error;
mod fsutil;
mod profile;
mod runlog;
mod runner;
mod session;

#[cfg(test)]
mod testutil;

pub use archive::*;
pub use client::*;
pub use config::*;
pub use duration::*;
pub use error::*;
pub use fsutil::*;
pub use profile::*;
pub use runlog::*;
pub use runner::*;
pub use session::*;
