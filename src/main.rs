mod cli_logger;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use cli_logger::CliLogger;
use qprof::{
    Config, HttpProfileFetcher, ProfileSession, RunArgs, RunLog, SessionOptions, SessionReport,
    Settings, connect, prepare_output_dir, profile_specs,
};

const EXAMPLE: &str = "Example usage: $ qprof --db mydb -t 5m \"SELECT * FROM cpu WHERE tag1 = 'foo'\"";

/// Profile a server while a query runs against it.
#[derive(Debug, Parser)]
#[command(name = "qprof", version, after_help = EXAMPLE)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    /// Optional config file supplying defaults
    #[arg(long, default_value = "qprof.toml")]
    config: PathBuf,

    /// Print the session summary as JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let logger = CliLogger::new(cli.json, cli.no_color);
    match run(&cli) {
        Ok(report) => match logger.print_session_report(&report) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                logger.print_error(&err.to_string());
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<SessionReport> {
    let config = Config::load_optional(&cli.config);
    let settings = Settings::resolve(&config, &cli.run)?;

    let log = RunLog::stderr();
    log.record(&settings.flag_dump());

    let specs = profile_specs(settings.cpu);
    let archive_path = prepare_output_dir(&settings.out)?;
    let client = connect(
        &settings.host,
        settings.user.clone(),
        settings.pass.clone(),
        &log,
    )?;
    let fetcher = HttpProfileFetcher::new(settings.host.clone());

    let session = ProfileSession::new(
        &fetcher,
        &client,
        &log,
        &specs,
        SessionOptions::from(&settings),
    );
    tracing::debug!(session = %session.id(), path = %archive_path.display(), "starting session");
    Ok(session.run(&archive_path)?)
}
