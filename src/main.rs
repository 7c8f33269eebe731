use anyhow::{Context, Result};
use clap::Parser;
use mdb_flash::{Args, FlashOutcome, Session, console_mirror, flash, process, reader};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<FlashOutcome> {
    let config = args.into_config()?;

    let (mut mdb, streams) = process::spawn(&config.mdb_path, config.transport)
        .context("Failed to start mdb")?;

    if let Some(stderr) = streams.diagnostics {
        reader::spawn_diagnostics(stderr);
    }

    let mut session = Session::attach(streams.input, streams.output)
        .with_prompt_timeout(config.prompt_timeout);
    if config.mirror {
        session = session.with_mirror(console_mirror());
    }

    let result = flash::run(&mut session, &config.plan).await;
    // Closing stdin lets an mdb that ignored `quit` see EOF.
    drop(session);

    match result {
        Ok(outcome) => {
            mdb.wait()?;
            Ok(outcome)
        }
        Err(err) => {
            mdb.kill();
            Err(err).context("mdb session failed")
        }
    }
}
