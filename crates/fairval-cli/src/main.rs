mod batch;
mod cli;
mod error;
mod logging;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;
use crate::output::RenderOptions;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let config = batch::resolve_config(&cli)?;

    let report = batch::run(&cli, &config).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    output::render(
        &mut out,
        &report,
        &config,
        RenderOptions {
            format: cli.format,
            pretty: cli.pretty,
            color: cli.color,
        },
    )?;

    Ok(ExitCode::SUCCESS)
}
