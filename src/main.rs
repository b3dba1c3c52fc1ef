use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use callflow::cli::output::format_graph;
use callflow::cli::run::{execute, write_diagnostics};
use callflow::cli::{Cli, LogLevel};
use callflow::config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = config::load(&cwd, cli.config.as_deref())?;
    let options = cli.run_options(&config);
    init_tracing(cli.effective_log_level(options.quiet));

    let verbose = cli.verbose;
    let quiet = options.quiet;
    let report = execute(&cli, &config, options)?;

    write_diagnostics(&mut io::stderr().lock(), &report.diagnostics, verbose, quiet)?;
    println!("{}", format_graph(&report.graph, &cli.format));
    Ok(())
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
