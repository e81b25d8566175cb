use anyhow::Result;
use clap::Parser;
use colored::*;
use impactmap::cli::{init_logging, Cli, Commands};
use impactmap::commands::{self, AnalyzeConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Analyze {
            config,
            base,
            target,
            time_budget,
            max_seed_size,
            output,
            no_cache,
            verbosity,
        } => {
            init_logging(verbosity);
            commands::handle_analyze(AnalyzeConfig {
                config,
                base,
                target,
                time_budget,
                max_seed_size,
                output,
                no_cache,
            })?;
        }
        Commands::RunTests { config, verbosity } => {
            init_logging(verbosity);
            commands::run_tests(config.as_deref())?;
        }
        Commands::ClearCache { config } => {
            init_logging(0);
            commands::clear_cache(config.as_deref())?;
        }
        Commands::Init { force } => {
            init_logging(0);
            commands::init_config(force)?;
        }
    }
    Ok(())
}
