use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "impactmap")]
#[command(about = "Function-level test impact analysis for Python projects", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an impact request from the changes between two revisions
    Analyze {
        /// Configuration file (defaults to the nearest .impactmap.toml)
        #[arg(short, long, env = "IMPACTMAP_CONFIG")]
        config: Option<PathBuf>,

        /// Base revision to diff from
        #[arg(long)]
        base: Option<String>,

        /// Target revision to diff to (empty string for the work tree)
        #[arg(long)]
        target: Option<String>,

        /// Time budget in seconds for the selected tests
        #[arg(long = "time-budget")]
        time_budget: Option<f64>,

        /// Maximum number of functions used to seed selection
        #[arg(long = "max-seed-size")]
        max_seed_size: Option<usize>,

        /// Where to write the impact request
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recompute every stage and leave the cache untouched
        #[arg(long = "no-cache")]
        no_cache: bool,

        /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
        #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
        verbosity: u8,
    },

    /// Run the tests to record the coverage trace and duration table
    RunTests {
        /// Configuration file (defaults to the nearest .impactmap.toml)
        #[arg(short, long, env = "IMPACTMAP_CONFIG")]
        config: Option<PathBuf>,

        /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
        #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
        verbosity: u8,
    },

    /// Remove every cached stage result
    ClearCache {
        /// Configuration file (defaults to the nearest .impactmap.toml)
        #[arg(short, long, env = "IMPACTMAP_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Write a default .impactmap.toml in the current directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

/// Initialise logging from the `-v` count unless `RUST_LOG` is set.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    // A second initialisation (tests driving several commands) is harmless.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_overrides_parse() {
        let cli = Cli::parse_from([
            "impactmap",
            "analyze",
            "--base",
            "main",
            "--target",
            "",
            "--time-budget",
            "90",
            "--no-cache",
            "-vv",
        ]);
        match cli.command {
            Commands::Analyze {
                base,
                target,
                time_budget,
                no_cache,
                verbosity,
                ..
            } => {
                assert_eq!(base.as_deref(), Some("main"));
                assert_eq!(target.as_deref(), Some(""));
                assert_eq!(time_budget, Some(90.0));
                assert!(no_cache);
                assert_eq!(verbosity, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_init_force_flag() {
        let cli = Cli::parse_from(["impactmap", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }
}
