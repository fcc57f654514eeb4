use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecomet::collect::{self, Collected};
use codecomet::config::{ProcessEnv, RunOptions, Settings};
use codecomet::ingest::HttpIngestClient;
use codecomet::{logging, version};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Exit status for invalid invocations
const USAGE_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "codecomet",
    about = "Run your tests and send the results to CodeComet",
    long_about = "Run your tests and send the results to CodeComet.\n\n\
        Pass the test command after `--`, for example:\n\n    \
        codecomet -s unit -- go test ./...\n    \
        codecomet -- pytest tests/",
    version
)]
struct Cli {
    /// Name of the test suite (defaults to the working directory)
    #[arg(short, long, global = true)]
    suite: Option<String>,

    /// Identifier for this run (defaults to the CI build id)
    #[arg(short = 'r', long = "runid", global = true)]
    run_id: Option<String>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Test command to run
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    test_command: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload an existing JUnit XML report
    Junit {
        /// Path to the JUnit XML file
        file: PathBuf,

        /// Coverage file to upload with the report
        #[arg(short, long)]
        coverage: Option<PathBuf>,
    },
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let options = RunOptions {
        suite: cli.suite,
        run_id: cli.run_id,
    };

    match cli.command {
        Some(Commands::Version) => {
            println!("{}", version::version_line());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Junit { file, coverage }) => run_junit(file, coverage, options).await,
        None => run_wrapped(cli.test_command, options).await,
    }
}

async fn run_wrapped(command: Vec<String>, options: RunOptions) -> Result<ExitCode> {
    let settings = Settings::from_env(&ProcessEnv);
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;

    let collected = tokio::task::spawn_blocking(move || {
        collect::collect_run(command, &options, &ProcessEnv, &cwd)
    })
    .await
    .context("Test collection panicked")?;

    let record = match collected {
        Ok(Collected::Ready(record)) => record,
        Ok(Collected::Suppressed) => {
            info!("No tests were run for this collection, not uploading");
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => return Ok(failure(&err)),
    };

    match HttpIngestClient::new(&settings) {
        Ok(client) => {
            collect::submit_run(&client, &record).await;
        }
        Err(err) => error!("Unable to upload results: {:#}", err),
    }

    if record.succeeded {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_junit(
    file: PathBuf,
    coverage: Option<PathBuf>,
    options: RunOptions,
) -> Result<ExitCode> {
    let settings = Settings::from_env(&ProcessEnv);
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;

    let collected = tokio::task::spawn_blocking(move || {
        collect::collect_junit(&file, coverage.as_deref(), &options, &ProcessEnv, &cwd)
    })
    .await
    .context("Report collection panicked")?;

    let record = match collected {
        Ok(record) => record,
        Err(err) => return Ok(failure(&err)),
    };

    let client = HttpIngestClient::new(&settings)?;
    if collect::submit_report(&client, &record).await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn failure(err: &codecomet::Error) -> ExitCode {
    error!("{}", err);
    if err.is_usage() {
        ExitCode::from(USAGE_EXIT_CODE)
    } else {
        ExitCode::FAILURE
    }
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
    fn test_wrapped_command_after_separator() {
        let cli = Cli::try_parse_from([
            "codecomet", "-s", "unit", "-r", "42", "--", "go", "test", "-v", "./...",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.suite.as_deref(), Some("unit"));
        assert_eq!(cli.run_id.as_deref(), Some("42"));
        assert_eq!(cli.test_command, ["go", "test", "-v", "./..."]);
    }

    #[test]
    fn test_wrapped_command_without_separator() {
        let cli = Cli::try_parse_from(["codecomet", "pytest", "-x", "tests/"]).unwrap();
        assert_eq!(cli.test_command, ["pytest", "-x", "tests/"]);
    }

    #[test]
    fn test_junit_subcommand() {
        let cli = Cli::try_parse_from([
            "codecomet", "-s", "integration", "junit", "report.xml", "-c", "cover.out",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Junit { file, coverage }) => {
                assert_eq!(file, PathBuf::from("report.xml"));
                assert_eq!(coverage, Some(PathBuf::from("cover.out")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.suite.as_deref(), Some("integration"));
    }

    #[test]
    fn test_version_subcommand() {
        let cli = Cli::try_parse_from(["codecomet", "version"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Version)));
    }
}
