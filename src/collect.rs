//! Assembling execution records
//!
//! Runs the whole pipeline for one invocation: rewrite the command, resolve
//! provenance, run the tests, decide whether anything ran, and gather the
//! artifacts into a record for upload.

use crate::classify;
use crate::config::{EnvSource, RunConfig, RunOptions};
use crate::error::{Error, Result};
use crate::ingest::Ingest;
use crate::provenance;
use crate::record::{ExecutionRecord, OutputFormat, SuiteReportRecord};
use crate::rewrite::{self, ArtifactKind, ArtifactPaths, Framework};
use crate::runner::{self, ExecutionResult};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Result of collecting one wrapped run
#[derive(Debug)]
pub enum Collected {
    /// The command ran but executed no tests; nothing to upload.
    Suppressed,
    Ready(ExecutionRecord),
}

/// Run the test command in `args` and assemble its record.
pub fn collect_run(
    args: Vec<String>,
    options: &RunOptions,
    env: &dyn EnvSource,
    cwd: &Path,
) -> Result<Collected> {
    collect_run_with(args, options, env, cwd, runner::run)
}

/// Like [`collect_run`], with the process runner supplied by the caller.
pub fn collect_run_with<F>(
    args: Vec<String>,
    options: &RunOptions,
    env: &dyn EnvSource,
    cwd: &Path,
    run: F,
) -> Result<Collected>
where
    F: FnOnce(&[String]) -> Result<ExecutionResult>,
{
    let program = args.first().ok_or(Error::EmptyCommand)?;
    let framework = Framework::from_program(program)?;
    let (args, artifacts) = rewrite::rewrite(args, framework)?;

    let provenance = provenance::resolve(env, cwd);
    let config = RunConfig::resolve(options, cwd, &provenance);
    info!(
        suite = %config.suite_name,
        run_id = %config.run_id,
        ci = %provenance.system,
        "collecting test run"
    );

    info!("Running command: {}", args.join(" "));
    let result = run(&args)?;
    if !result.succeeded {
        match result.exit_code {
            Some(code) => info!("Command finished with exit code {}", code),
            None => info!("Command was terminated by a signal"),
        }
    }

    let output_format = framework.output_format();
    let output = match framework {
        Framework::GoTest => {
            if classify::no_tests_ran(&result.stdout) {
                return Ok(Collected::Suppressed);
            }
            result.stdout
        }
        Framework::Pytest => read_artifact(&artifacts, ArtifactKind::ReportLog, cwd),
    };
    let coverage = read_artifact(&artifacts, ArtifactKind::CoverageProfile, cwd);

    Ok(Collected::Ready(ExecutionRecord {
        suite_name: config.suite_name,
        suite_run_id: config.run_id,
        provenance,
        succeeded: result.succeeded,
        output,
        output_format,
        coverage,
    }))
}

/// Build a record for an existing JUnit XML report.
///
/// The report itself must be readable; the coverage file is optional.
pub fn collect_junit(
    report: &Path,
    coverage: Option<&Path>,
    options: &RunOptions,
    env: &dyn EnvSource,
    cwd: &Path,
) -> Result<SuiteReportRecord> {
    let report_path = cwd.join(report);
    let output = fs::read(&report_path).map_err(|source| Error::ReportFile {
        path: report_path.clone(),
        source,
    })?;

    let coverage = match coverage {
        Some(path) => read_file_or_empty(&cwd.join(path), "coverage"),
        None => {
            warn!("No coverage file given, skipping coverage");
            Vec::new()
        }
    };

    let provenance = provenance::resolve(env, cwd);
    let config = RunConfig::resolve(options, cwd, &provenance);
    info!(suite = %config.suite_name, run_id = %config.run_id, "collecting report");

    Ok(SuiteReportRecord {
        suite_name: config.suite_name,
        build_tag: config.run_id,
        provenance,
        output,
        output_format: OutputFormat::JunitXml,
        coverage,
    })
}

/// Upload a run, reporting but otherwise ignoring failures.
///
/// Returns whether the upload succeeded.
pub async fn submit_run<C: Ingest>(client: &C, record: &ExecutionRecord) -> bool {
    match client.ingest_collection_run(record).await {
        Ok(resp) => {
            info!("CodeComet returned {}", resp);
            true
        }
        Err(err) => {
            error!("Call to CodeComet failed: {:#}", err);
            false
        }
    }
}

/// Upload a report, reporting but otherwise ignoring failures.
pub async fn submit_report<C: Ingest>(client: &C, record: &SuiteReportRecord) -> bool {
    match client.ingest_suite_run(record).await {
        Ok(resp) => {
            info!("CodeComet returned {}", resp);
            true
        }
        Err(err) => {
            error!("Call to CodeComet failed: {:#}", err);
            false
        }
    }
}

fn read_artifact(artifacts: &ArtifactPaths, kind: ArtifactKind, cwd: &Path) -> Vec<u8> {
    match artifacts.get(kind) {
        Some(path) => read_file_or_empty(&cwd.join(path), kind.label()),
        None => {
            warn!("No {} file was recorded for this run", kind.label());
            Vec::new()
        }
    }
}

fn read_file_or_empty(path: &Path, label: &str) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|err| {
        warn!("Unable to read {} file {}: {}", label, path.display(), err);
        Vec::new()
    })
}
