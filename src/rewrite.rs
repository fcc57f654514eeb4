//! Test command rewriting
//!
//! Adds the flags needed for machine-readable output and coverage to a
//! `go test` or `pytest` invocation, without duplicating anything the user
//! already passed. Arguments are only ever inserted, never removed or
//! reordered.

use crate::error::{Error, Result};
use crate::record::OutputFormat;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A test runner whose command line we know how to rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    GoTest,
    Pytest,
}

impl Framework {
    /// Map the executable name (`args[0]`) to a framework.
    pub fn from_program(program: &str) -> Result<Self> {
        match program {
            "go" => Ok(Framework::GoTest),
            "pytest" => Ok(Framework::Pytest),
            other => Err(Error::UnsupportedFramework(other.to_string())),
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Framework::GoTest => "go",
            Framework::Pytest => "pytest",
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            Framework::GoTest => OutputFormat::GoTestJson,
            Framework::Pytest => OutputFormat::PytestReportLog,
        }
    }
}

/// Files a test run leaves behind for us to upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactKind {
    CoverageProfile,
    ReportLog,
}

impl ArtifactKind {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::CoverageProfile => "coverage",
            ArtifactKind::ReportLog => "report log",
        }
    }
}

/// Where each artifact of a rewritten command will be written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    paths: BTreeMap<ArtifactKind, PathBuf>,
}

impl ArtifactPaths {
    pub fn insert(&mut self, kind: ArtifactKind, path: impl Into<PathBuf>) {
        self.paths.insert(kind, path.into());
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &Path)> {
        self.paths.iter().map(|(kind, path)| (*kind, path.as_path()))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Rewrite `args` for `framework`.
///
/// Returns the augmented argument vector and the artifact files the test
/// run will produce. Temporary files created here are never deleted by us.
pub fn rewrite(args: Vec<String>, framework: Framework) -> Result<(Vec<String>, ArtifactPaths)> {
    match args.first() {
        None => return Err(Error::EmptyCommand),
        Some(program) if program != framework.program() => {
            return Err(Error::UnsupportedFramework(program.clone()));
        }
        Some(_) => {}
    }

    match framework {
        Framework::GoTest => rewrite_go_test(args),
        Framework::Pytest => rewrite_pytest(args),
    }
}

// ============================================================================
// go test
// ============================================================================

/// Flags go test accepts after this marker belong to the test binary.
const GO_TEST_BINARY_ARGS: [&str; 2] = ["-args", "--args"];

#[derive(Debug, Default)]
struct GoFlags {
    json: bool,
    cover_profile: bool,
    cover_profile_path: Option<String>,
}

fn scan_go_flags(args: &[String]) -> GoFlags {
    let mut found = GoFlags::default();

    for (idx, arg) in args.iter().enumerate().skip(2) {
        if GO_TEST_BINARY_ARGS.contains(&arg.as_str()) {
            break;
        }
        let Some(flag) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            continue;
        };
        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (flag, None),
        };

        match name {
            "json" => found.json = true,
            "coverprofile" => {
                found.cover_profile = true;
                found.cover_profile_path = value
                    .map(str::to_string)
                    .or_else(|| args.get(idx + 1).cloned());
            }
            _ => {}
        }
    }

    found
}

fn rewrite_go_test(mut args: Vec<String>) -> Result<(Vec<String>, ArtifactPaths)> {
    match args.get(1) {
        Some(sub) if sub == "test" => {}
        other => {
            return Err(Error::WrongSubcommand {
                program: "go",
                expected: "test",
                found: other.cloned().unwrap_or_default(),
            });
        }
    }

    let flags = scan_go_flags(&args);
    let mut artifacts = ArtifactPaths::default();

    if !flags.json {
        args.insert(2, "-json".to_string());
    }

    if flags.cover_profile {
        if let Some(path) = flags.cover_profile_path {
            artifacts.insert(ArtifactKind::CoverageProfile, path);
        }
    } else {
        let path = create_artifact_file(ArtifactKind::CoverageProfile, "cover", "")?;
        args.insert(2, format!("-coverprofile={}", path.display()));
        artifacts.insert(ArtifactKind::CoverageProfile, path);
    }

    Ok((args, artifacts))
}

// ============================================================================
// pytest
// ============================================================================

fn rewrite_pytest(mut args: Vec<String>) -> Result<(Vec<String>, ArtifactPaths)> {
    let mut report_log: Option<String> = None;

    for (idx, arg) in args.iter().enumerate().skip(1) {
        if let Some(path) = arg.strip_prefix("--report-log=") {
            report_log = Some(path.to_string());
        } else if arg == "--report-log" {
            let path = args
                .get(idx + 1)
                .ok_or_else(|| Error::MissingFlagValue("--report-log".to_string()))?;
            report_log = Some(path.clone());
        } else if arg.starts_with("--cov-report") {
            return Err(Error::ConflictingCoverageFlag("--cov-report".to_string()));
        } else if arg.starts_with("--cov") && !arg.starts_with("--cov-") {
            let name = arg.split('=').next().unwrap_or(arg);
            return Err(Error::ConflictingCoverageFlag(name.to_string()));
        }
    }

    let mut artifacts = ArtifactPaths::default();

    match report_log {
        Some(path) => artifacts.insert(ArtifactKind::ReportLog, path),
        None => {
            let path = create_artifact_file(ArtifactKind::ReportLog, "reportlog", "")?;
            args.insert(1, format!("--report-log={}", path.display()));
            artifacts.insert(ArtifactKind::ReportLog, path);
        }
    }

    // Coverage is always ours for pytest: the JSON report must be parseable.
    let cover = create_artifact_file(ArtifactKind::CoverageProfile, "cover", ".json")?;
    args.insert(1, "--cov".to_string());
    args.insert(1, "--cov-report".to_string());
    args.insert(2, format!("json:{}", cover.display()));
    artifacts.insert(ArtifactKind::CoverageProfile, cover);

    Ok((args, artifacts))
}

fn create_artifact_file(kind: ArtifactKind, prefix: &str, suffix: &str) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .map_err(|source| Error::TempFile {
            kind: kind.label(),
            source,
        })?;
    let (_file, path) = file.keep().map_err(|e| Error::TempFile {
        kind: kind.label(),
        source: e.error,
    })?;
    Ok(path)
}
