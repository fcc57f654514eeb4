//! Records handed to the ingestion service

use crate::provenance::Provenance;

/// Format tag telling the server how to parse `output`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    GoTestJson,
    PytestReportLog,
    JunitXml,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::GoTestJson => "gotest-json",
            OutputFormat::PytestReportLog => "pytest-reportlog",
            OutputFormat::JunitXml => "junit-xml",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wrapped test run, ready for upload
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub suite_name: String,
    pub suite_run_id: String,
    pub provenance: Provenance,
    pub succeeded: bool,
    pub output: Vec<u8>,
    pub output_format: OutputFormat,
    pub coverage: Vec<u8>,
}

impl ExecutionRecord {
    pub fn status(&self) -> &'static str {
        if self.succeeded {
            "pass"
        } else {
            "fail"
        }
    }
}

/// A pre-existing report file (JUnit XML) submitted without running anything.
///
/// Pass/fail is left to the server, which reads it from the report.
#[derive(Debug, Clone)]
pub struct SuiteReportRecord {
    pub suite_name: String,
    pub build_tag: String,
    pub provenance: Provenance,
    pub output: Vec<u8>,
    pub output_format: OutputFormat,
    pub coverage: Vec<u8>,
}
