//! Upload of finished runs to the CodeComet ingestion service
//!
//! The service speaks the Connect protocol; we use its JSON encoding, which
//! is a plain POST of `{"run": {...}}` to `<base>/<service>/<method>`.
//! Byte fields are base64 encoded as protobuf JSON requires.

use crate::config::Settings;
use crate::record::{ExecutionRecord, SuiteReportRecord};
use crate::version::CURRENT_VERSION;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "traceconsumer.v1.TraceService";
const INGEST_COLLECTION_RUN: &str = "IngestTestCollectionRun";
const INGEST_SUITE_RUN: &str = "IngestTestSuiteRun";

const API_TIMEOUT_SECS: u64 = 60;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Receiver of finished runs
#[allow(async_fn_in_trait)]
pub trait Ingest {
    /// Upload a wrapped test run; returns the service's response.
    async fn ingest_collection_run(&self, record: &ExecutionRecord) -> Result<serde_json::Value>;

    /// Upload a pre-existing report file.
    async fn ingest_suite_run(&self, record: &SuiteReportRecord) -> Result<serde_json::Value>;
}

#[derive(Serialize)]
struct IngestRequest<T> {
    run: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionRunPayload<'a> {
    suite_name: &'a str,
    suite_run_id: &'a str,
    ci_system: &'static str,
    repository: String,
    branch: &'a str,
    status: &'static str,
    commit_hash: &'a str,
    output: String,
    output_format: &'static str,
    coverage_info: String,
}

impl<'a> From<&'a ExecutionRecord> for CollectionRunPayload<'a> {
    fn from(record: &'a ExecutionRecord) -> Self {
        Self {
            suite_name: &record.suite_name,
            suite_run_id: &record.suite_run_id,
            ci_system: record.provenance.system.as_str(),
            repository: record.provenance.repository(),
            branch: &record.provenance.branch,
            status: record.status(),
            commit_hash: &record.provenance.commit_hash,
            output: BASE64.encode(&record.output),
            output_format: record.output_format.as_str(),
            coverage_info: BASE64.encode(&record.coverage),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuiteRunPayload<'a> {
    suite_name: &'a str,
    build_tag: &'a str,
    ci_system: &'static str,
    repository: String,
    branch: &'a str,
    commit_hash: &'a str,
    output: String,
    output_format: &'static str,
    coverage_info: String,
}

impl<'a> From<&'a SuiteReportRecord> for SuiteRunPayload<'a> {
    fn from(record: &'a SuiteReportRecord) -> Self {
        Self {
            suite_name: &record.suite_name,
            build_tag: &record.build_tag,
            ci_system: record.provenance.system.as_str(),
            repository: record.provenance.repository(),
            branch: &record.provenance.branch,
            commit_hash: &record.provenance.commit_hash,
            output: BASE64.encode(&record.output),
            output_format: record.output_format.as_str(),
            coverage_info: BASE64.encode(&record.coverage),
        }
    }
}

/// Connect error body, e.g. `{"code":"unauthenticated","message":"bad key"}`
#[derive(Deserialize)]
struct ConnectError {
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP client for the ingestion service
pub struct HttpIngestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpIngestClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent(format!("codecomet/{}", CURRENT_VERSION))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.remote_server.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}/{}", self.base_url, SERVICE, method)
    }

    async fn call<T: Serialize>(&self, method: &str, run: T) -> Result<serde_json::Value> {
        let url = self.method_url(method);
        debug!(url = %url, "calling ingestion service");

        let mut request = self
            .client
            .post(&url)
            .header("Connect-Protocol-Version", "1")
            .json(&IngestRequest { run });
        if let Some(key) = &self.api_key {
            request = request.header("Api-Key", key);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            return serde_json::from_str(&body).context("Failed to parse ingestion response");
        }

        if let Ok(err) = serde_json::from_str::<ConnectError>(&body) {
            return Err(anyhow::anyhow!(
                "CodeComet API error ({}): {} {}",
                status,
                err.code,
                sanitize_error_body(&err.message)
            ));
        }

        Err(anyhow::anyhow!(
            "CodeComet API error ({}): {}",
            status,
            sanitize_error_body(&body)
        ))
    }
}

impl Ingest for HttpIngestClient {
    async fn ingest_collection_run(&self, record: &ExecutionRecord) -> Result<serde_json::Value> {
        self.call(INGEST_COLLECTION_RUN, CollectionRunPayload::from(record))
            .await
    }

    async fn ingest_suite_run(&self, record: &SuiteReportRecord) -> Result<serde_json::Value> {
        self.call(INGEST_SUITE_RUN, SuiteRunPayload::from(record))
            .await
    }
}

/// Truncate an error body and redact it entirely if it looks like it echoes
/// credentials back.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &["api-key", "api_key", "apikey", "token", "secret", "bearer"];

    let truncated = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }

    truncated
}
