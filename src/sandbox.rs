//! Remote sandbox analysis gateway
//!
//! Samples are submitted once, yielding a task id; reports are polled until
//! the sandbox has finished detonating the sample. The task id is persisted
//! on the record so polling resumes across runs.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{TriageError, TriageResult};

/// Result of polling the sandbox for a task
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxPoll {
    /// The analysis report is available.
    Report(Value),
    /// The task is still queued or running.
    Pending,
}

/// Narrow interface to the remote sandbox service
pub trait SandboxGateway: Send + Sync {
    /// Submit sample content for analysis, returning the task id.
    fn submit(&self, blob: &[u8], file_name: &str) -> TriageResult<String>;

    /// Poll a previously submitted task.
    fn poll(&self, task_id: &str) -> TriageResult<SandboxPoll>;
}

/// HTTP client for the sandbox REST API
///
/// `POST /api/tasks/create/file` submits a multipart upload;
/// `GET /api/report/<task-id>` answers 200 with the report once available.
/// No authentication in the current contract.
pub struct HttpSandbox {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpSandbox {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> TriageResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(net_err)?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, http })
    }
}

impl SandboxGateway for HttpSandbox {
    fn submit(&self, blob: &[u8], file_name: &str) -> TriageResult<String> {
        debug!(file_name, bytes = blob.len(), "submitting sample to sandbox");
        let part = reqwest::blocking::multipart::Part::bytes(blob.to_vec())
            .file_name(file_name.to_string());
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/api/tasks/create/file", self.base_url))
            .multipart(form)
            .send()
            .map_err(net_err)?;
        if !resp.status().is_success() {
            return Err(TriageError::SandboxRejected(resp.status().as_u16()));
        }

        let body: Value = resp.json().map_err(net_err)?;
        match body.get("task_id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(TriageError::SandboxResponse(
                "missing task_id".to_string(),
            )),
        }
    }

    fn poll(&self, task_id: &str) -> TriageResult<SandboxPoll> {
        let resp = self
            .http
            .get(format!("{}/api/report/{}", self.base_url, task_id))
            .send()
            .map_err(net_err)?;
        if resp.status() == reqwest::StatusCode::OK {
            let report: Value = resp.json().map_err(net_err)?;
            Ok(SandboxPoll::Report(report))
        } else {
            debug!(task_id, status = resp.status().as_u16(), "report not ready");
            Ok(SandboxPoll::Pending)
        }
    }
}

fn net_err(err: reqwest::Error) -> TriageError {
    TriageError::Network(err.to_string())
}
