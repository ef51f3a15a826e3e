use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::pipeline::core::{Containable, SampleStage, StageFlow, StageOutcome};
use crate::pipeline::record::SampleRecord;
use crate::sandbox::{SandboxGateway, SandboxPoll};

/// Runs the sample through the remote sandbox service
///
/// On first sight the sample is submitted and the task id recorded; on later
/// passes (same run or a later one, via the merge step) the task is polled
/// until the report arrives.
///
/// # Record fields read
/// * `blob` - sample content bytes
/// * `file_name` - original name of the sample, when known
/// * `sandbox_task_id` - task id from a previous pass, when present
///
/// # Record fields written
/// * `sandbox_task_id` - persisted so polling resumes across runs
/// * `sandbox_report` - the analysis report, once available (transient:
///   large and re-fetchable, kept out of the store)
///
/// Any transport error is a contained failure.
pub struct SandboxStage {
    sandbox: Arc<dyn SandboxGateway>,
}

impl SandboxStage {
    pub fn new(sandbox: Arc<dyn SandboxGateway>) -> Self {
        Self { sandbox }
    }
}

impl SampleStage for SandboxStage {
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome {
        if !record.has_extra("sandbox_task_id") {
            let file_name = record.file_name().unwrap_or("sample").to_string();
            let task_id = {
                let blob = record.require_blob()?;
                self.sandbox.submit(blob, &file_name).contained()?
            };
            debug!(task_id, "sample submitted to sandbox");
            record.set_extra("sandbox_task_id", Value::String(task_id));
        } else if !record.has_extra("sandbox_report") {
            let task_id = record.extra_str("sandbox_task_id")?.to_string();
            match self.sandbox.poll(&task_id).contained()? {
                SandboxPoll::Report(report) => {
                    debug!(task_id, "sandbox report received");
                    record.set_extra("sandbox_report", report);
                    record.mark_transient("sandbox_report");
                }
                SandboxPoll::Pending => {
                    debug!(task_id, "sandbox report not ready yet");
                }
            }
        }
        Ok(StageFlow::Continue)
    }

    fn name(&self) -> &str {
        "sandbox"
    }
}
