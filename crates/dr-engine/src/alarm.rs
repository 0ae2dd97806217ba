use crate::model::Job;

pub const JOB_FAILED_FAULT: &str = "JobFailed";

/// Receives faults for failed background jobs.
pub trait AlarmSink: Send + Sync {
    fn raise_alarm(&self, fault_name: &str, description: &str, resource: &str);
}

/// Writes alarms to the log.
#[derive(Debug, Default)]
pub struct LogAlarmSink;

impl AlarmSink for LogAlarmSink {
    fn raise_alarm(&self, fault_name: &str, description: &str, resource: &str) {
        tracing::error!(fault = fault_name, resource, "{}", description);
    }
}

/// Only jobs nobody is watching directly (schedule or message triggered)
/// raise an alarm when they fail.
pub fn should_raise_alarm(job: &Job) -> bool {
    job.is_triggered_externally() && job.status.is_failed()
}

pub fn raise_job_alarm(sink: &dyn AlarmSink, job: &Job) {
    if !should_raise_alarm(job) {
        return;
    }
    let description = format!(
        "Job {} ({}) failed with status {}. Please refer to the job resource for details on the specific reason for the failure.",
        job.name(),
        job.id,
        job.status
    );
    sink.raise_alarm(JOB_FAILED_FAULT, &description, &format!("job/{}", job.id));
}
