use anyhow::Result;
use serde::Serialize;
use std::process::ExitCode;
use winprovision::workflows::{WorkflowReport, WorkflowStatus};
use winprovision::WaitOutcome;

/// Exit code for a workflow or wait that ran out of time without an error
pub const EXIT_TIMED_OUT: u8 = 2;

#[derive(Debug, Serialize)]
pub struct WaitReport {
    pub condition: String,
    pub status: &'static str,
    pub elapsed_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl WaitReport {
    pub fn from_outcome<T>(
        condition: String,
        outcome: WaitOutcome<T>,
        describe: impl FnOnce(T) -> serde_json::Value,
    ) -> Self {
        let elapsed_ms = u64::try_from(outcome.elapsed().as_millis()).unwrap_or(u64::MAX);
        let attempts = outcome.attempts();
        let (status, detail) = match outcome.ready() {
            Some(value) => ("ready", Some(describe(value))),
            None => ("timed_out", None),
        };
        Self {
            condition,
            status,
            elapsed_ms,
            attempts,
            detail,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.status == "ready" {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_TIMED_OUT)
        }
    }
}

pub fn print_wait(report: &WaitReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match report.status {
        "ready" => println!(
            "✅ {} after {} ms ({} attempts)",
            report.condition, report.elapsed_ms, report.attempts
        ),
        _ => println!(
            "⏰ gave up waiting for {} after {} ms ({} attempts)",
            report.condition, report.elapsed_ms, report.attempts
        ),
    }
    if let Some(detail) = &report.detail {
        println!("   {detail}");
    }
    Ok(())
}

pub fn print_workflow(report: &WorkflowReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for step in &report.steps {
        println!("  • {:<24} {:>8} ms", step.name, step.elapsed_ms);
    }
    match &report.status {
        WorkflowStatus::Completed => println!(
            "✅ {} completed in {} ms",
            report.workflow, report.elapsed_ms
        ),
        WorkflowStatus::Relaunched => println!(
            "🔐 {} relaunched with administrator rights",
            report.workflow
        ),
        WorkflowStatus::TimedOut {
            condition,
            elapsed_ms,
            ..
        } => println!(
            "⏰ {} stopped: gave up waiting for {} after {} ms",
            report.workflow, condition, elapsed_ms
        ),
    }
    Ok(())
}

pub fn workflow_exit_code(report: &WorkflowReport) -> ExitCode {
    match report.status {
        WorkflowStatus::TimedOut { .. } => ExitCode::from(EXIT_TIMED_OUT),
        WorkflowStatus::Completed | WorkflowStatus::Relaunched => ExitCode::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wait_report_from_timeout() {
        let outcome: WaitOutcome<u32> = WaitOutcome::TimedOut {
            condition: "window matching 'Meta'".to_string(),
            elapsed: Duration::from_secs(15),
            timeout: Duration::from_secs(15),
            attempts: 30,
        };
        let report = WaitReport::from_outcome("window".to_string(), outcome, |v| v.into());

        assert_eq!(report.status, "timed_out");
        assert_eq!(report.elapsed_ms, 15_000);
        assert!(report.detail.is_none());
    }

    #[test]
    fn test_wait_report_json_shape() {
        let outcome = WaitOutcome::Ready {
            value: 3u32,
            elapsed: Duration::from_millis(1500),
            attempts: 4,
        };
        let report = WaitReport::from_outcome("counter".to_string(), outcome, |v| v.into());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "condition": "counter",
                "status": "ready",
                "elapsed_ms": 1500,
                "attempts": 4,
                "detail": 3
            })
        );
    }
}
