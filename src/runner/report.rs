use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::node::HookType;
use crate::runner::executor::{RunError, RunSummary};
use crate::runner::reporter::Event;

/// Serializable run result for emitter output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: SuiteMetadata,
    pub events: Vec<EventReport>,
    pub summary: SummaryReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Metadata about the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteMetadata {
    pub name: String,
    pub duration_ms: u64,
}

/// One reporter event in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReport {
    pub kind: String,
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The fatal error that stopped the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub dynamic_skipped: usize,
    pub failed: usize,
    pub success: bool,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Build a [`RunReport`] from the events a run produced and its fatal error,
/// if any.
pub fn to_report(
    name: &str,
    duration: Duration,
    events: &[Event],
    error: Option<&RunError>,
) -> RunReport {
    let summary = RunSummary::from_events(events);

    let event_reports = events
        .iter()
        .map(|event| EventReport {
            kind: event.kind.to_string(),
            node: event.node.clone(),
            target: event.target.clone(),
            hook: event.hook,
            elapsed_ms: event.elapsed.map(millis),
            timeout_ms: event.timeout.map(millis),
            reason: event.reason.clone(),
        })
        .collect();

    RunReport {
        suite: SuiteMetadata {
            name: name.to_owned(),
            duration_ms: millis(duration),
        },
        events: event_reports,
        summary: SummaryReport {
            total: summary.total,
            passed: summary.passed,
            skipped: summary.skipped,
            dynamic_skipped: summary.dynamic_skipped,
            failed: summary.failed,
            success: error.is_none() && summary.success(),
        },
        error: error.map(|e| ErrorReport {
            kind: e.kind.to_string(),
            message: e.message.clone(),
            detail: e.detail.clone(),
            node: e.node.clone(),
            target: e.target.clone(),
        }),
    }
}
