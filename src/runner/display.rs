use std::fmt;
use std::time::Duration;

use crate::model::node::HookType;
use crate::runner::executor::RunOutcome;
use crate::runner::reporter::{Event, EventKind};

const OK_LABEL: &str = "   (ok)   ";
const SKIP_LABEL: &str = "  (skip)  ";
const FAILED_LABEL: &str = " (failed) ";
const HOOK_FAILED_LABEL: &str = " (hook failed) ";

/// Width the elapsed column is padded to.
const TIME_WIDTH: usize = 9;

/// Render a duration in the largest fitting unit, truncated to two decimals.
pub fn resolve_time(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    let (hundredths, unit) = if millis < 1000 {
        (elapsed.as_micros() / 10, "ms")
    } else if millis < 60 * 1000 {
        (millis / 10, "s")
    } else if millis < 60 * 60 * 1000 {
        (millis / 600, "m")
    } else {
        (millis / 36_000, "h")
    };
    format!("{} {unit}", hundredths as f64 / 100.0)
}

/// How close a spec came to its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Under a fifth of the timeout.
    Fast,
    /// Under half of the timeout.
    Moderate,
    Slow,
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Moderate => write!(f, "moderate"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

pub fn pace(elapsed: Duration, timeout: Duration) -> Pace {
    if elapsed < timeout / 5 {
        Pace::Fast
    } else if elapsed < timeout / 2 {
        Pace::Moderate
    } else {
        Pace::Slow
    }
}

/// `Name.key:type` for a named hook, `Name:type` when the key is the
/// conventional one for its type.
pub fn hook_label(node: &str, key: &str, hook_type: HookType) -> String {
    if key == hook_type.conventional_key() {
        format!("{node}:{hook_type}")
    } else {
        format!("{node}.{key}:{hook_type}")
    }
}

fn time_column(event: &Event) -> String {
    let Some(elapsed) = event.elapsed else {
        return " ".repeat(TIME_WIDTH);
    };
    let text = format!("{:>width$}", resolve_time(elapsed), width = TIME_WIDTH);
    match event.timeout.map(|t| pace(elapsed, t)) {
        Some(Pace::Fast) | None => text,
        Some(p) => format!("{text} [{p}]"),
    }
}

/// Format one event as a console line.
pub fn format_event(event: &Event) -> String {
    let target = event.target.as_deref().unwrap_or("");
    let reason = event.reason.as_deref();
    match event.kind {
        EventKind::Ok => format!(
            "{OK_LABEL} {} {}.{target}()",
            time_column(event),
            event.node
        ),
        EventKind::Skip | EventKind::DynamicSkip => {
            let mut line = format!(
                "{SKIP_LABEL} {} {}.{target}()",
                time_column(event),
                event.node
            );
            if let Some(reason) = reason {
                line.push_str(&format!(" {{{reason}}}"));
            }
            line
        }
        EventKind::Fail => {
            let mut line = format!(
                "{FAILED_LABEL} {} {}.{target}()",
                time_column(event),
                event.node
            );
            if let Some(reason) = reason {
                line.push_str(&format!("\n         → {reason}"));
            }
            line
        }
        EventKind::HookFail => {
            let label = match event.hook {
                Some(hook_type) => hook_label(&event.node, target, hook_type),
                None => format!("{}.{target}", event.node),
            };
            let mut line = format!("{HOOK_FAILED_LABEL} {label}()");
            if let Some(reason) = reason {
                line.push_str(&format!("\n         → {reason}"));
            }
            line
        }
        EventKind::Deadlock => format!(
            "{FAILED_LABEL} dependency lock: {}",
            reason.unwrap_or(&event.node)
        ),
    }
}

/// Format the final summary after a successful run.
pub fn format_summary(outcome: &RunOutcome) -> String {
    let summary = &outcome.summary;
    let mut parts = Vec::new();

    if summary.passed > 0 {
        parts.push(format!("{} passed", summary.passed));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    if summary.dynamic_skipped > 0 {
        parts.push(format!("{} skipped at runtime", summary.dynamic_skipped));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }

    if parts.is_empty() {
        parts.push("0 specs".into());
    }

    format!(
        "\nResults: {} ({})",
        parts.join(", "),
        resolve_time(outcome.duration)
    )
}

/// Phase timings printed after a run.
pub fn format_timings(resolve: Duration, tests: Duration) -> String {
    format!(
        "  resolve: {}\n    tests: {}",
        resolve_time(resolve),
        resolve_time(tests)
    )
}

/// Format the run header line.
pub fn format_run_header(name: &str, version: &str) -> String {
    format!("{name} tests v{version}")
}
