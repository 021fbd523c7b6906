use std::fmt;
use std::io::Write;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::model::node::HookType;
use crate::runner::display::format_event;

/// Classification of reporter events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ok,
    Skip,
    DynamicSkip,
    Fail,
    HookFail,
    Deadlock,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::DynamicSkip => write!(f, "dynamicSkip"),
            Self::Fail => write!(f, "fail"),
            Self::HookFail => write!(f, "hookFail"),
            Self::Deadlock => write!(f, "deadlock"),
        }
    }
}

/// One observable step of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Display name of the unit.
    pub node: String,
    /// Spec or hook key; `None` for deadlock events.
    pub target: Option<String>,
    /// Set on hook failures.
    pub hook: Option<HookType>,
    pub elapsed: Option<Duration>,
    pub timeout: Option<Duration>,
    pub reason: Option<String>,
}

impl Event {
    fn new(kind: EventKind, node: &str, target: Option<&str>) -> Self {
        Self {
            kind,
            node: node.to_owned(),
            target: target.map(str::to_owned),
            hook: None,
            elapsed: None,
            timeout: None,
            reason: None,
        }
    }

    pub fn ok(node: &str, spec: &str, elapsed: Duration, timeout: Duration) -> Self {
        Self {
            elapsed: Some(elapsed),
            timeout: Some(timeout),
            ..Self::new(EventKind::Ok, node, Some(spec))
        }
    }

    pub fn skip(node: &str, spec: &str, reason: &str) -> Self {
        Self {
            reason: (!reason.is_empty()).then(|| reason.to_owned()),
            ..Self::new(EventKind::Skip, node, Some(spec))
        }
    }

    pub fn dynamic_skip(node: &str, spec: &str, reason: Option<String>, elapsed: Duration) -> Self {
        Self {
            reason,
            elapsed: Some(elapsed),
            ..Self::new(EventKind::DynamicSkip, node, Some(spec))
        }
    }

    pub fn fail(node: &str, spec: &str, reason: String, elapsed: Duration, timeout: Duration) -> Self {
        Self {
            reason: Some(reason),
            elapsed: Some(elapsed),
            timeout: Some(timeout),
            ..Self::new(EventKind::Fail, node, Some(spec))
        }
    }

    pub fn hook_fail(
        node: &str,
        hook: &str,
        hook_type: HookType,
        reason: String,
        timeout: Duration,
    ) -> Self {
        Self {
            hook: Some(hook_type),
            reason: Some(reason),
            timeout: Some(timeout),
            ..Self::new(EventKind::HookFail, node, Some(hook))
        }
    }

    /// `reason` carries the node's unmet edges, e.g. `X { Y y }`.
    pub fn deadlock(node: &str, reason: String) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(EventKind::Deadlock, node, None)
        }
    }
}

/// Receives run events as they happen.
pub trait Reporter: Send {
    fn report(&mut self, event: &Event);
}

impl<A: Reporter, B: Reporter> Reporter for (A, B) {
    fn report(&mut self, event: &Event) {
        self.0.report(event);
        self.1.report(event);
    }
}

impl<R: Reporter> Reporter for Option<R> {
    fn report(&mut self, event: &Event) {
        if let Some(reporter) = self {
            reporter.report(event);
        }
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, event: &Event) {
        (**self).report(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Vec<Event>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// `(kind, node, target)` triples, handy for asserting on order.
    pub fn trail(&self) -> Vec<(EventKind, String, Option<String>)> {
        self.events
            .iter()
            .map(|e| (e.kind, e.node.clone(), e.target.clone()))
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

/// Writes one plain-text line per event.
pub struct ConsoleReporter<W> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &Event) {
        // A closed pipe must not abort the run.
        let _ = writeln!(self.out, "{}", format_event(event));
    }
}

/// Forwards events to `tracing` under the `dagspec::events` target.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, event: &Event) {
        let key = event.target.as_deref().unwrap_or("");
        let reason = event.reason.as_deref().unwrap_or("");
        let elapsed_ms = event.elapsed.map(|d| d.as_millis() as u64);
        match event.kind {
            EventKind::Ok => {
                info!(target: "dagspec::events", node = %event.node, key, elapsed_ms, "ok")
            }
            EventKind::Skip | EventKind::DynamicSkip => {
                warn!(target: "dagspec::events", kind = %event.kind, node = %event.node, key, reason, "skipped")
            }
            EventKind::Fail | EventKind::HookFail | EventKind::Deadlock => {
                error!(target: "dagspec::events", kind = %event.kind, node = %event.node, key, reason, "failed")
            }
        }
    }
}
