use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::graph::analysis::lock_report;
use crate::graph::registry::{NodeId, Registry};
use crate::model::node::{HookEntry, HookType};
use crate::model::unit::UnitHandle;
use crate::runner::reporter::{Event, EventKind, Reporter};
use crate::runner::result::{Execution, Failure, FailureKind};
use crate::runner::timeout;

/// Configuration for a test run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Suite name used in reports.
    pub name: String,
    /// Timeout for specs and hooks registered without one.
    pub default_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "dagspec".to_owned(),
            default_timeout: Duration::from_millis(5000),
        }
    }
}

/// Drains a registry in dependency order, one unit at a time.
pub struct TestRunner {
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute every registered unit. This is the primary entry point.
    ///
    /// 1. Seal the registry (resolve deferred edges)
    /// 2. Pick the first pending unit whose dependencies have all finished
    /// 3. Run its hooks and specs, then clean up whatever no longer has
    ///    unfinished dependents
    /// 4. Repeat until nothing is pending
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] on the first fatal failure. Units finished before
    /// the failure stay finished; their cleanup hooks are not replayed.
    #[instrument(target = "dagspec::runner", skip_all, fields(suite = %self.config.name))]
    pub async fn run(
        &self,
        mut registry: Registry,
        reporter: &mut dyn Reporter,
    ) -> Result<RunOutcome, RunError> {
        let start = Instant::now();
        registry.seal();

        if registry.is_empty() {
            error!(target: "dagspec::runner", "no test units registered");
            return Err(RunError {
                kind: RunErrorKind::NoTestsFound,
                message: "no test units registered".into(),
                detail: None,
                node: None,
                target: None,
            });
        }

        info!(
            target: "dagspec::runner",
            units = registry.len(),
            edges = registry.edge_count(),
            "run started"
        );

        let pending = registry.node_ids();
        let mut scheduler = Scheduler {
            registry,
            pending,
            config: &self.config,
            reporter,
            summary: RunSummary::default(),
        };
        scheduler.drain().await?;

        let outcome = RunOutcome {
            name: self.config.name.clone(),
            duration: start.elapsed(),
            summary: scheduler.summary,
        };
        info!(
            target: "dagspec::runner",
            passed = outcome.summary.passed,
            skipped = outcome.summary.skipped + outcome.summary.dynamic_skipped,
            duration_ms = outcome.duration.as_millis() as u64,
            "run finished"
        );
        Ok(outcome)
    }
}

struct Scheduler<'a> {
    registry: Registry,
    /// Unfinished nodes in registration order.
    pending: Vec<NodeId>,
    config: &'a RunConfig,
    reporter: &'a mut dyn Reporter,
    summary: RunSummary,
}

impl Scheduler<'_> {
    async fn drain(&mut self) -> Result<(), RunError> {
        while !self.pending.is_empty() {
            let Some(position) = self.next_ready() else {
                return Err(self.dependency_lock());
            };
            let id = self.pending.remove(position);
            self.execute_node(id).await?;
        }
        Ok(())
    }

    fn next_ready(&self) -> Option<usize> {
        self.pending.iter().position(|&id| {
            !self.registry.node(id).is_finished() && self.registry.dependencies_finished(id)
        })
    }

    async fn execute_node(&mut self, id: NodeId) -> Result<(), RunError> {
        let instance = self.registry.node_mut(id).instance();
        debug!(target: "dagspec::runner", unit = instance.name(), "scheduled");

        let dependencies: Vec<(NodeId, String)> = self
            .registry
            .dependencies(id)
            .into_iter()
            .map(|(dep, edge)| (dep, edge.property_key.clone()))
            .collect();
        for (dep, key) in dependencies {
            let dependency = self.registry.node_mut(dep).instance();
            instance.inject(&key, dependency).await;
        }

        self.run_hooks(id, HookType::Before, &instance).await?;
        self.run_specs(id, &instance).await?;
        self.run_hooks(id, HookType::After, &instance).await?;

        self.registry.node_mut(id).mark_finished();
        debug!(target: "dagspec::runner", unit = instance.name(), "finished");

        if !self.registry.has_unfinished_dependents(id) {
            self.propagate_cleanup(id).await?;
        }
        Ok(())
    }

    async fn run_specs(&mut self, id: NodeId, instance: &UnitHandle) -> Result<(), RunError> {
        let node = self.registry.node(id);
        let name = node.name();
        let specs = node.specs.clone();

        for spec in specs {
            if let Some(skip) = self.registry.node(id).static_skip(&spec.key) {
                let event = Event::skip(name, &spec.key, &skip.reason);
                debug!(target: "dagspec::runner", unit = name, spec = %spec.key, reason = %skip.reason, "skipped");
                self.emit(event);
                continue;
            }

            self.run_hooks(id, HookType::BeforeEach, instance).await?;

            let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
            let started = Instant::now();
            let execution = timeout::execute((spec.callable)(instance.clone()), timeout).await;
            let elapsed = started.elapsed();

            match execution {
                Execution::Completed => {
                    debug!(target: "dagspec::runner", unit = name, spec = %spec.key, "ok");
                    self.emit(Event::ok(name, &spec.key, elapsed, timeout));
                }
                Execution::Skipped(reason) => {
                    debug!(target: "dagspec::runner", unit = name, spec = %spec.key, "skipped at runtime");
                    self.emit(Event::dynamic_skip(name, &spec.key, reason, elapsed));
                    continue;
                }
                Execution::Failed(failure) => {
                    debug!(target: "dagspec::runner", unit = name, spec = %spec.key, %failure, "spec failed");
                    self.emit(Event::fail(
                        name,
                        &spec.key,
                        failure.message.clone(),
                        elapsed,
                        timeout,
                    ));
                    let kind = if failure.is_timeout() {
                        RunErrorKind::Timeout
                    } else {
                        RunErrorKind::SpecFailure
                    };
                    return Err(RunError {
                        kind,
                        message: format!("{name}.{}() failed", spec.key),
                        detail: Some(failure.to_string()),
                        node: Some(name.to_owned()),
                        target: Some(spec.key),
                    });
                }
            }

            self.run_hooks(id, HookType::AfterEach, instance).await?;
        }
        Ok(())
    }

    async fn run_hooks(
        &mut self,
        id: NodeId,
        hook_type: HookType,
        instance: &UnitHandle,
    ) -> Result<(), RunError> {
        let hooks = self.registry.node(id).hooks_of(hook_type);
        for hook in hooks {
            let timeout = hook.timeout.unwrap_or(self.config.default_timeout);
            debug!(target: "dagspec::runner", unit = instance.name(), hook = %hook.key, %hook_type, "hook");

            let failure = match timeout::execute((hook.callable)(instance.clone()), timeout).await {
                Execution::Completed => continue,
                Execution::Failed(failure) => failure,
                Execution::Skipped(reason) => Failure {
                    kind: FailureKind::Error,
                    message: match reason {
                        Some(reason) => format!("dynamic skip is only allowed in specs ({reason})"),
                        None => "dynamic skip is only allowed in specs".to_owned(),
                    },
                },
            };
            return Err(self.hook_failed(id, &hook, timeout, failure));
        }
        Ok(())
    }

    fn hook_failed(
        &mut self,
        id: NodeId,
        hook: &HookEntry,
        timeout: Duration,
        failure: Failure,
    ) -> RunError {
        let name = self.registry.node(id).name();
        debug!(target: "dagspec::runner", unit = name, hook = %hook.key, hook_type = %hook.hook_type, %failure, "hook failed");
        self.emit(Event::hook_fail(
            name,
            &hook.key,
            hook.hook_type,
            failure.message.clone(),
            timeout,
        ));

        let kind = if failure.is_timeout() {
            RunErrorKind::Timeout
        } else {
            RunErrorKind::HookFailure
        };
        RunError {
            kind,
            message: format!("{name}.{}() failed as {} hook", hook.key, hook.hook_type),
            detail: Some(failure.to_string()),
            node: Some(name.to_owned()),
            target: Some(hook.key.clone()),
        }
    }

    /// Run cleanup hooks for `start` and then, depth first, for every
    /// dependency whose dependents have all finished.
    async fn propagate_cleanup(&mut self, start: NodeId) -> Result<(), RunError> {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if self.registry.has_unfinished_dependents(id)
                || !self.registry.node_mut(id).begin_clean_up()
            {
                continue;
            }

            let instance = self.registry.node_mut(id).instance();
            debug!(target: "dagspec::runner", unit = instance.name(), "cleanup");
            self.run_hooks(id, HookType::CleanUp, &instance).await?;

            let dependencies: Vec<NodeId> = self
                .registry
                .dependencies(id)
                .into_iter()
                .map(|(dep, _)| dep)
                .collect();
            stack.extend(dependencies.into_iter().rev());
        }
        Ok(())
    }

    fn dependency_lock(&mut self) -> RunError {
        let report = lock_report(&self.registry, &self.pending);
        for locked in &report.locked {
            self.emit(Event::deadlock(&locked.name, locked.to_string()));
        }

        let names: Vec<&str> = report.locked.iter().map(|n| n.name.as_str()).collect();
        error!(
            target: "dagspec::runner",
            locked = ?names,
            cycles = report.cycles.len(),
            "dependency lock"
        );
        RunError {
            kind: RunErrorKind::DependencyLock,
            message: format!("cannot resolve dependencies of {}", names.join(", ")),
            detail: Some(report.describe()),
            node: None,
            target: None,
        }
    }

    fn emit(&mut self, event: Event) {
        self.summary.record(&event);
        self.reporter.report(&event);
    }
}

/// The result of a run that drained every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub name: String,
    pub duration: Duration,
    pub summary: RunSummary,
}

/// Spec counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub dynamic_skipped: usize,
    /// Failed specs and hooks.
    pub failed: usize,
}

impl RunSummary {
    /// Whether nothing failed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Count one event. Deadlock events are not counted.
    pub fn record(&mut self, event: &Event) {
        match event.kind {
            EventKind::Ok => self.passed += 1,
            EventKind::Skip => self.skipped += 1,
            EventKind::DynamicSkip => self.dynamic_skipped += 1,
            EventKind::Fail | EventKind::HookFail => self.failed += 1,
            EventKind::Deadlock => return,
        }
        self.total += 1;
    }

    /// Build a summary from a list of events.
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.record(event);
        }
        summary
    }
}

/// Fatal error that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
    pub detail: Option<String>,
    /// Unit the failure happened in.
    pub node: Option<String>,
    /// Spec or hook key that failed.
    pub target: Option<String>,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RunError {}

/// Classification of run errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// The registry was empty.
    NoTestsFound,
    /// Pending units remain but none has all dependencies finished.
    DependencyLock,
    /// A spec or hook ran past its deadline.
    Timeout,
    /// A hook failed.
    HookFailure,
    /// A spec failed.
    SpecFailure,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTestsFound => write!(f, "no tests found"),
            Self::DependencyLock => write!(f, "dependency lock"),
            Self::Timeout => write!(f, "timeout"),
            Self::HookFailure => write!(f, "hook failure"),
            Self::SpecFailure => write!(f, "spec failure"),
        }
    }
}
