//! Dependency-ordered test orchestration.
//!
//! Test units are plain structs implementing [`TestUnit`]. Each unit carries
//! specs, lifecycle hooks, skip declarations and dependencies on other
//! units, registered through [`Registry::unit`]. [`TestRunner::run`] drains
//! the registry one unit at a time: a unit runs once all of its
//! dependencies have finished, receives their instances through
//! [`TestUnit::inject`], and its cleanup hooks run only after every unit
//! depending on it has finished.

pub mod cli;
pub mod emit;
pub mod graph;
pub mod model;
pub mod runner;

pub use cli::harness::{HarnessArgs, ReportFormat, init_tracing, run_harness, run_main};
pub use graph::builder::UnitBuilder;
pub use graph::registry::{ConfigError, ConfigErrorKind, NodeId, Registry};
pub use model::identity::Identity;
pub use model::node::{HookType, TestNode};
pub use model::unit::{Shared, TestUnit, UnitHandle};
pub use runner::executor::{RunConfig, RunError, RunErrorKind, RunOutcome, RunSummary, TestRunner};
pub use runner::reporter::{
    ConsoleReporter, Event, EventKind, RecordingReporter, Reporter, TracingReporter,
};
pub use runner::result::{BoxError, Interrupt, UnitResult, skip_test};
