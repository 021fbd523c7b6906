use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Once;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

use crate::emit::run_result::{emit_run_json, emit_run_junit, emit_run_yaml};
use crate::graph::registry::{ConfigError, Registry};
use crate::runner::display::{format_run_header, format_summary, format_timings};
use crate::runner::executor::{RunConfig, TestRunner};
use crate::runner::report::to_report;
use crate::runner::reporter::{ConsoleReporter, RecordingReporter, TracingReporter};

/// Output format for a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// One line per event plus a summary.
    #[default]
    Console,
    Json,
    Yaml,
    Junit,
}

/// Command-line options for a `harness = false` test target.
#[derive(Debug, Clone, Parser)]
#[command(name = "dagspec", about = "Run dependency-ordered test units", version)]
pub struct HarnessArgs {
    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    pub format: ReportFormat,

    /// Write the report to a file instead of stdout (json, yaml, junit)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress per-event console lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Timeout in milliseconds for specs and hooks registered without one
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Suite name used in reports
    #[arg(long)]
    pub name: Option<String>,

    /// Extra arguments from `cargo test`, ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub passthrough: Vec<String>,
}

impl Default for HarnessArgs {
    fn default() -> Self {
        Self {
            format: ReportFormat::Console,
            output: None,
            quiet: false,
            timeout_ms: None,
            name: None,
            passthrough: Vec::new(),
        }
    }
}

impl HarnessArgs {
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::default();
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.default_timeout = Duration::from_millis(ms);
        }
        config
    }
}

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber writing to stderr.
///
/// Only active when `RUST_LOG` is set, e.g. `RUST_LOG=dagspec=debug`.
/// Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .try_init();
        }
    });
}

/// Run a sealed-or-unsealed registry and emit the report `args` asks for.
///
/// Returns `Ok(true)` if the run drained without failures, `Ok(false)`
/// otherwise.
///
/// # Errors
///
/// Returns an error string if the options conflict or the report cannot be
/// written.
pub async fn run_harness(
    registry: Registry,
    args: &HarnessArgs,
    resolve: Duration,
) -> Result<bool, String> {
    if args.output.is_some() && args.format == ReportFormat::Console {
        return Err("--output requires --format json, yaml or junit".into());
    }

    let config = args.run_config();
    let console = args.format == ReportFormat::Console;
    if console {
        println!(
            "{}",
            format_run_header(&config.name, env!("CARGO_PKG_VERSION"))
        );
    }

    let mut reporter = (
        RecordingReporter::new(),
        (
            TracingReporter,
            (console && !args.quiet).then(ConsoleReporter::stdout),
        ),
    );

    let runner = TestRunner::new(config);
    let started = Instant::now();
    let result = runner.run(registry, &mut reporter).await;
    let tests = started.elapsed();

    let (recorder, _) = reporter;
    let events = recorder.into_events();
    let report = to_report(&runner.config().name, tests, &events, result.as_ref().err());

    if let Err(error) = &result {
        eprintln!(" (failed) {error}");
        if let Some(detail) = &error.detail {
            eprintln!("{detail}");
        }
    }

    let rendered = match args.format {
        ReportFormat::Console => None,
        ReportFormat::Json => Some(emit_run_json(&report)),
        ReportFormat::Yaml => Some(emit_run_yaml(&report)),
        ReportFormat::Junit => Some(emit_run_junit(&report)),
    };

    match (rendered, &args.output) {
        (Some(text), Some(out_path)) => {
            std::fs::write(out_path, &text)
                .map_err(|e| format!("failed to write {}: {e}", out_path.display()))?;
            eprintln!("results written to {}", out_path.display());
        }
        (Some(text), None) => print!("{text}"),
        (None, _) => {
            if let Ok(outcome) = &result {
                println!("{}", format_summary(outcome));
            }
            println!("{}", format_timings(resolve, tests));
        }
    }

    Ok(result.is_ok() && report.summary.success)
}

/// Entry point for a `harness = false` test target.
///
/// ```no_run
/// use dagspec::{ConfigError, Registry, TestUnit};
///
/// #[derive(Default)]
/// struct Smoke;
/// impl TestUnit for Smoke {}
///
/// fn register(registry: &mut Registry) -> Result<(), ConfigError> {
///     registry.unit::<Smoke>().spec_sync("boots", |_| Ok(()))?;
///     Ok(())
/// }
///
/// fn main() -> std::process::ExitCode {
///     dagspec::run_main(register)
/// }
/// ```
pub fn run_main<F>(register: F) -> ExitCode
where
    F: FnOnce(&mut Registry) -> Result<(), ConfigError>,
{
    let args = HarnessArgs::parse();
    init_tracing();

    let resolve_start = Instant::now();
    let mut registry = Registry::new();
    if let Err(e) = register(&mut registry) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }
    let resolve = resolve_start.elapsed();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_harness(registry, &args, resolve)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
