//! End-to-end tests for the scheduler.
//!
//! Each test registers a small set of units, drains the registry through
//! `TestRunner`, and checks the execution order recorded by the callables
//! together with the events the reporter received.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagspec::{
    ConfigErrorKind, EventKind, HookType, Identity, Interrupt, RecordingReporter, Registry,
    RunConfig, RunError, RunErrorKind, RunOutcome, Shared, TestRunner, TestUnit, UnitHandle,
    UnitResult, skip_test,
};
use futures::FutureExt;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn note<T: TestUnit>(log: &Log, entry: &str) -> impl Fn(&mut T) -> UnitResult + Send + Sync + 'static {
    let log = Arc::clone(log);
    let entry = entry.to_owned();
    move |_: &mut T| {
        log.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

async fn run(registry: Registry) -> (Result<RunOutcome, RunError>, RecordingReporter) {
    let mut reporter = RecordingReporter::new();
    let result = TestRunner::new(RunConfig::default())
        .run(registry, &mut reporter)
        .await;
    (result, reporter)
}

macro_rules! unit {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Default)]
            struct $name;
            impl TestUnit for $name {}
        )*
    };
}

// ── Ordering and cleanup ─────────────────────────────────────

mod cleanup_order {
    use super::*;

    unit!(A, B);

    #[tokio::test]
    async fn dependent_cleans_up_before_dependency() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<A>()
            .spec_sync("spec", note::<A>(&log, "A.spec"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<A>(&log, "A.cleanUp"))
            .unwrap();
        reg.unit::<B>()
            .depends_on::<A>("a")
            .spec_sync("spec", note::<B>(&log, "B.spec"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<B>(&log, "B.cleanUp"))
            .unwrap();

        let (result, _) = run(reg).await;
        result.unwrap();
        assert_eq!(
            entries(&log),
            vec!["A.spec", "B.spec", "B.cleanUp", "A.cleanUp"]
        );
    }
}

mod diamond {
    use super::*;

    unit!(Top, Left, Right, Base);

    fn register(log: &Log) -> Registry {
        let mut reg = Registry::new();
        reg.unit::<Top>()
            .depends_on::<Left>("left")
            .depends_on::<Right>("right")
            .spec_sync("spec", note::<Top>(log, "Top"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<Top>(log, "~Top"))
            .unwrap();
        reg.unit::<Left>()
            .depends_on::<Base>("base")
            .spec_sync("spec", note::<Left>(log, "Left"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<Left>(log, "~Left"))
            .unwrap();
        reg.unit::<Right>()
            .depends_on::<Base>("base")
            .spec_sync("spec", note::<Right>(log, "Right"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<Right>(log, "~Right"))
            .unwrap();
        reg.unit::<Base>()
            .spec_sync("spec", note::<Base>(log, "Base"))
            .unwrap()
            .hook_sync("cleanUp", HookType::CleanUp, note::<Base>(log, "~Base"))
            .unwrap();
        reg
    }

    #[tokio::test]
    async fn diamond_runs_dependencies_first_in_registration_order() {
        let log = new_log();
        let (result, _) = run(register(&log)).await;
        result.unwrap();
        let order = entries(&log);
        assert_eq!(&order[..4], &["Base", "Left", "Right", "Top"]);
    }

    #[tokio::test]
    async fn diamond_cleanup_is_depth_first_and_runs_once() {
        let log = new_log();
        let (result, _) = run(register(&log)).await;
        result.unwrap();
        let order = entries(&log);
        assert_eq!(&order[4..], &["~Top", "~Left", "~Base", "~Right"]);
    }
}

mod deferred_cleanup {
    use super::*;

    unit!(Pool, Early, Late);

    #[tokio::test]
    async fn cleanup_waits_for_every_dependent() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<Pool>()
            .hook_sync("cleanUp", HookType::CleanUp, note::<Pool>(&log, "~Pool"))
            .unwrap();
        reg.unit::<Early>()
            .depends_on::<Pool>("shared")
            .spec_sync("spec", note::<Early>(&log, "Early"))
            .unwrap();
        reg.unit::<Late>()
            .depends_on::<Early>("early")
            .depends_on::<Pool>("shared")
            .spec_sync("spec", note::<Late>(&log, "Late"))
            .unwrap();

        let (result, _) = run(reg).await;
        result.unwrap();
        assert_eq!(entries(&log), vec!["Early", "Late", "~Pool"]);
    }
}

// ── Instances and injection ──────────────────────────────────

mod injection {
    use super::*;

    static DATABASE_CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Database {
        rows: Vec<u32>,
    }

    impl Default for Database {
        fn default() -> Self {
            DATABASE_CREATED.fetch_add(1, Ordering::SeqCst);
            Self { rows: Vec::new() }
        }
    }

    impl TestUnit for Database {}

    #[derive(Default)]
    struct Reader {
        database: Option<Shared<Database>>,
    }

    impl TestUnit for Reader {
        fn inject(&mut self, key: &str, dependency: UnitHandle) {
            if key == "database" {
                self.database = dependency.downcast();
            }
        }
    }

    #[derive(Default)]
    struct Writer {
        database: Option<Shared<Database>>,
    }

    impl TestUnit for Writer {
        fn inject(&mut self, key: &str, dependency: UnitHandle) {
            if key == "database" {
                self.database = dependency.downcast();
            }
        }
    }

    #[tokio::test]
    async fn dependents_share_one_dependency_instance() {
        let mut reg = Registry::new();
        reg.unit::<Database>()
            .spec_sync("insert", |db| {
                db.rows.push(1);
                Ok(())
            })
            .unwrap();
        reg.unit::<Writer>()
            .depends_on::<Database>("database")
            .spec("append", |writer| {
                async move {
                    let db = writer.database.as_ref().expect("database injected");
                    db.lock().await.rows.push(2);
                    Ok(())
                }
                .boxed()
            })
            .unwrap();
        reg.unit::<Reader>()
            .depends_on::<Database>("database")
            .depends_on::<Writer>("writer")
            .spec("read", |reader| {
                async move {
                    let db = reader.database.as_ref().expect("database injected");
                    assert_eq!(db.lock().await.rows, vec![1, 2]);
                    Ok(())
                }
                .boxed()
            })
            .unwrap();

        let (result, reporter) = run(reg).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.summary.passed, 3);
        assert_eq!(DATABASE_CREATED.load(Ordering::SeqCst), 1);
        assert!(reporter.events().iter().all(|e| e.kind == EventKind::Ok));
    }
}

mod derived_keys {
    use super::*;

    #[derive(Default)]
    struct BasicTest {
        value: u32,
    }
    impl TestUnit for BasicTest {}

    #[derive(Default)]
    struct IOTPOTest;
    impl TestUnit for IOTPOTest {}

    #[derive(Default)]
    struct Consumer {
        keys: Vec<String>,
        basic: Option<Shared<BasicTest>>,
    }

    impl TestUnit for Consumer {
        fn inject(&mut self, key: &str, dependency: UnitHandle) {
            self.keys.push(key.to_owned());
            if let Some(basic) = dependency.downcast() {
                self.basic = Some(basic);
            }
        }
    }

    #[tokio::test]
    async fn bulk_dependencies_inject_under_derived_keys() {
        let mut reg = Registry::new();
        reg.unit::<Consumer>()
            .dependencies([Identity::of::<BasicTest>(), Identity::of::<IOTPOTest>()])
            .spec("keys", |consumer| {
                async move {
                    assert_eq!(consumer.keys, vec!["basicTest", "IOTPOTest"]);
                    let basic = consumer.basic.as_ref().expect("basic injected");
                    assert_eq!(basic.lock().await.value, 42);
                    Ok(())
                }
                .boxed()
            })
            .unwrap();
        reg.unit::<BasicTest>()
            .spec_sync("set", |basic| {
                basic.value = 42;
                Ok(())
            })
            .unwrap();

        let (result, _) = run(reg).await;
        assert_eq!(result.unwrap().summary.passed, 2);
    }

    #[tokio::test]
    async fn lazy_dependents_resolve_before_scheduling() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<Consumer>()
            .spec_sync("runs_last", note::<Consumer>(&log, "Consumer"))
            .unwrap();
        reg.unit::<BasicTest>()
            .dependents_with(|| vec![Identity::of::<Consumer>()])
            .spec_sync("runs_first", note::<BasicTest>(&log, "BasicTest"))
            .unwrap();

        let (result, _) = run(reg).await;
        result.unwrap();
        assert_eq!(entries(&log), vec!["BasicTest", "Consumer"]);
    }
}

// ── Deadlocks ────────────────────────────────────────────────

mod deadlock {
    use super::*;

    unit!(X, Y, Z, Free);

    #[tokio::test]
    async fn three_node_cycle_names_every_node() {
        let mut reg = Registry::new();
        reg.unit::<X>().depends_on::<Y>("y");
        reg.unit::<Y>().depends_on::<Z>("z");
        reg.unit::<Z>().depends_on::<X>("x");

        let (result, reporter) = run(reg).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RunErrorKind::DependencyLock);
        assert!(err.message.contains("X, Y, Z"));

        let detail = err.detail.unwrap();
        assert!(detail.contains("- X { Y y }"));
        assert!(detail.contains("- Y { Z z }"));
        assert!(detail.contains("- Z { X x }"));
        assert!(detail.contains("cycle: X -> Y -> Z -> X"));

        let locked: Vec<&str> = reporter
            .events()
            .iter()
            .filter(|e| e.kind == EventKind::Deadlock)
            .map(|e| e.node.as_str())
            .collect();
        assert_eq!(locked, vec!["X", "Y", "Z"]);
    }

    #[tokio::test]
    async fn independent_units_run_before_the_lock_is_reported() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<X>().depends_on::<Y>("y");
        reg.unit::<Y>().depends_on::<X>("x");
        reg.unit::<Free>()
            .spec_sync("spec", note::<Free>(&log, "Free"))
            .unwrap();

        let (result, reporter) = run(reg).await;
        assert_eq!(result.unwrap_err().kind, RunErrorKind::DependencyLock);
        assert_eq!(entries(&log), vec!["Free"]);
        assert_eq!(reporter.events()[0].kind, EventKind::Ok);
        assert_eq!(reporter.events().last().unwrap().kind, EventKind::Deadlock);
    }
}

// ── Failures, timeouts and skips ─────────────────────────────

mod failures {
    use super::*;

    unit!(First, Second, Slow);

    #[tokio::test(start_paused = true)]
    async fn never_resolving_spec_times_out() {
        let mut reg = Registry::new();
        reg.unit::<Slow>()
            .spec_timeout("hangs", Duration::from_millis(10), |_| {
                futures::future::pending().boxed()
            })
            .unwrap();

        let (result, reporter) = run(reg).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RunErrorKind::Timeout);
        assert_eq!(err.node.as_deref(), Some("Slow"));
        assert_eq!(err.target.as_deref(), Some("hangs"));

        let event = reporter.events().last().unwrap();
        assert_eq!(event.kind, EventKind::Fail);
        assert_eq!(event.timeout, Some(Duration::from_millis(10)));
        assert!(event.elapsed.unwrap() >= Duration::from_millis(10));
        assert!(event.reason.as_deref().unwrap().contains("after 10 ms"));
    }

    #[tokio::test]
    async fn spec_failure_stops_scheduling() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<First>()
            .spec_sync("breaks", |_| Err(Interrupt::fail("expected 200, got 500")))
            .unwrap();
        reg.unit::<Second>()
            .spec_sync("never", note::<Second>(&log, "Second"))
            .unwrap();

        let (result, reporter) = run(reg).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RunErrorKind::SpecFailure);
        assert!(entries(&log).is_empty());
        assert_eq!(reporter.events().len(), 1);
    }

    #[tokio::test]
    async fn panicking_spec_is_spec_failure() {
        let mut reg = Registry::new();
        reg.unit::<First>()
            .spec_sync("asserts", |_| {
                let total: u32 = [2, 2].iter().sum();
                assert_eq!(total, 5, "arithmetic is broken");
                Ok(())
            })
            .unwrap();

        let (result, _) = run(reg).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RunErrorKind::SpecFailure);
        assert!(err.detail.unwrap().contains("arithmetic is broken"));
    }

    #[tokio::test]
    async fn cleanup_hook_failure_is_fatal() {
        let mut reg = Registry::new();
        reg.unit::<First>()
            .spec_sync("ok", |_| Ok(()))
            .unwrap()
            .hook_sync("release", HookType::CleanUp, |_| {
                Err(Interrupt::fail("still locked"))
            })
            .unwrap();

        let (result, reporter) = run(reg).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RunErrorKind::HookFailure);
        let last = reporter.events().last().unwrap();
        assert_eq!(last.kind, EventKind::HookFail);
        assert_eq!(last.hook, Some(HookType::CleanUp));
    }
}

mod skips {
    use super::*;

    unit!(Suite);

    #[tokio::test]
    async fn class_skip_reason_wins_outright() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<Suite>()
            .spec_sync("one", note::<Suite>(&log, "one"))
            .unwrap()
            .spec_sync("two", note::<Suite>(&log, "two"))
            .unwrap()
            .skip("one", "spec reason")
            .skip_unit("unit reason");

        let (result, reporter) = run(reg).await;
        let outcome = result.unwrap();
        assert!(entries(&log).is_empty());
        assert_eq!(outcome.summary.skipped, 2);
        let reasons: Vec<Option<&str>> = reporter
            .events()
            .iter()
            .map(|e| e.reason.as_deref())
            .collect();
        assert_eq!(reasons, vec![Some("unit reason"), Some("unit reason")]);
    }

    #[tokio::test]
    async fn dynamic_skip_continues_with_next_spec() {
        let log = new_log();
        let mut reg = Registry::new();
        reg.unit::<Suite>()
            .spec("maybe", |_| async { skip_test("no network") }.boxed())
            .unwrap()
            .spec_sync("after", note::<Suite>(&log, "after"))
            .unwrap();

        let (result, reporter) = run(reg).await;
        let outcome = result.unwrap();
        assert_eq!(entries(&log), vec!["after"]);
        assert_eq!(outcome.summary.dynamic_skipped, 1);
        assert_eq!(outcome.summary.passed, 1);
        assert_eq!(
            reporter.trail(),
            vec![
                (EventKind::DynamicSkip, "Suite".to_owned(), Some("maybe".to_owned())),
                (EventKind::Ok, "Suite".to_owned(), Some("after".to_owned())),
            ]
        );
    }
}

// ── Registration errors ──────────────────────────────────────

mod config_errors {
    use super::*;

    unit!(Unit);

    #[test]
    fn duplicate_spec_key() {
        let mut reg = Registry::new();
        let mut unit = reg.unit::<Unit>();
        unit.spec_sync("same", |_| Ok(())).unwrap();
        let err = unit.spec_sync("same", |_| Ok(())).err().unwrap();
        assert_eq!(err.kind, ConfigErrorKind::DuplicateSpec);
    }

    #[test]
    fn duplicate_hook_key() {
        let mut reg = Registry::new();
        let mut unit = reg.unit::<Unit>();
        unit.hook_sync("same", HookType::Before, |_| Ok(())).unwrap();
        let err = unit
            .hook_sync("same", HookType::AfterEach, |_| Ok(()))
            .err()
            .unwrap();
        assert_eq!(err.kind, ConfigErrorKind::DuplicateHook);
    }

    #[test]
    fn hook_and_spec_share_key() {
        let mut reg = Registry::new();
        let mut unit = reg.unit::<Unit>();
        unit.spec_sync("same", |_| Ok(())).unwrap();
        let err = unit
            .hook_sync("same", HookType::Before, |_| Ok(()))
            .err()
            .unwrap();
        assert_eq!(err.kind, ConfigErrorKind::HookSpecConflict);
        assert_eq!(err.unit, "Unit");
    }

    #[tokio::test]
    async fn empty_registry_is_no_tests_found() {
        let (result, _) = run(Registry::new()).await;
        assert_eq!(result.unwrap_err().kind, RunErrorKind::NoTestsFound);
    }
}
