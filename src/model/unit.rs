use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard};

use crate::model::identity::display_name;
use crate::runner::result::{Interrupt, UnitResult};

/// A test unit: the state its specs and hooks run against.
///
/// One instance is created per run (via `Default`) the first time the unit
/// is scheduled. Dependency instances are handed over through [`inject`]
/// before any hook or spec of the unit runs.
///
/// [`inject`]: TestUnit::inject
pub trait TestUnit: Send + 'static {
    /// Bind a finished dependency under the key it was declared with.
    ///
    /// The default implementation ignores every dependency.
    fn inject(&mut self, key: &str, dependency: UnitHandle) {
        let _ = (key, dependency);
    }
}

/// Shared access to a unit instance held by another unit.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    /// Lock the instance. The scheduler never runs two units at once, so
    /// this only waits when the caller itself already holds the lock.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().await
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&type_name::<T>()).finish()
    }
}

trait ErasedUnit: Send + Sync + 'static {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn inject(&self, key: String, dependency: UnitHandle) -> BoxFuture<'_, ()>;
}

impl<T: TestUnit> ErasedUnit for Mutex<T> {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn inject(&self, key: String, dependency: UnitHandle) -> BoxFuture<'_, ()> {
        async move { self.lock().await.inject(&key, dependency) }.boxed()
    }
}

/// Type-erased handle to a unit instance.
#[derive(Clone)]
pub struct UnitHandle {
    unit: Arc<dyn ErasedUnit>,
    name: &'static str,
}

impl UnitHandle {
    pub(crate) fn new<T: TestUnit>(unit: T) -> Self {
        Self {
            unit: Arc::new(Mutex::new(unit)),
            name: display_name(type_name::<T>()),
        }
    }

    /// Display name of the unit type behind this handle.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Typed access, or `None` when the handle holds a different unit type.
    pub fn downcast<T: TestUnit>(&self) -> Option<Shared<T>> {
        Arc::clone(&self.unit)
            .into_any()
            .downcast::<Mutex<T>>()
            .ok()
            .map(Shared)
    }

    pub(crate) async fn inject(&self, key: &str, dependency: UnitHandle) {
        self.unit.inject(key.to_owned(), dependency).await;
    }

    /// Whether both handles point at the same instance.
    pub fn same_instance(&self, other: &UnitHandle) -> bool {
        Arc::ptr_eq(&self.unit, &other.unit)
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle").field("name", &self.name).finish()
    }
}

/// A registered spec or hook body, erased over the unit type.
pub(crate) type Callable = Arc<dyn Fn(UnitHandle) -> BoxFuture<'static, UnitResult> + Send + Sync>;

fn expect_unit<T: TestUnit>(handle: &UnitHandle) -> Result<Shared<T>, Interrupt> {
    handle.downcast::<T>().ok_or_else(|| {
        Interrupt::fail(format!(
            "instance of {} cannot run a callable registered for {}",
            handle.name(),
            display_name(type_name::<T>())
        ))
    })
}

/// Erase an async callable borrowing the unit mutably.
pub(crate) fn erase_async<T, F>(callable: F) -> Callable
where
    T: TestUnit,
    F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, UnitResult> + Send + Sync + 'static,
{
    let callable = Arc::new(callable);
    Arc::new(move |handle: UnitHandle| {
        let callable = Arc::clone(&callable);
        async move {
            let shared = expect_unit::<T>(&handle)?;
            let mut unit = shared.lock().await;
            callable(&mut *unit).await
        }
        .boxed()
    })
}

/// Erase a synchronous callable. It still runs inside the future so a panic
/// is caught by the executor like any other failure.
pub(crate) fn erase_sync<T, F>(callable: F) -> Callable
where
    T: TestUnit,
    F: Fn(&mut T) -> UnitResult + Send + Sync + 'static,
{
    let callable = Arc::new(callable);
    Arc::new(move |handle: UnitHandle| {
        let callable = Arc::clone(&callable);
        async move {
            let shared = expect_unit::<T>(&handle)?;
            let mut unit = shared.lock().await;
            callable(&mut *unit)
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        hits: u32,
        peer: Option<Shared<Peer>>,
    }

    impl TestUnit for Counter {
        fn inject(&mut self, key: &str, dependency: UnitHandle) {
            if key == "peer" {
                self.peer = dependency.downcast();
            }
        }
    }

    #[derive(Default)]
    struct Peer {
        value: u32,
    }

    impl TestUnit for Peer {}

    #[test]
    fn handle_name_is_short_type_name() {
        let handle = UnitHandle::new(Counter::default());
        assert_eq!(handle.name(), "Counter");
    }

    #[test]
    fn downcast_to_wrong_type_is_none() {
        let handle = UnitHandle::new(Counter::default());
        assert!(handle.downcast::<Peer>().is_none());
        assert!(handle.downcast::<Counter>().is_some());
    }

    #[test]
    fn cloned_handles_share_instance() {
        let handle = UnitHandle::new(Counter::default());
        let other = handle.clone();
        assert!(handle.same_instance(&other));
        assert!(!handle.same_instance(&UnitHandle::new(Counter::default())));
    }

    #[tokio::test]
    async fn inject_binds_dependency() {
        let counter = UnitHandle::new(Counter::default());
        let peer = UnitHandle::new(Peer { value: 7 });
        counter.inject("peer", peer).await;

        let shared = counter.downcast::<Counter>().unwrap();
        let unit = shared.lock().await;
        let peer = unit.peer.as_ref().expect("peer injected");
        assert_eq!(peer.lock().await.value, 7);
    }

    #[tokio::test]
    async fn inject_with_unknown_key_is_ignored() {
        let counter = UnitHandle::new(Counter::default());
        counter.inject("other", UnitHandle::new(Peer::default())).await;
        let shared = counter.downcast::<Counter>().unwrap();
        assert!(shared.lock().await.peer.is_none());
    }

    #[tokio::test]
    async fn erased_async_callable_mutates_unit() {
        fn bump(unit: &mut Counter) -> BoxFuture<'_, UnitResult> {
            async move {
                unit.hits += 1;
                Ok(())
            }
            .boxed()
        }

        let handle = UnitHandle::new(Counter::default());
        let callable = erase_async(bump);
        callable(handle.clone()).await.unwrap();
        callable(handle.clone()).await.unwrap();

        let shared = handle.downcast::<Counter>().unwrap();
        assert_eq!(shared.lock().await.hits, 2);
    }

    #[tokio::test]
    async fn erased_sync_callable_mutates_unit() {
        let handle = UnitHandle::new(Counter::default());
        let callable = erase_sync(|unit: &mut Counter| {
            unit.hits = 10;
            Ok(())
        });
        callable(handle.clone()).await.unwrap();
        let shared = handle.downcast::<Counter>().unwrap();
        assert_eq!(shared.lock().await.hits, 10);
    }

    #[tokio::test]
    async fn erased_callable_rejects_foreign_instance() {
        let handle = UnitHandle::new(Peer::default());
        let callable = erase_sync(|_: &mut Counter| Ok(()));
        let err = callable(handle).await.unwrap_err();
        assert!(matches!(err, Interrupt::Fail(_)));
    }
}
