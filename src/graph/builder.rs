use std::marker::PhantomData;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::graph::registry::{ConfigError, NodeId, Registry};
use crate::model::identity::Identity;
use crate::model::node::HookType;
use crate::model::unit::{TestUnit, erase_async, erase_sync};
use crate::runner::result::UnitResult;

/// Fluent registration for one unit type.
///
/// Specs and hooks registered without an explicit timeout use the run's
/// default timeout.
///
/// ```
/// use dagspec::{ConfigError, HookType, Registry, TestUnit, UnitResult};
/// use futures::FutureExt;
///
/// #[derive(Default)]
/// struct Login {
///     token: Option<String>,
/// }
///
/// impl TestUnit for Login {}
///
/// fn register(registry: &mut Registry) -> Result<(), ConfigError> {
///     registry
///         .unit::<Login>()
///         .hook_sync("before", HookType::Before, |login| {
///             login.token = Some("abc".into());
///             Ok(())
///         })?
///         .spec("has_token", |login| {
///             async move {
///                 assert!(login.token.is_some());
///                 Ok(())
///             }
///             .boxed()
///         })?;
///     Ok(())
/// }
///
/// let mut registry = Registry::new();
/// register(&mut registry).unwrap();
/// assert_eq!(registry.len(), 1);
/// ```
pub struct UnitBuilder<'r, T> {
    registry: &'r mut Registry,
    node: NodeId,
    _unit: PhantomData<fn() -> T>,
}

impl<'r, T: TestUnit + Default> UnitBuilder<'r, T> {
    pub(crate) fn new(registry: &'r mut Registry, node: NodeId) -> Self {
        Self {
            registry,
            node,
            _unit: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn spec<F>(&mut self, key: &str, body: F) -> Result<&mut Self, ConfigError>
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, UnitResult> + Send + Sync + 'static,
    {
        self.registry
            .declare_spec(self.node, key, None, erase_async(body))?;
        Ok(self)
    }

    pub fn spec_timeout<F>(
        &mut self,
        key: &str,
        timeout: Duration,
        body: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, UnitResult> + Send + Sync + 'static,
    {
        self.registry
            .declare_spec(self.node, key, Some(timeout), erase_async(body))?;
        Ok(self)
    }

    /// Register a spec whose body never awaits.
    pub fn spec_sync<F>(&mut self, key: &str, body: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&mut T) -> UnitResult + Send + Sync + 'static,
    {
        self.registry
            .declare_spec(self.node, key, None, erase_sync(body))?;
        Ok(self)
    }

    pub fn hook<F>(
        &mut self,
        key: &str,
        hook_type: HookType,
        body: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, UnitResult> + Send + Sync + 'static,
    {
        self.registry
            .declare_hook(self.node, key, hook_type, None, erase_async(body))?;
        Ok(self)
    }

    pub fn hook_timeout<F>(
        &mut self,
        key: &str,
        hook_type: HookType,
        timeout: Duration,
        body: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, UnitResult> + Send + Sync + 'static,
    {
        self.registry.declare_hook(
            self.node,
            key,
            hook_type,
            Some(timeout),
            erase_async(body),
        )?;
        Ok(self)
    }

    pub fn hook_sync<F>(
        &mut self,
        key: &str,
        hook_type: HookType,
        body: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&mut T) -> UnitResult + Send + Sync + 'static,
    {
        self.registry
            .declare_hook(self.node, key, hook_type, None, erase_sync(body))?;
        Ok(self)
    }

    /// Depend on unit `D`, injected under `key`.
    pub fn depends_on<D: TestUnit + Default>(&mut self, key: &str) -> &mut Self {
        let dependency = self.registry.get_or_create(Identity::of::<D>());
        self.registry.declare_dependency(self.node, key, dependency);
        self
    }

    /// Depend on every listed unit, each injected under its derived key.
    pub fn dependencies<I>(&mut self, dependencies: I) -> &mut Self
    where
        I: IntoIterator<Item = Identity>,
    {
        self.registry
            .declare_dependencies(self.node, dependencies.into_iter().collect());
        self
    }

    /// Like [`dependencies`](Self::dependencies), resolved when the registry
    /// is sealed.
    pub fn dependencies_with<F>(&mut self, resolve: F) -> &mut Self
    where
        F: FnOnce() -> Vec<Identity> + Send + 'static,
    {
        self.registry.defer_dependencies(self.node, resolve);
        self
    }

    /// Make every listed unit depend on this one.
    pub fn dependents<I>(&mut self, dependents: I) -> &mut Self
    where
        I: IntoIterator<Item = Identity>,
    {
        self.registry
            .declare_dependents(self.node, dependents.into_iter().collect());
        self
    }

    pub fn dependents_with<F>(&mut self, resolve: F) -> &mut Self
    where
        F: FnOnce() -> Vec<Identity> + Send + 'static,
    {
        self.registry.defer_dependents(self.node, resolve);
        self
    }

    pub fn skip(&mut self, key: &str, reason: &str) -> &mut Self {
        self.registry.declare_skip(self.node, key, reason);
        self
    }

    /// Skip every spec of the unit.
    pub fn skip_unit(&mut self, reason: &str) -> &mut Self {
        self.registry.declare_class_skip(self.node, reason);
        self
    }
}
