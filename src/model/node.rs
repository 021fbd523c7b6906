use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::identity::Identity;
use crate::model::unit::{Callable, UnitHandle};

/// When a hook fires relative to the unit's specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    /// Once, before the first spec.
    Before,
    /// Once, after the last spec.
    After,
    /// Before every spec that is not skipped.
    BeforeEach,
    /// After every spec that passed.
    AfterEach,
    /// Once every dependent unit has finished.
    CleanUp,
}

impl HookType {
    /// Conventional key for a hook of this type, e.g. `beforeEach`.
    pub fn conventional_key(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
            Self::CleanUp => "cleanUp",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.conventional_key())
    }
}

#[derive(Clone)]
pub(crate) struct SpecEntry {
    pub key: String,
    /// `None` falls back to the run's default timeout.
    pub timeout: Option<Duration>,
    pub callable: Callable,
}

#[derive(Clone)]
pub(crate) struct HookEntry {
    pub key: String,
    pub hook_type: HookType,
    pub timeout: Option<Duration>,
    pub callable: Callable,
}

/// A static skip declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SkipEntry {
    pub reason: String,
}

/// Weight of a dependency edge in the registry graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Key the dependency instance is injected under.
    pub property_key: String,
}

/// One registered test unit and its lifecycle tables.
pub struct TestNode {
    identity: Identity,
    pub(crate) specs: Vec<SpecEntry>,
    pub(crate) hooks: Vec<HookEntry>,
    skip: HashMap<String, SkipEntry>,
    skip_class: Option<SkipEntry>,
    instance: Option<UnitHandle>,
    is_finished: bool,
    clean_up_called: bool,
}

impl TestNode {
    pub(crate) fn new(identity: Identity) -> Self {
        Self {
            identity,
            specs: Vec::new(),
            hooks: Vec::new(),
            skip: HashMap::new(),
            skip_class: None,
            instance: None,
            is_finished: false,
            clean_up_called: false,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn name(&self) -> &'static str {
        self.identity.name()
    }

    pub fn has_spec(&self, key: &str) -> bool {
        self.specs.iter().any(|s| s.key == key)
    }

    pub fn has_hook(&self, key: &str) -> bool {
        self.hooks.iter().any(|h| h.key == key)
    }

    /// Spec keys in declaration order.
    pub fn spec_keys(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.key.as_str())
    }

    /// Hook keys of one type in declaration order.
    pub fn hook_keys(&self, hook_type: HookType) -> impl Iterator<Item = &str> {
        self.hooks
            .iter()
            .filter(move |h| h.hook_type == hook_type)
            .map(|h| h.key.as_str())
    }

    pub(crate) fn hooks_of(&self, hook_type: HookType) -> Vec<HookEntry> {
        self.hooks
            .iter()
            .filter(|h| h.hook_type == hook_type)
            .cloned()
            .collect()
    }

    pub(crate) fn add_skip(&mut self, key: &str, reason: &str) {
        match self.skip.get_mut(key) {
            Some(entry) => {
                if !reason.is_empty() {
                    if !entry.reason.is_empty() {
                        entry.reason.push_str(", ");
                    }
                    entry.reason.push_str(reason);
                }
            }
            None => {
                self.skip.insert(
                    key.to_owned(),
                    SkipEntry {
                        reason: reason.to_owned(),
                    },
                );
            }
        }
    }

    pub(crate) fn set_class_skip(&mut self, reason: &str) {
        self.skip_class = Some(SkipEntry {
            reason: reason.to_owned(),
        });
    }

    pub fn skip_entry(&self, key: &str) -> Option<&SkipEntry> {
        self.skip.get(key)
    }

    pub fn class_skip(&self) -> Option<&SkipEntry> {
        self.skip_class.as_ref()
    }

    /// Static skip for a spec. A unit-wide skip wins outright over the
    /// spec's own entry; the reasons are not merged.
    pub fn static_skip(&self, key: &str) -> Option<&SkipEntry> {
        self.skip_class.as_ref().or_else(|| self.skip.get(key))
    }

    /// The unit instance, created on first use.
    pub(crate) fn instance(&mut self) -> UnitHandle {
        let identity = self.identity;
        self.instance
            .get_or_insert_with(|| identity.instantiate())
            .clone()
    }

    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub(crate) fn mark_finished(&mut self) {
        self.is_finished = true;
    }

    pub fn clean_up_called(&self) -> bool {
        self.clean_up_called
    }

    /// Flip the cleanup guard. Returns `false` when cleanup already ran.
    pub(crate) fn begin_clean_up(&mut self) -> bool {
        !std::mem::replace(&mut self.clean_up_called, true)
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("name", &self.name())
            .field("specs", &self.specs.len())
            .field("hooks", &self.hooks.len())
            .field("is_finished", &self.is_finished)
            .field("clean_up_called", &self.clean_up_called)
            .finish()
    }
}
