// src/guard/registry.rs

//! The ordered collection of registered guards.
//!
//! Entries keep registration order; matching, dispatch, and lifecycle
//! passes all iterate in that order. A faulted guard's entry stays in the
//! registry carrying its fault, deactivated, so the name cannot be reused
//! within the run.

use std::fmt;

use tracing::debug;

use crate::errors::{Result, WatchguardError};
use crate::guard::{Callback, Guard, GuardFault, GuardOptions, HookEvent};
use crate::watch::patterns::{self, WatchPattern};

/// One registered guard with everything dispatch needs to know about it.
pub struct GuardEntry {
    name: String,
    guard: Box<dyn Guard>,
    watchers: Vec<WatchPattern>,
    callbacks: Vec<Callback>,
    options: GuardOptions,
    active: bool,
    fault: Option<GuardFault>,
}

impl fmt::Debug for GuardEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardEntry")
            .field("name", &self.name)
            .field("group", &self.options.group)
            .field("watchers", &self.watchers.len())
            .field("active", &self.active)
            .field("fault", &self.fault.is_some())
            .finish_non_exhaustive()
    }
}

impl GuardEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.options.group
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    pub fn watchers(&self) -> &[WatchPattern] {
        &self.watchers
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The fault that quarantined this guard, if one did.
    pub fn fault(&self) -> Option<&GuardFault> {
        self.fault.as_ref()
    }

    /// Paths this guard should act on for the given changed set.
    pub fn match_files(&self, changed: &[String]) -> Vec<String> {
        patterns::match_files(&self.watchers, changed)
    }

    /// True if any of this guard's patterns matches any changed path.
    pub fn matches_any(&self, changed: &[String]) -> bool {
        patterns::matches_any(&self.watchers, changed)
    }

    pub(crate) fn guard_mut(&mut self) -> &mut dyn Guard {
        self.guard.as_mut()
    }

    pub(crate) fn fire_hooks(&mut self, event: HookEvent) {
        for callback in &mut self.callbacks {
            callback.fire(event);
        }
    }
}

/// Ordered guard collection, addressed by name.
#[derive(Debug, Default)]
pub struct GuardRegistry {
    entries: Vec<GuardEntry>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guard with its watch patterns, hooks, and options.
    ///
    /// Names are unique for the life of the registry: a second registration
    /// under the same name is rejected, including names whose guard already
    /// faulted (those entries stay, quarantined).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        guard: Box<dyn Guard>,
        watchers: Vec<WatchPattern>,
        callbacks: Vec<Callback>,
        options: GuardOptions,
    ) -> Result<()> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(WatchguardError::DuplicateGuard(name));
        }
        debug!(guard = %name, group = %options.group, "guard registered");
        self.entries.push(GuardEntry {
            name,
            guard,
            watchers,
            callbacks,
            options,
            active: true,
            fault: None,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<&GuardEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut GuardEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// Names of active guards, in registration order.
    pub fn active_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Names of active guards with at least one pattern matching at least
    /// one changed path, in registration order.
    pub fn matching_guards(&self, changed: &[String]) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.active && e.matches_any(changed))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Deactivate guards outside the listed groups. An empty list keeps
    /// every group in scope.
    pub fn scope_to_groups(&mut self, groups: &[String]) {
        if groups.is_empty() {
            return;
        }
        for entry in &mut self.entries {
            let in_scope = groups.iter().any(|g| g.as_str() == entry.group());
            if entry.active && !in_scope {
                debug!(guard = %entry.name, group = %entry.group(), "guard out of group scope");
                entry.active = false;
            }
        }
    }

    /// Quarantine a guard: deactivate it and record the fault on its entry.
    pub(crate) fn deactivate(&mut self, name: &str, fault: GuardFault) {
        if let Some(entry) = self.entry_mut(name) {
            entry.active = false;
            entry.fault = Some(fault);
        }
    }
}
