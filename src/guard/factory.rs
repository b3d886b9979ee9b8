// src/guard/factory.rs

//! Name-to-constructor mapping for guards.
//!
//! The configuration layer instantiates guards by name; the map makes that
//! an explicit, closed registration step instead of any runtime lookup of
//! types. An unregistered name is a plain error the caller can report.

use std::collections::HashMap;
use std::fmt;

use crate::errors::{Result, WatchguardError};
use crate::guard::{Guard, GuardOptions};

type GuardFactory = Box<dyn Fn(&GuardOptions) -> anyhow::Result<Box<dyn Guard>> + Send + Sync>;

#[derive(Default)]
pub struct FactoryMap {
    factories: HashMap<String, GuardFactory>,
}

impl fmt::Debug for FactoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FactoryMap").field("names", &names).finish()
    }
}

impl FactoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<N, F>(&mut self, name: N, factory: F)
    where
        N: Into<String>,
        F: Fn(&GuardOptions) -> anyhow::Result<Box<dyn Guard>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// True if a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the guard registered under `name`.
    pub fn create(&self, name: &str, options: &GuardOptions) -> Result<Box<dyn Guard>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| WatchguardError::UnknownGuard(name.to_string()))?;
        Ok(factory(options)?)
    }
}
