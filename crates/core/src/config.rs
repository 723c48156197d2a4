// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constructor-time options for loaders, keyed synchronizers and mutations

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Options for a single load
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Publish loading-state transitions while the load runs
    pub notify_loading: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            notify_loading: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notify_loading(mut self, notify: bool) -> Self {
        self.notify_loading = notify;
        self
    }
}

/// Options for a keyed synchronizer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyedSyncOptions {
    /// Let a key's busy flag be discarded once idle and unobserved
    pub release_on_idle: bool,
}

impl Default for KeyedSyncOptions {
    fn default() -> Self {
        Self {
            release_on_idle: true,
        }
    }
}

impl KeyedSyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release_on_idle(mut self, release: bool) -> Self {
        self.release_on_idle = release;
        self
    }
}

/// Options for a prioritized mutation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationOptions {
    /// Preemption rank; equal or higher interrupts the active mutation
    pub priority: i32,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// All coordination options, loadable from a TOML document
///
/// ```toml
/// [loader]
/// notify_loading = false
///
/// [keyed_sync]
/// release_on_idle = true
///
/// [mutation]
/// priority = 2
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub loader: LoadOptions,
    pub keyed_sync: KeyedSyncOptions,
    pub mutation: MutationOptions,
}

impl CoordinationConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
