// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by every coordination primitive

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by caller-supplied work
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Marker for a cancelled operation, with an optional cause
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cancelled {
    cause: Option<Arc<str>>,
}

impl Cancelled {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation tagged with a cause
    pub fn because(cause: impl Into<Arc<str>>) -> Self {
        Self {
            cause: Some(cause.into()),
        }
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "operation cancelled: {}", cause),
            None => write!(f, "operation cancelled"),
        }
    }
}

impl StdError for Cancelled {}

/// Outcome error of a sync, load, mutation or sequenced unit
///
/// Cloneable so that one execution's outcome can be handed to every caller
/// that joined it.
#[derive(Clone, Debug, Error)]
pub enum SyncError {
    /// Caller-supplied work failed
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync>),
    /// The operation was cancelled, either externally or by the work itself
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// A synchronizer was invoked from inside its own producer
    #[error("sync called from within its own producer")]
    Reentrant,
    /// A mutation with strictly higher priority is active
    #[error("superseded by higher priority mutation (active {active}, requested {requested})")]
    Preempted { active: i32, requested: i32 },
    /// A sequenced unit panicked before producing a value
    #[error("sequenced unit panicked: {0}")]
    Panicked(String),
}

impl SyncError {
    /// Classify an error returned by caller-supplied work
    ///
    /// `SyncError` and `Cancelled` values keep their meaning; anything else
    /// becomes a `Failed`.
    pub fn from_producer(err: BoxError) -> Self {
        let err = match err.downcast::<SyncError>() {
            Ok(sync) => return *sync,
            Err(other) => other,
        };
        match err.downcast::<Cancelled>() {
            Ok(cancelled) => SyncError::Cancelled(*cancelled),
            Err(other) => SyncError::Failed(Arc::from(other)),
        }
    }

    /// Wrap an arbitrary error as a producer failure
    pub fn failed(err: impl StdError + Send + Sync + 'static) -> Self {
        SyncError::Failed(Arc::new(err))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled(_))
    }

    /// True for the conditions that reject a call outright
    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::Reentrant | SyncError::Preempted { .. })
    }
}

/// Failure to load coordination configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid coordination config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
