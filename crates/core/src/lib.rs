// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! coflow-core: in-process coordination primitives for async work
//!
//! This crate provides:
//! - A broadcast waiter group for callers suspended on one shared value
//! - Single-flight synchronization, globally and per key
//! - A priority-preemptible exclusive executor and a loader built on it
//! - A keyed state store whose entries live only while pinned or observed
//! - A serial sequencer that orders state updates by submission

pub mod config;
pub mod error;
mod reentrancy;
pub mod sequencer;

// Primitives (order matters for dependencies)
pub mod waiter;
pub mod single_flight;
pub mod priority;
pub mod keyed_state;

// Compositions
pub mod keyed_sync;
pub mod loader;

pub use config::{CoordinationConfig, KeyedSyncOptions, LoadOptions, MutationOptions};
pub use error::{BoxError, Cancelled, ConfigError, SyncError};
pub use keyed_state::KeyedStateStore;
pub use keyed_sync::KeyedSynchronizer;
pub use loader::{Loader, LoaderState};
pub use priority::PriorityExecutor;
pub use sequencer::{Sequenced, Sequencer};
pub use single_flight::{SingleFlight, SyncHooks, SyncOutcome};
pub use waiter::{Waiter, WaiterGroup};
