// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight synchronization per key
//!
//! Each key gets its own [`SingleFlight`] while a sync for it is in flight.
//! The busy flag of every key is published through a
//! [`KeyedStateStore<bool>`], so observers of a key see `true` while it
//! syncs and the flag entry goes away once nobody is watching.

use crate::config::KeyedSyncOptions;
use crate::error::{BoxError, SyncError};
use crate::keyed_state::KeyedStateStore;
use crate::sequencer::Sequencer;
use crate::single_flight::{Producer, SingleFlight, SyncHooks};
use futures::stream::BoxStream;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type Flights<T> = Mutex<HashMap<String, SingleFlight<T>>>;

/// Coalesces concurrent syncs of the same key
///
/// Cloning yields another handle to the same synchronizer.
pub struct KeyedSynchronizer<T> {
    flights: Arc<Flights<T>>,
    busy: KeyedStateStore<bool>,
    options: KeyedSyncOptions,
}

impl<T: Clone + Send + 'static> KeyedSynchronizer<T> {
    pub fn new() -> Self {
        Self::with_options(KeyedSyncOptions::default())
    }

    pub fn with_options(options: KeyedSyncOptions) -> Self {
        Self::with_store(KeyedStateStore::new(|_| false), options)
    }

    /// Synchronizer publishing busy flags in order on `sequencer`
    pub fn with_sequencer(sequencer: Sequencer, options: KeyedSyncOptions) -> Self {
        Self::with_store(KeyedStateStore::with_sequencer(sequencer, |_| false), options)
    }

    fn with_store(busy: KeyedStateStore<bool>, options: KeyedSyncOptions) -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            busy,
            options,
        }
    }

    /// Run `block` for `key`, or join the sync already in flight for it
    ///
    /// A joining caller's `block` is not used.
    pub async fn sync<F, Fut>(&self, key: &str, block: F) -> Result<T, SyncError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let (synchronizer, flight) = {
            let mut flights = self.flights();
            let synchronizer = match flights.get(key) {
                Some(active) if active.is_syncing() => active.clone(),
                _ => {
                    let fresh = self.synchronizer(key, block);
                    flights.insert(key.to_string(), fresh.clone());
                    fresh
                }
            };
            // Entered under the lock so the entry cannot be swapped meanwhile
            let flight = synchronizer.enter();
            (synchronizer, flight)
        };

        let _resident = Resident {
            flights: &self.flights,
            key,
            synchronizer,
        };
        flight?.finish().await
    }

    fn synchronizer<F, Fut>(&self, key: &str, block: F) -> SingleFlight<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let busy = self.busy.clone();
        let key = key.to_string();
        let release = self.options.release_on_idle;
        let producer: Producer<T> = Arc::new(move || {
            let flag = BusyFlag::raise(busy.clone(), key.clone(), release);
            let work = block();
            async move {
                let _flag = flag;
                work.await
            }
            .boxed()
        });
        SingleFlight::from_producer(producer, SyncHooks::default())
    }
}

impl<T> KeyedSynchronizer<T> {
    /// Whether a sync for `key` is in flight
    pub fn is_syncing(&self, key: &str) -> bool {
        self.flights()
            .get(key)
            .is_some_and(|synchronizer| synchronizer.is_syncing())
    }

    /// Stream of the busy flag of `key`, starting with its current value
    pub fn syncing_flow(&self, key: &str) -> BoxStream<'static, bool> {
        self.busy.flow_of(key)
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<String, SingleFlight<T>>> {
        self.flights.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Clone for KeyedSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
            busy: self.busy.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for KeyedSynchronizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops the key's synchronizer once it is idle again
struct Resident<'a, T> {
    flights: &'a Flights<T>,
    key: &'a str,
    synchronizer: SingleFlight<T>,
}

impl<T> Drop for Resident<'_, T> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        let finished = flights.get(self.key).is_some_and(|current| {
            SingleFlight::same(current, &self.synchronizer) && !current.is_syncing()
        });
        if finished {
            flights.remove(self.key);
            tracing::trace!(key = self.key, "keyed synchronizer dropped");
        }
    }
}

/// Publishes `true` for a key while held, `false` once dropped
struct BusyFlag {
    busy: KeyedStateStore<bool>,
    key: String,
    release: bool,
}

impl BusyFlag {
    fn raise(busy: KeyedStateStore<bool>, key: String, release: bool) -> Self {
        tracing::debug!(key = %key, "keyed sync started");
        busy.update(key.clone(), true);
        Self { busy, key, release }
    }
}

impl Drop for BusyFlag {
    fn drop(&mut self) {
        let key = std::mem::take(&mut self.key);
        tracing::debug!(key = %key, "keyed sync finished");
        if self.release {
            self.busy.update_and_release(key, false);
        } else {
            self.busy.update(key, false);
        }
    }
}

#[cfg(test)]
#[path = "keyed_sync_tests.rs"]
mod tests;
