// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed state registry with reference-counted entries
//!
//! Each key maps to a broadcastable current value. An entry exists while it
//! is pinned by an `update` or observed by at least one `flow_of` stream;
//! once it is releasable and unobserved it is removed, and the next
//! subscription starts again from the default factory.
//!
//! Every structural change runs as a unit on a [`Sequencer`], so updates are
//! applied in the order they were submitted.

use crate::sequencer::Sequencer;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

type DefaultFn<T> = Box<dyn Fn(&str) -> T + Send + Sync>;

struct Entry<T> {
    value: watch::Sender<T>,
    releasable: bool,
    subscribers: usize,
}

impl<T> Entry<T> {
    fn new(initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value,
            releasable: true,
            subscribers: 0,
        }
    }
}

struct Registry<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    default: DefaultFn<T>,
    sequencer: Sequencer,
}

impl<T: Clone + PartialEq> Registry<T> {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn get(&self, key: &str) -> Option<T> {
        self.entries()
            .get(key)
            .map(|entry| entry.value.borrow().clone())
    }

    fn apply(&self, key: &str, value: T, release: bool) {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(value.clone()));
        // Equal values do not re-notify subscribers
        entry.value.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        entry.releasable = release;
        release_if_idle(&mut entries, key);
    }

    fn subscribe(&self, key: &str) -> watch::Receiver<T> {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new((self.default)(key)));
        entry.subscribers += 1;
        tracing::trace!(key, subscribers = entry.subscribers, "keyed state subscribed");
        entry.value.subscribe()
    }

    fn unsubscribe(&self, key: &str) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
        release_if_idle(&mut entries, key);
    }
}

fn release_if_idle<T>(entries: &mut HashMap<String, Entry<T>>, key: &str) {
    let idle = entries
        .get(key)
        .is_some_and(|entry| entry.releasable && entry.subscribers == 0);
    if idle {
        entries.remove(key);
        tracing::debug!(key, "keyed state released");
    }
}

/// Registry from key to an observable value with automatic lifecycle
///
/// Cloning yields another handle to the same registry.
pub struct KeyedStateStore<T> {
    registry: Arc<Registry<T>>,
}

impl<T> KeyedStateStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Store ordered by the process-wide [`Sequencer::global`]
    pub fn new(default: impl Fn(&str) -> T + Send + Sync + 'static) -> Self {
        Self::with_sequencer(Sequencer::global().clone(), default)
    }

    pub fn with_sequencer(
        sequencer: Sequencer,
        default: impl Fn(&str) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry: Arc::new(Registry {
                entries: Mutex::new(HashMap::new()),
                default: Box::new(default),
                sequencer,
            }),
        }
    }

    /// Number of live entries, read after every previously submitted update
    pub async fn size(&self) -> usize {
        let registry = Arc::clone(&self.registry);
        let size = self
            .registry
            .sequencer
            .submit(async move { registry.len() })
            .await;
        size.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "keyed state size unavailable");
            0
        })
    }

    /// Current value for `key`, if the entry exists
    pub async fn get(&self, key: &str) -> Option<T> {
        let registry = Arc::clone(&self.registry);
        let key = key.to_string();
        let value = self
            .registry
            .sequencer
            .submit(async move { registry.get(&key) })
            .await;
        value.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "keyed state read unavailable");
            None
        })
    }

    /// Set `key` to `value` and pin the entry
    pub fn update(&self, key: impl Into<String>, value: T) {
        self.submit_update(key.into(), value, false);
    }

    /// Set `key` to `value`, then let the entry go once unobserved
    pub fn update_and_release(&self, key: impl Into<String>, value: T) {
        self.submit_update(key.into(), value, true);
    }

    fn submit_update(&self, key: String, value: T, release: bool) {
        let registry = Arc::clone(&self.registry);
        self.registry
            .sequencer
            .launch(async move { registry.apply(&key, value, release) });
    }

    /// Stream of the values of `key`, starting with its current value
    ///
    /// The stream is cold: it subscribes on first poll and unsubscribes when
    /// dropped. Values are conflated, so a slow consumer sees the latest
    /// value rather than every intermediate one.
    pub fn flow_of(&self, key: impl Into<String>) -> BoxStream<'static, T> {
        let start = FlowState::Pending {
            registry: Arc::clone(&self.registry),
            key: key.into(),
        };
        stream::unfold(start, |state| async move {
            match state {
                FlowState::Pending { registry, key } => {
                    // Leased before subscribing so a drop mid-subscribe still
                    // queues the matching unsubscribe
                    let lease = Lease {
                        registry: Arc::clone(&registry),
                        key: key.clone(),
                    };
                    let subscriber = Arc::clone(&registry);
                    let mut rx = registry
                        .sequencer
                        .submit(async move { subscriber.subscribe(&key) })
                        .await
                        .ok()?;
                    let first = rx.borrow_and_update().clone();
                    Some((first, FlowState::Live { rx, lease }))
                }
                FlowState::Live { mut rx, lease } => {
                    rx.changed().await.ok()?;
                    let next = rx.borrow_and_update().clone();
                    Some((next, FlowState::Live { rx, lease }))
                }
            }
        })
        .boxed()
    }
}

impl<T> Clone for KeyedStateStore<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

enum FlowState<T: Clone + PartialEq + Send + Sync + 'static> {
    Pending {
        registry: Arc<Registry<T>>,
        key: String,
    },
    Live {
        rx: watch::Receiver<T>,
        lease: Lease<T>,
    },
}

/// One subscription's share of an entry; dropping it unsubscribes
struct Lease<T: Clone + PartialEq + Send + Sync + 'static> {
    registry: Arc<Registry<T>>,
    key: String,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Drop for Lease<T> {
    fn drop(&mut self) {
        let registry = Arc::clone(&self.registry);
        let key = std::mem::take(&mut self.key);
        self.registry
            .sequencer
            .launch(async move { registry.unsubscribe(&key) });
    }
}

#[cfg(test)]
#[path = "keyed_state_tests.rs"]
mod tests;
