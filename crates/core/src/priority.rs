// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority-preemptible exclusive executor
//!
//! At most one mutation occupies the slot. A request with equal or higher
//! priority cancels the occupant and takes its place; a request with
//! strictly lower priority is rejected without running. Bodies are further
//! serialized by an async lock, so a replacement body only starts after the
//! body it preempted has unwound.

use crate::config::MutationOptions;
use crate::error::{Cancelled, SyncError};
use arc_swap::ArcSwapOption;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The occupant of the mutation slot
struct Mutation {
    id: u64,
    priority: i32,
    /// Fired to interrupt the mutation
    cancel: CancellationToken,
    /// Fired once the mutation has fully unwound
    finished: CancellationToken,
}

impl Mutation {
    fn can_interrupt(&self, other: &Mutation) -> bool {
        self.priority >= other.priority
    }
}

fn same(a: &Option<Arc<Mutation>>, b: &Option<Arc<Mutation>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Mutual exclusion over a single "current operation" with priority preemption
pub struct PriorityExecutor {
    current: ArcSwapOption<Mutation>,
    lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl PriorityExecutor {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Whether a mutation currently occupies the slot
    pub fn is_active(&self) -> bool {
        self.current.load().is_some()
    }

    /// Priority of the current occupant, if any
    pub fn active_priority(&self) -> Option<i32> {
        self.current.load_full().map(|m| m.priority)
    }

    /// Run `block` as the sole mutation, preempting lower-or-equal priority
    ///
    /// Returns `Cancelled` if this mutation is itself preempted or cancelled
    /// before `block` completes, and `Preempted` if a strictly higher
    /// priority mutation is active.
    pub async fn mutate<R, F, Fut>(&self, priority: i32, block: F) -> Result<R, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let mutation = Arc::new(Mutation {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            priority,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        });
        self.install(&mutation)?;
        let _slot = SlotRelease {
            current: &self.current,
            mutation: Arc::clone(&mutation),
        };

        tokio::select! {
            biased;
            _ = mutation.cancel.cancelled() => {
                tracing::debug!(mutation = mutation.id, priority, "mutation interrupted");
                Err(SyncError::Cancelled(Cancelled::because("mutation interrupted")))
            }
            value = async {
                let _exclusive = self.lock.lock().await;
                block().await
            } => Ok(value),
        }
    }

    /// [`mutate`](Self::mutate) with priority taken from options
    pub async fn mutate_with<R, F, Fut>(
        &self,
        options: &MutationOptions,
        block: F,
    ) -> Result<R, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        self.mutate(options.priority, block).await
    }

    /// Cancel the active mutation, if any, and wait until it has terminated
    ///
    /// Repeats until the slot is observed empty, since another mutation may
    /// install itself while the previous one is unwinding.
    pub async fn cancel_and_join(&self) {
        loop {
            let Some(active) = self.current.load_full() else {
                return;
            };
            tracing::debug!(mutation = active.id, "cancelling mutation");
            active.cancel.cancel();
            active.finished.cancelled().await;
            self.current
                .compare_and_swap(&Some(Arc::clone(&active)), None::<Arc<Mutation>>);
        }
    }

    /// Compare-and-swap loop placing `mutation` in the slot
    fn install(&self, mutation: &Arc<Mutation>) -> Result<(), SyncError> {
        loop {
            let current = self.current.load_full();
            if let Some(active) = &current {
                if !mutation.can_interrupt(active) {
                    tracing::debug!(
                        active = active.priority,
                        requested = mutation.priority,
                        "mutation rejected"
                    );
                    return Err(SyncError::Preempted {
                        active: active.priority,
                        requested: mutation.priority,
                    });
                }
            }

            let previous = self
                .current
                .compare_and_swap(&current, Some(Arc::clone(mutation)));
            if same(&previous, &current) {
                if let Some(replaced) = current {
                    tracing::debug!(
                        mutation = mutation.id,
                        replaced = replaced.id,
                        priority = mutation.priority,
                        "mutation preempted previous"
                    );
                    replaced.cancel.cancel();
                }
                return Ok(());
            }
        }
    }
}

impl Default for PriorityExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the slot if still ours and signals completion
struct SlotRelease<'a> {
    current: &'a ArcSwapOption<Mutation>,
    mutation: Arc<Mutation>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.current
            .compare_and_swap(&Some(Arc::clone(&self.mutation)), None::<Arc<Mutation>>);
        self.mutation.finished.cancel();
    }
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
