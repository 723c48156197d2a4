// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast waiter group
//!
//! A set of suspended callers awaiting one shared value. Resolving the group
//! drains the whole membership in a single swap, so a waiter registered
//! while a resolve is delivering joins the next generation instead.

use crate::error::{Cancelled, SyncError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Resolution<T> = Result<T, SyncError>;

struct Members<T> {
    next_id: u64,
    waiting: HashMap<u64, oneshot::Sender<Resolution<T>>>,
}

impl<T> Members<T> {
    fn drain(&mut self) -> HashMap<u64, oneshot::Sender<Resolution<T>>> {
        std::mem::take(&mut self.waiting)
    }
}

/// Group of callers suspended on a single future value
pub struct WaiterGroup<T> {
    members: Arc<Mutex<Members<T>>>,
}

impl<T> WaiterGroup<T> {
    pub fn new() -> Self {
        Self {
            members: Arc::new(Mutex::new(Members {
                next_id: 0,
                waiting: HashMap::new(),
            })),
        }
    }

    /// Join the group now and get a future for the eventual resolution
    ///
    /// Membership starts at this call, not at the first poll.
    pub fn register(&self) -> Waiter<T> {
        let (tx, rx) = oneshot::channel();
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        let id = members.next_id;
        members.next_id += 1;
        members.waiting.insert(id, tx);
        tracing::trace!(waiter = id, members = members.waiting.len(), "waiter registered");

        Waiter {
            id,
            members: Arc::clone(&self.members),
            rx,
            settled: false,
        }
    }

    /// Suspend until the group is resumed, failed or cancelled
    pub async fn wait(&self) -> Result<T, SyncError> {
        self.register().await
    }

    /// Number of live waiters
    pub fn len(&self) -> usize {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .waiting
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail every current waiter with `err`
    pub fn resume_all_with_error(&self, err: SyncError) -> usize {
        self.resolve(|| Err(err.clone()))
    }

    /// Cancel every current waiter
    pub fn cancel_all(&self, cause: Cancelled) -> usize {
        self.resolve(|| Err(SyncError::Cancelled(cause.clone())))
    }

    fn resolve(&self, mut outcome: impl FnMut() -> Resolution<T>) -> usize {
        let drained = self
            .members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain();
        let count = drained.len();
        for (id, tx) in drained {
            if tx.send(outcome()).is_err() {
                tracing::trace!(waiter = id, "waiter gone before resolution");
            }
        }
        count
    }
}

impl<T: Clone> WaiterGroup<T> {
    /// Complete every current waiter with `value`
    pub fn resume_all(&self, value: T) -> usize {
        self.resolve(|| Ok(value.clone()))
    }
}

impl<T> Default for WaiterGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WaiterGroup<T> {
    fn clone(&self) -> Self {
        Self {
            members: Arc::clone(&self.members),
        }
    }
}

/// One suspended member of a [`WaiterGroup`]
///
/// Dropping an unresolved waiter removes it from its group.
pub struct Waiter<T> {
    id: u64,
    members: Arc<Mutex<Members<T>>>,
    rx: oneshot::Receiver<Resolution<T>>,
    settled: bool,
}

impl<T> Future for Waiter<T> {
    type Output = Result<T, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(resolution) => {
                self.settled = true;
                // A sender dropped without resolving means the group itself went away
                Poll::Ready(resolution.unwrap_or_else(|_| {
                    Err(SyncError::Cancelled(Cancelled::because("waiter group dropped")))
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        if members.waiting.remove(&self.id).is_some() {
            tracing::trace!(waiter = self.id, "waiter withdrew");
        }
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
