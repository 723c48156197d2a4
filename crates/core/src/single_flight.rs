// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight synchronizer
//!
//! Concurrent `sync` calls collapse onto one execution of the producer. The
//! first caller while idle becomes the owner and drives the producer; every
//! caller arriving while it runs joins a [`WaiterGroup`] and receives the
//! owner's outcome.
//!
//! Dropping a joined caller only withdraws that caller. Dropping the owner
//! interrupts the producer, and every joined caller observes the
//! cancellation as its own outcome.

use crate::error::{BoxError, Cancelled, SyncError};
use crate::reentrancy;
use crate::waiter::{Waiter, WaiterGroup};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub(crate) type Producer<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type StartHook = Arc<dyn Fn() + Send + Sync>;
type FinishHook = Arc<dyn Fn(Option<&SyncError>) + Send + Sync>;

/// Outcome of one physical execution, identical for every joined caller
#[derive(Clone, Debug)]
pub enum SyncOutcome<T> {
    Success(T),
    Failure(Arc<dyn StdError + Send + Sync>),
    Cancelled(Cancelled),
}

impl<T> SyncOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<T, SyncError> {
        match self {
            SyncOutcome::Success(value) => Ok(value),
            SyncOutcome::Failure(err) => Err(match err.downcast_ref::<SyncError>() {
                Some(sync) => sync.clone(),
                None => SyncError::Failed(err),
            }),
            SyncOutcome::Cancelled(cancelled) => Err(SyncError::Cancelled(cancelled)),
        }
    }
}

impl<T> From<Result<T, SyncError>> for SyncOutcome<T> {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(value) => SyncOutcome::Success(value),
            Err(SyncError::Failed(err)) => SyncOutcome::Failure(err),
            Err(SyncError::Cancelled(cancelled)) => SyncOutcome::Cancelled(cancelled),
            Err(other) => SyncOutcome::Failure(Arc::new(other)),
        }
    }
}

/// Lifecycle callbacks around each physical execution
#[derive(Clone, Default)]
pub struct SyncHooks {
    on_start: Option<StartHook>,
    on_finish: Option<FinishHook>,
}

impl SyncHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the owner right before the producer runs
    pub fn with_on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Called once the execution ends; receives the error, if any
    pub fn with_on_finish(
        mut self,
        hook: impl Fn(Option<&SyncError>) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Arc::new(hook));
        self
    }
}

struct Shared<T> {
    tag: u64,
    producer: Producer<T>,
    hooks: SyncHooks,
    waiters: WaiterGroup<SyncOutcome<T>>,
    /// Busy flag; its lock also orders joins against completion
    busy: watch::Sender<bool>,
}

impl<T: Clone> Shared<T> {
    /// Publish the outcome and go idle as one step
    fn complete(&self, result: &Result<T, SyncError>, started: bool) {
        if started {
            if let Some(on_finish) = &self.hooks.on_finish {
                on_finish(result.as_ref().err());
            }
        }
        self.busy.send_modify(|busy| {
            *busy = false;
            let resolved = match result {
                Err(SyncError::Reentrant) => self
                    .waiters
                    .cancel_all(Cancelled::because("producer re-entered its synchronizer")),
                Err(SyncError::Cancelled(cancelled)) => self.waiters.cancel_all(cancelled.clone()),
                other => self.waiters.resume_all(SyncOutcome::from(other.clone())),
            };
            tracing::debug!(
                flight = self.tag,
                joined = resolved,
                ok = result.is_ok(),
                "sync finished"
            );
        });
    }
}

/// Coalesces concurrent calls of one producer
///
/// Cloning yields another handle to the same synchronizer.
pub struct SingleFlight<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::with_hooks(producer, SyncHooks::default())
    }

    pub fn with_hooks<F, Fut>(producer: F, hooks: SyncHooks) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::from_producer(Arc::new(move || producer().boxed()), hooks)
    }

    pub(crate) fn from_producer(producer: Producer<T>, hooks: SyncHooks) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                tag: reentrancy::next_tag(),
                producer,
                hooks,
                waiters: WaiterGroup::new(),
                busy,
            }),
        }
    }

    /// Run the producer, or join the execution already in flight
    pub async fn sync(&self) -> Result<T, SyncError> {
        self.enter()?.finish().await
    }

    /// Like [`sync`](Self::sync), but cancellation is split out as the outer error
    pub async fn sync_or_cancelled(&self) -> Result<Result<T, SyncError>, Cancelled> {
        match self.sync().await {
            Err(SyncError::Cancelled(cancelled)) => Err(cancelled),
            other => Ok(other),
        }
    }

    /// Claim ownership or register as a joiner, without suspending
    pub(crate) fn enter(&self) -> Result<Flight<T>, SyncError> {
        if reentrancy::is_active(self.shared.tag) {
            tracing::warn!(flight = self.shared.tag, "sync called from its own producer");
            return Err(SyncError::Reentrant);
        }

        let mut joined = None;
        let claimed = self.shared.busy.send_if_modified(|busy| {
            if *busy {
                joined = Some(self.shared.waiters.register());
                false
            } else {
                *busy = true;
                true
            }
        });

        debug_assert_eq!(claimed, joined.is_none());
        match joined {
            Some(waiter) => {
                tracing::trace!(flight = self.shared.tag, "joined sync in flight");
                Ok(Flight::Joined(waiter))
            }
            None => Ok(Flight::Owner(OwnerGuard {
                shared: Arc::clone(&self.shared),
                started: false,
                armed: true,
            })),
        }
    }
}

impl<T> SingleFlight<T> {
    pub fn is_syncing(&self) -> bool {
        *self.shared.busy.borrow()
    }

    /// Receiver for the busy flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.busy.subscribe()
    }

    /// Stream of the busy flag, starting with its current value
    pub fn syncing_flow(&self) -> BoxStream<'static, bool> {
        WatchStream::new(self.subscribe()).boxed()
    }

    /// Suspend until no execution is in flight
    pub async fn await_idle(&self) {
        let mut busy = self.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// Whether both handles refer to the same synchronizer
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A caller's role in one execution, decided synchronously by `enter`
pub(crate) enum Flight<T: Clone> {
    Owner(OwnerGuard<T>),
    Joined(Waiter<SyncOutcome<T>>),
}

impl<T: Clone + Send + 'static> Flight<T> {
    pub(crate) async fn finish(self) -> Result<T, SyncError> {
        match self {
            Flight::Owner(guard) => guard.run().await,
            Flight::Joined(waiter) => waiter.await?.into_result(),
        }
    }
}

/// Ownership of the busy slot; releasing it without an outcome broadcasts
/// cancellation to every joined caller
pub(crate) struct OwnerGuard<T: Clone> {
    shared: Arc<Shared<T>>,
    started: bool,
    armed: bool,
}

impl<T: Clone + Send + 'static> OwnerGuard<T> {
    async fn run(mut self) -> Result<T, SyncError> {
        let shared = Arc::clone(&self.shared);
        self.started = true;
        if let Some(on_start) = &shared.hooks.on_start {
            on_start();
        }
        tracing::debug!(flight = shared.tag, "sync started");

        let produced = reentrancy::scope(shared.tag, (shared.producer)()).await;
        let result = produced.map_err(SyncError::from_producer);

        self.armed = false;
        shared.complete(&result, true);
        result
    }
}

impl<T: Clone> Drop for OwnerGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(flight = self.shared.tag, "sync owner cancelled");
        let cancelled = Err(SyncError::Cancelled(Cancelled::because("sync owner cancelled")));
        self.shared.complete(&cancelled, self.started);
    }
}

#[cfg(test)]
#[path = "single_flight_tests.rs"]
mod tests;
