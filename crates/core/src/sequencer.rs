// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serial execution context
//!
//! Units of work run one at a time, in the order they were submitted. A
//! unit that panics is reported to its own handle and never stops the
//! sequencer or the units queued behind it.

use crate::error::{Cancelled, SyncError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

type Unit = BoxFuture<'static, ()>;

/// Handle to a serial queue of units of work
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct Sequencer {
    queue: mpsc::UnboundedSender<Unit>,
}

impl Sequencer {
    /// Start a sequencer whose worker runs on the current tokio runtime
    ///
    /// Must be called from within a runtime.
    pub fn new() -> Self {
        Self::spawn_on(&Handle::current())
    }

    /// Start a sequencer whose worker runs on `handle`
    pub fn spawn_on(handle: &Handle) -> Self {
        let (queue, units) = mpsc::unbounded_channel();
        handle.spawn(drain(units));
        Self { queue }
    }

    /// Process-wide sequencer, driven by its own thread for the process lifetime
    pub fn global() -> &'static Sequencer {
        static GLOBAL: OnceLock<Sequencer> = OnceLock::new();
        GLOBAL.get_or_init(Sequencer::dedicated)
    }

    fn dedicated() -> Self {
        let (queue, units) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("coflow-sequencer".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(drain(units)),
                    Err(e) => tracing::error!(error = %e, "sequencer runtime failed to start"),
                }
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "sequencer thread failed to start");
        }
        Self { queue }
    }

    /// Queue `work` behind every unit submitted before it
    pub fn submit<F, R>(&self, work: F) -> Sequenced<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue(async move {
            AssertUnwindSafe(work).catch_unwind().await.map_err(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::warn!(panic = %message, "sequenced unit panicked");
                SyncError::Panicked(message)
            })
        })
    }

    /// Queue `work` in order, but execute it on another runtime
    ///
    /// The sequencer waits for it to finish before starting the next unit.
    pub fn submit_on<F, R>(&self, handle: Handle, work: F) -> Sequenced<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue(async move {
            handle.spawn(work).await.map_err(|e| {
                if e.is_panic() {
                    let message = panic_message(e.into_panic().as_ref());
                    tracing::warn!(panic = %message, "sequenced unit panicked");
                    SyncError::Panicked(message)
                } else {
                    SyncError::Cancelled(Cancelled::because("sequenced unit aborted"))
                }
            })
        })
    }

    /// Queue `work` without keeping a handle to its result
    pub fn launch<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.submit(work));
    }

    /// Whether the worker has stopped accepting units
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    fn enqueue<F, R>(&self, work: F) -> Sequenced<R>
    where
        F: Future<Output = Result<R, SyncError>> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let unit = async move {
            // The submitter may have dropped its handle
            let _ = tx.send(work.await);
        }
        .boxed();
        if self.queue.send(unit).is_err() {
            tracing::warn!("sequencer stopped, unit dropped");
        }
        Sequenced { rx }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain(mut units: mpsc::UnboundedReceiver<Unit>) {
    while let Some(unit) = units.recv().await {
        unit.await;
    }
    tracing::debug!("sequencer drained");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result handle of a submitted unit
///
/// Dropping it does not cancel the unit.
pub struct Sequenced<R> {
    rx: oneshot::Receiver<Result<R, SyncError>>,
}

impl<R> Future for Sequenced<R> {
    type Output = Result<R, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(SyncError::Cancelled(Cancelled::because("sequencer stopped")))
            })
        })
    }
}

#[cfg(test)]
#[path = "sequencer_tests.rs"]
mod tests;
