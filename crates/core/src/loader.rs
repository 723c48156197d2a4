// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preemptible loader
//!
//! A new load cancels the one in flight and replaces it. The loader
//! publishes whether it is loading and the result of the last load that was
//! not cancelled.

use crate::config::LoadOptions;
use crate::error::{BoxError, Cancelled, SyncError};
use crate::priority::PriorityExecutor;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Loads always run at this priority, so every load preempts its predecessor
const LOAD_PRIORITY: i32 = 0;

/// Observable loader state, replaced as a whole on every transition
#[derive(Clone, Debug, Default)]
pub struct LoaderState {
    pub is_loading: bool,
    /// Outcome of the last load that ran to completion
    pub last_result: Option<Result<(), SyncError>>,
}

/// Runs loads one at a time, each new load cancelling the previous one
pub struct Loader {
    executor: PriorityExecutor,
    state: watch::Sender<LoaderState>,
    /// Loads currently holding the loading flag up
    raised: AtomicUsize,
    options: LoadOptions,
}

impl Loader {
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    /// Loader whose [`load`](Self::load) and [`try_load`](Self::try_load) use `options`
    pub fn with_options(options: LoadOptions) -> Self {
        let (state, _) = watch::channel(LoaderState::default());
        Self {
            executor: PriorityExecutor::new(),
            state,
            raised: AtomicUsize::new(0),
            options,
        }
    }

    /// Cancel any load in flight and run `on_load` in its place
    pub async fn load<T, F, Fut>(&self, on_load: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let options = self.options.clone();
        self.load_with(&options, || {}, on_load).await
    }

    /// [`load`](Self::load) with explicit options and a completion callback
    ///
    /// `on_finish` runs once the load ends, however it ends.
    pub async fn load_with<T, F, Fut, G>(
        &self,
        options: &LoadOptions,
        on_finish: G,
        on_load: F,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
        G: FnOnce(),
    {
        let _finish = OnFinish(Some(on_finish));
        let outcome = self
            .executor
            .mutate(LOAD_PRIORITY, || async {
                let _loading = LoadingFlag::raise(self, options.notify_loading);
                let result = on_load().await.map_err(SyncError::from_producer);
                if !matches!(result, Err(SyncError::Cancelled(_))) {
                    let recorded = result.as_ref().map(|_| ()).map_err(SyncError::clone);
                    self.state.send_modify(|state| state.last_result = Some(recorded));
                }
                result
            })
            .await;
        outcome.and_then(|result| result)
    }

    /// Like [`load`](Self::load), but returns `Cancelled` instead of
    /// preempting when a load is already running
    pub async fn try_load<T, F, Fut>(&self, on_load: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        if self.is_loading() {
            tracing::debug!("load skipped, loader busy");
            return Err(SyncError::Cancelled(Cancelled::because("loader busy")));
        }
        self.load(on_load).await
    }

    /// Cancel the load in flight, if any, and wait for it to unwind
    pub async fn cancel_load(&self) {
        self.executor.cancel_and_join().await;
    }

    /// Suspend until the loading flag reads false
    pub async fn await_idle(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|state| !state.is_loading).await;
    }

    pub fn state(&self) -> LoaderState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Stream of every state, starting with the current one
    pub fn state_flow(&self) -> BoxStream<'static, LoaderState> {
        WatchStream::new(self.state.subscribe()).boxed()
    }

    /// Stream of the loading flag, skipping repeats
    pub fn loading_flow(&self) -> BoxStream<'static, bool> {
        let mut last = None;
        WatchStream::new(self.state.subscribe())
            .filter_map(move |state| {
                let fresh = last != Some(state.is_loading);
                last = Some(state.is_loading);
                futures::future::ready(fresh.then_some(state.is_loading))
            })
            .boxed()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Raises the loading flag, if notifying, and lowers it on drop
///
/// A preempted load may unwind after its replacement raised the flag, so
/// the flag reads true until every raised load has dropped.
struct LoadingFlag<'a> {
    loader: &'a Loader,
    notify: bool,
}

impl<'a> LoadingFlag<'a> {
    fn raise(loader: &'a Loader, notify: bool) -> Self {
        if notify {
            loader.state.send_if_modified(|state| {
                loader.raised.fetch_add(1, Ordering::SeqCst);
                !std::mem::replace(&mut state.is_loading, true)
            });
        }
        Self { loader, notify }
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        if !self.notify {
            return;
        }
        let raised = &self.loader.raised;
        self.loader.state.send_if_modified(|state| {
            let loading = raised.fetch_sub(1, Ordering::SeqCst) > 1;
            std::mem::replace(&mut state.is_loading, loading) != loading
        });
    }
}

struct OnFinish<G: FnOnce()>(Option<G>);

impl<G: FnOnce()> Drop for OnFinish<G> {
    fn drop(&mut self) {
        if let Some(on_finish) = self.0.take() {
            on_finish();
        }
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
