// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-local tags marking which producers are running on the current task

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

tokio::task_local! {
    static ACTIVE_PRODUCERS: Vec<u64>;
}

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique tag for a synchronizer instance
pub(crate) fn next_tag() -> u64 {
    NEXT_TAG.fetch_add(1, Ordering::Relaxed)
}

/// Whether `tag` is a producer running somewhere up the current task's stack
pub(crate) fn is_active(tag: u64) -> bool {
    ACTIVE_PRODUCERS
        .try_with(|tags| tags.contains(&tag))
        .unwrap_or(false)
}

/// Run `fut` with `tag` pushed onto the task's active producers
pub(crate) async fn scope<F: Future>(tag: u64, fut: F) -> F::Output {
    let mut tags = ACTIVE_PRODUCERS
        .try_with(|tags| tags.clone())
        .unwrap_or_default();
    tags.push(tag);
    ACTIVE_PRODUCERS.scope(tags, fut).await
}
