//! Waiter group broadcast specs
//!
//! Verify one resolve reaches every registered waiter exactly once.

use crate::prelude::*;

#[tokio::test]
async fn resume_all_reaches_every_waiter_with_the_same_value() {
    let group = WaiterGroup::<u32>::new();
    let waiters: Vec<_> = (0..5).map(|_| group.register()).collect();

    assert_eq!(group.resume_all(42), 5);
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), 42);
    }
    assert!(group.is_empty());
}

#[tokio::test]
async fn waiter_registered_after_resolve_joins_next_generation() {
    let group = WaiterGroup::<u32>::new();
    let early = group.register();
    group.resume_all(1);
    let late = group.register();

    assert_eq!(early.await.unwrap(), 1);
    assert_eq!(group.len(), 1);
    group.resume_all(2);
    assert_eq!(late.await.unwrap(), 2);
}

#[tokio::test]
async fn failure_and_cancellation_are_distinct_outcomes() {
    let group = WaiterGroup::<u32>::new();
    let failed = group.register();
    group.resume_all_with_error(SyncError::failed(std::fmt::Error));
    assert!(matches!(failed.await, Err(SyncError::Failed(_))));

    let cancelled = group.register();
    group.cancel_all(Cancelled::because("shutting down"));
    let err = cancelled.await.unwrap_err();
    assert!(matches!(&err, SyncError::Cancelled(c) if c.cause() == Some("shutting down")));
}

#[tokio::test]
async fn cancelled_waiter_leaves_the_group() {
    let group = WaiterGroup::<u32>::new();
    let waiting = {
        let group = group.clone();
        tokio::spawn(async move { group.wait().await })
    };
    settle().await;
    assert_eq!(group.len(), 1);

    waiting.abort();
    assert!(waiting.await.unwrap_err().is_cancelled());
    assert!(group.is_empty());
    assert_eq!(group.resume_all(7), 0);
}
