//! Single-flight coalescing specs
//!
//! Verify concurrent calls collapse onto one execution and share its outcome.

use crate::prelude::*;

fn delayed_one(runs: &Runs) -> SingleFlight<i32> {
    let runs = runs.clone();
    SingleFlight::new(move || {
        let runs = runs.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            runs.hit();
            Ok(1)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn three_concurrent_syncs_run_the_producer_once() {
    let runs = Runs::new();
    let flight = delayed_one(&runs);

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let flight = flight.clone();
            tokio::spawn(async move { flight.sync().await })
        })
        .collect();

    for caller in callers {
        assert_eq!(caller.await.unwrap().unwrap(), 1);
    }
    assert_eq!(runs.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn joined_callers_observe_the_same_failure() {
    let flight = SingleFlight::<i32>::new(|| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(boom("upstream unavailable"))
    });

    let (a, b) = tokio::join!(flight.sync(), flight.sync());
    for outcome in [a, b] {
        let err = outcome.unwrap_err();
        assert_eq!(err.to_string(), "upstream unavailable");
    }
}

#[tokio::test(start_paused = true)]
async fn busy_stream_brackets_one_execution() {
    let runs = Runs::new();
    let flight = delayed_one(&runs);
    let mut busy = flight.syncing_flow();
    assert_eq!(busy.next().await, Some(false));

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let flight = flight.clone();
            tokio::spawn(async move { flight.sync().await })
        })
        .collect();

    // One true segment regardless of how many callers joined
    assert_eq!(busy.next().await, Some(true));
    assert_eq!(busy.next().await, Some(false));
    for caller in callers {
        assert_eq!(caller.await.unwrap().unwrap(), 1);
    }
    assert_eq!(runs.count(), 1);
}

#[tokio::test]
async fn sync_inside_its_own_producer_is_rejected() {
    let slot: Arc<std::sync::OnceLock<SingleFlight<i32>>> = Arc::default();
    let inner = Arc::clone(&slot);
    let flight = SingleFlight::new(move || {
        let inner = Arc::clone(&inner);
        async move {
            let me = inner.get().expect("installed").clone();
            me.sync().await.map_err(BoxError::from)
        }
    });
    assert!(slot.set(flight.clone()).is_ok());

    let err = flight.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Reentrant));
    assert!(err.is_rejection());
    assert!(!flight.is_syncing());
}
