//! Single-flight cancellation specs
//!
//! Verify owner cancellation is broadcast while joiner cancellation is local.

use crate::prelude::*;

fn slow(runs: &Runs) -> SingleFlight<&'static str> {
    let runs = runs.clone();
    SingleFlight::new(move || {
        let runs = runs.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            runs.hit();
            Ok("done")
        }
    })
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_owner_cancels_every_joiner() {
    let runs = Runs::new();
    let flight = slow(&runs);

    let owner = {
        let flight = flight.clone();
        tokio::spawn(async move { flight.sync().await })
    };
    settle().await;
    let joiners: Vec<_> = (0..2)
        .map(|_| {
            let flight = flight.clone();
            tokio::spawn(async move { flight.sync().await })
        })
        .collect();
    settle().await;

    owner.abort();
    for joiner in joiners {
        assert!(joiner.await.unwrap().unwrap_err().is_cancelled());
    }
    assert!(!flight.is_syncing());
    assert_eq!(runs.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_joiner_leaves_the_execution_running() {
    let runs = Runs::new();
    let flight = slow(&runs);

    let owner = {
        let flight = flight.clone();
        tokio::spawn(async move { flight.sync().await })
    };
    settle().await;
    let joiner = {
        let flight = flight.clone();
        tokio::spawn(async move { flight.sync().await })
    };
    settle().await;

    joiner.abort();
    assert!(joiner.await.unwrap_err().is_cancelled());
    assert_eq!(owner.await.unwrap().unwrap(), "done");
    assert_eq!(runs.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn external_deadline_is_ordinary_cancellation() {
    let runs = Runs::new();
    let flight = slow(&runs);

    let timed_out = tokio::time::timeout(Duration::from_secs(1), flight.sync()).await;
    assert!(timed_out.is_err());
    assert!(!flight.is_syncing());

    // The next call starts a fresh execution
    assert_eq!(flight.sync().await.unwrap(), "done");
    assert_eq!(runs.count(), 1);
}
