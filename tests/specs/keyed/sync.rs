//! Keyed synchronizer specs
//!
//! Verify per-key coalescing and the published busy flag.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn one_execution_per_key_with_busy_flag() {
    let sync =
        KeyedSynchronizer::<u32>::with_sequencer(Sequencer::new(), KeyedSyncOptions::new());
    let runs = Runs::new();
    let mut busy = sync.syncing_flow("user:1");
    assert_eq!(busy.next().await, Some(false));

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let sync = sync.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                sync.sync("user:1", move || {
                    let runs = runs.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        runs.hit();
                        Ok(7)
                    }
                })
                .await
            })
        })
        .collect();

    assert_eq!(busy.next().await, Some(true));
    assert_eq!(busy.next().await, Some(false));
    for caller in callers {
        assert_eq!(caller.await.unwrap().unwrap(), 7);
    }
    assert_eq!(runs.count(), 1);
    assert!(!sync.is_syncing("user:1"));
}
