//! Priority preemption specs
//!
//! Verify equal or higher priority replaces the active mutation and lower
//! priority is turned away.

use crate::prelude::*;

fn spawn_mutation(
    executor: &Arc<PriorityExecutor>,
    priority: i32,
    runs: &Runs,
) -> tokio::task::JoinHandle<Result<&'static str, SyncError>> {
    let executor = Arc::clone(executor);
    let runs = runs.clone();
    tokio::spawn(async move {
        executor
            .mutate(priority, || async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                runs.hit();
                "completed"
            })
            .await
    })
}

#[tokio::test(start_paused = true)]
async fn equal_priority_cancels_the_running_mutation() {
    let executor = Arc::new(PriorityExecutor::new());
    let runs = Runs::new();

    let a = spawn_mutation(&executor, 0, &runs);
    settle().await;
    let b = spawn_mutation(&executor, 0, &runs);

    assert!(a.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(b.await.unwrap().unwrap(), "completed");
    assert_eq!(runs.count(), 1);
    assert!(!executor.is_active());
}

#[tokio::test(start_paused = true)]
async fn lower_priority_is_rejected_and_the_active_one_continues() {
    let executor = Arc::new(PriorityExecutor::new());
    let runs = Runs::new();

    let high = spawn_mutation(&executor, 10, &runs);
    settle().await;

    let err = executor.mutate(3, || async { "never" }).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Preempted {
            active: 10,
            requested: 3
        }
    ));
    assert_eq!(executor.active_priority(), Some(10));
    assert_eq!(high.await.unwrap().unwrap(), "completed");
}

#[tokio::test(start_paused = true)]
async fn cancel_and_join_leaves_the_slot_empty() {
    let executor = Arc::new(PriorityExecutor::new());
    let runs = Runs::new();

    let running = spawn_mutation(&executor, 1, &runs);
    settle().await;
    assert!(executor.is_active());

    executor.cancel_and_join().await;
    assert!(!executor.is_active());
    assert!(running.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(runs.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn priority_from_config_drives_mutate_with() {
    let config = CoordinationConfig::from_toml_str("[mutation]\npriority = 7\n").unwrap();
    let executor = Arc::new(PriorityExecutor::new());
    let runs = Runs::new();

    let low = spawn_mutation(&executor, 6, &runs);
    settle().await;
    let value = executor
        .mutate_with(&config.mutation, || async { "configured" })
        .await
        .unwrap();
    assert_eq!(value, "configured");
    assert!(low.await.unwrap().unwrap_err().is_cancelled());
}
