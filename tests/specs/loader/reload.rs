//! Loader specs
//!
//! Verify a new load replaces the previous one and results are published.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn reload_cancels_the_previous_load() {
    let loader = Arc::new(Loader::new());
    let runs = Runs::new();

    let first = {
        let loader = Arc::clone(&loader);
        let runs = runs.clone();
        tokio::spawn(async move {
            loader
                .load(|| async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    runs.hit();
                    Ok("stale")
                })
                .await
        })
    };
    settle().await;
    assert!(loader.is_loading());

    assert_eq!(loader.load(|| async { Ok("fresh") }).await.unwrap(), "fresh");
    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(runs.count(), 0);

    let state = loader.state();
    assert!(!state.is_loading);
    assert!(matches!(state.last_result, Some(Ok(()))));
}

#[tokio::test]
async fn failure_is_published_not_raised() {
    let loader = Loader::new();
    let result = loader.load(|| async { Err::<(), _>(boom("disk full")) }).await;
    assert_eq!(result.unwrap_err().to_string(), "disk full");

    let state = loader.state();
    assert!(matches!(state.last_result, Some(Err(SyncError::Failed(_)))));
}

#[tokio::test(start_paused = true)]
async fn try_load_does_not_queue_behind_a_running_load() {
    let loader = Arc::new(Loader::new());
    let first = {
        let loader = Arc::clone(&loader);
        tokio::spawn(async move {
            loader
                .load(|| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(1)
                })
                .await
        })
    };
    settle().await;

    assert!(loader.try_load(|| async { Ok(2) }).await.unwrap_err().is_cancelled());
    loader.await_idle().await;
    assert_eq!(first.await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn loader_options_load_from_config() {
    let config = CoordinationConfig::from_toml_str("[loader]\nnotify_loading = false\n").unwrap();
    let loader = Loader::with_options(config.loader);
    let mut loading = loader.loading_flow();
    assert_eq!(loading.next().await, Some(false));

    loader.load(|| async { Ok(()) }).await.unwrap();
    assert!(!loader.is_loading());
    assert!(loader.state().last_result.is_some());
}
