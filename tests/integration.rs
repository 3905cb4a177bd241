use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use fixed_query::{Endpoint, QueryError, QueryOptions, Status};

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    (counter.clone(), counter)
}

/// S1 -- basic success.
#[tokio::test]
async fn basic_success() {
    let endpoint: Endpoint<i32, String, String> =
        Endpoint::new(|arg: i32, _signal| async move { Ok(arg.to_string()) });

    let observer = endpoint.use_observer(QueryOptions::default());
    observer.set_arg_async(10).await.unwrap();

    assert_eq!(observer.data(), Some("10".to_string()));
    assert_eq!(observer.status(), Status::Success);
    assert!(!observer.is_loading());
}

/// S2 -- two observers sharing an endpoint and a long stale time see one
/// underlying call.
#[tokio::test]
async fn shared_cache_deduplicates_across_observers() {
    let (calls, calls_side) = counter();
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(move |arg: i32, _signal| {
        let calls = calls_side.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(arg.to_string())
        }
    });

    let options = QueryOptions::default().with_stale_time(Duration::from_secs(6000));
    let observer_a = endpoint.use_observer(options.clone());
    let observer_b = endpoint.use_observer(options);

    observer_a.set_arg_async(10).await.unwrap();
    observer_b.set_arg_async(10).await.unwrap();

    assert_eq!(observer_a.data(), Some("10".to_string()));
    assert_eq!(observer_b.data(), Some("10".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// S3 -- invalidating one argument only refetches observers on that
/// argument; invalidating all refetches every entry.
#[tokio::test]
async fn invalidate_single_vs_all() {
    let (calls, calls_side) = counter();
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(move |arg: i32, _signal| {
        let calls = calls_side.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(arg.to_string())
        }
    });

    let observer_a = endpoint.use_observer(QueryOptions::default());
    let observer_b = endpoint.use_observer(QueryOptions::default());
    observer_a.set_arg_async(1).await.unwrap();
    observer_b.set_arg_async(2).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    endpoint.invalidate(&1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(observer_a.is_fetching());
    assert!(!observer_b.is_fetching());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    endpoint.invalidate_all();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// S4 -- cancelling an in-flight trigger resets the observer to Idle, never
/// Error, and the awaited call surfaces a cancellation error.
#[tokio::test]
async fn cancel_resets_to_idle() {
    let endpoint: Endpoint<String, String, String> = Endpoint::new(|arg, signal| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(1000)) => Ok(arg),
            _ = signal.cancelled() => Err("fn observed cancellation".to_string()),
        }
    });

    let observer = endpoint.use_observer(QueryOptions::default());
    let trigger = {
        let observer = observer.clone();
        tokio::spawn(async move { observer.trigger_async("test".to_string()).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(observer.cancel());

    let result = trigger.await.unwrap();
    assert!(matches!(result, Err(QueryError::Cancelled)));
    assert_eq!(observer.status(), Status::Idle);
    assert_eq!(observer.error(), None);
    assert!(!observer.has_data());
}

/// Property 7 / S5 -- an attempt cancelled and superseded by a fresh one
/// never overwrites the newer result, even if the old attempt's underlying
/// future resolves afterward.
#[tokio::test]
async fn out_of_order_completion_keeps_newest_result() {
    let endpoint: Endpoint<&'static str, String, String> =
        Endpoint::new(|arg, signal| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(300)) => Ok(format!("{arg}-stale")),
                _ = signal.cancelled() => Err("cancelled".to_string()),
            }
        });

    let observer = endpoint.use_observer(QueryOptions::default());
    let first = {
        let observer = observer.clone();
        tokio::spawn(async move { observer.set_arg_async("k").await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(observer.cancel());
    assert!(matches!(first.await.unwrap(), Err(QueryError::Cancelled)));

    let fresh = observer.refetch().await.unwrap();
    assert_eq!(fresh, "k-stale");
    assert_eq!(observer.data(), Some(fresh));
    assert_eq!(observer.status(), Status::Success);
}

/// S6 -- a manual data update only affects observers on that argument.
#[tokio::test]
async fn update_query_data_is_scoped_to_argument() {
    let endpoint: Endpoint<i32, String, String> =
        Endpoint::new(|arg: i32, _signal| async move { Ok(arg.to_string()) });

    let observer_1 = endpoint.use_observer(QueryOptions::default());
    let observer_2 = endpoint.use_observer(QueryOptions::default());
    observer_1.set_arg_async(1).await.unwrap();
    observer_2.set_arg_async(2).await.unwrap();

    assert!(endpoint.update_query_data(&1, "updated".to_string()));

    assert_eq!(observer_1.data(), Some("updated".to_string()));
    assert_eq!(observer_2.data(), Some("2".to_string()));
}

/// Property 2 -- updateQueryData never invokes the async function.
#[tokio::test]
async fn update_query_data_never_calls_the_function() {
    let (calls, calls_side) = counter();
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(move |arg: i32, _signal| {
        let calls = calls_side.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(arg.to_string())
        }
    });

    // No observer has ever touched arg 1, but update_query_data still
    // populates the entry.
    endpoint.update_query_data(&1, "preloaded".to_string());
    let observer = endpoint.use_observer(QueryOptions::default());
    observer.set_arg_async(1).await.unwrap();

    assert_eq!(observer.data(), Some("preloaded".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Property 3 -- invalidating an entry with zero observers does nothing
/// until the next subscription.
#[tokio::test]
async fn invalidate_with_zero_observers_waits_for_next_subscription() {
    let (calls, calls_side) = counter();
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(move |arg: i32, _signal| {
        let calls = calls_side.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(arg.to_string())
        }
    });

    endpoint.prefetch(1).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    endpoint.invalidate(&1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let observer = endpoint.use_observer(QueryOptions::default());
    observer.set_arg_async(1).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Property 6 -- once an observer has seen Success, `last_data` stays
/// populated through later transitions, even a failure on a new argument.
#[tokio::test]
async fn last_data_survives_subsequent_failure() {
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(|arg, _signal| async move {
        if arg == 1 {
            Ok("first-page".to_string())
        } else {
            Err("boom".to_string())
        }
    });

    let observer = endpoint.use_observer(QueryOptions::default());
    observer.set_arg_async(1).await.unwrap();
    assert_eq!(observer.last_data(), Some("first-page".to_string()));

    let _ = observer.set_arg_async(2).await;
    assert_eq!(observer.status(), Status::Error);
    assert_eq!(observer.last_data(), Some("first-page".to_string()));
}

/// Property 1 -- N concurrent observers setting the same argument produce
/// exactly one function invocation.
#[tokio::test]
async fn concurrent_set_arg_deduplicates() {
    let (calls, calls_side) = counter();
    let endpoint: Endpoint<i32, String, String> = Endpoint::new(move |arg: i32, _signal| {
        let calls = calls_side.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(arg.to_string())
        }
    });

    let observers: Vec<_> = (0..5).map(|_| endpoint.use_observer(QueryOptions::default())).collect();
    let handles: Vec<_> = observers
        .into_iter()
        .map(|observer| tokio::spawn(async move { observer.set_arg_async(7).await }))
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
