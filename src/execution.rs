use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::future::Either;
use slotmap::{new_key_type, SlotMap};
use tokio::sync::watch;

use crate::{
    cancel::CancelSignal,
    error::QueryError,
    instant::{time_until_stale, Clock, Instant},
    status::{FailureContext, Status, SuccessContext},
};

new_key_type! {
    /// Handle returned by [`FixedExecution::add_observer`], used to detach later.
    pub struct ObserverKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttemptId(u64);

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

impl AttemptId {
    fn next() -> Self {
        AttemptId(NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The async function contract: an argument plus an explicit cancellation
/// signal, producing a result. The core never relies on the function
/// honoring `CancelSignal`; it only uses the Attempt-token check below.
pub type Fetcher<A, R, E> = Arc<
    dyn Fn(A, CancelSignal) -> Pin<Box<dyn Future<Output = Result<R, E>> + Send>> + Send + Sync,
>;

/// Callbacks a [`crate::observer::QueryObserver`] registers with the
/// execution it currently observes. Kept as an explicit trait object list
/// (rather than a signal/notifier object) per the core's no-UI-coupling
/// design: detaching removes the entry and nothing else is retained.
pub(crate) trait ExecutionSubscriber<A, R, E>: Send + Sync {
    fn on_success(&self, execution: &FixedExecution<A, R, E>, ctx: &SuccessContext<A, R>);
    fn on_failure(&self, ctx: &FailureContext<A, E>);
    fn on_state_changed(&self);
}

struct InFlight<R, E> {
    id: AttemptId,
    signal: CancelSignal,
    result_rx: watch::Receiver<Option<Result<R, QueryError<E>>>>,
}

struct ExecutionState<A, R, E> {
    status: Status,
    data: Option<R>,
    error: Option<E>,
    data_updated_at: Option<Instant>,
    is_invalidated: bool,
    in_flight: Option<InFlight<R, E>>,
    observers: SlotMap<ObserverKey, Arc<dyn ExecutionSubscriber<A, R, E>>>,
}

impl<A, R, E> ExecutionState<A, R, E> {
    fn subscriber_list(&self) -> Vec<Arc<dyn ExecutionSubscriber<A, R, E>>> {
        self.observers.values().cloned().collect()
    }
}

struct Inner<A, R, E> {
    arg: A,
    fetcher: Fetcher<A, R, E>,
    clock: Arc<dyn Clock>,
    state: Mutex<ExecutionState<A, R, E>>,
}

/// The state machine for one `(endpoint, argument)` pair.
///
/// Cheaply cloneable; every clone shares the same underlying state. The
/// [`crate::cache::Cache`] owns one of these per argument and hands clones
/// out to observers, which hold a non-owning reference that they drop on
/// detach.
pub struct FixedExecution<A, R, E> {
    inner: Arc<Inner<A, R, E>>,
}

impl<A, R, E> Clone for FixedExecution<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R, E> FixedExecution<A, R, E>
where
    A: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(arg: A, fetcher: Fetcher<A, R, E>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                arg,
                fetcher,
                clock,
                state: Mutex::new(ExecutionState {
                    status: Status::Idle,
                    data: None,
                    error: None,
                    data_updated_at: None,
                    is_invalidated: false,
                    in_flight: None,
                    observers: SlotMap::with_key(),
                }),
            }),
        }
    }

    pub fn arg(&self) -> &A {
        &self.inner.arg
    }

    /// Identity comparison: `true` iff both handles point at the same
    /// underlying state, not merely at equal arguments.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn status(&self) -> Status {
        self.inner.state.lock().unwrap().status
    }

    pub fn data(&self) -> Option<R> {
        self.inner.state.lock().unwrap().data.clone()
    }

    pub fn error(&self) -> Option<E> {
        self.inner.state.lock().unwrap().error.clone()
    }

    pub fn data_updated_at(&self) -> Option<Instant> {
        self.inner.state.lock().unwrap().data_updated_at
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.state.lock().unwrap().is_invalidated
    }

    /// `true` iff an Attempt is currently in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.state.lock().unwrap().in_flight.is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().unwrap().observers.len()
    }

    pub fn is_stale_by_time(&self, stale_time: Duration) -> bool {
        let state = self.inner.state.lock().unwrap();
        if state.is_invalidated {
            return true;
        }
        match state.data_updated_at {
            None => true,
            Some(updated_at) => {
                let now = self.inner.clock.now();
                time_until_stale(updated_at, stale_time, now).is_zero()
            }
        }
    }

    pub(crate) fn add_observer(
        &self,
        subscriber: Arc<dyn ExecutionSubscriber<A, R, E>>,
    ) -> ObserverKey {
        self.inner
            .state
            .lock()
            .unwrap()
            .observers
            .insert(subscriber)
    }

    pub(crate) fn remove_observer(&self, key: ObserverKey) {
        self.inner.state.lock().unwrap().observers.remove(key);
    }

    /// Set `data` directly, as if an Attempt had just succeeded, without
    /// running the async function. Fires `onSuccess` the same as a real
    /// Attempt would, so a subscriber's `lastSuccessful` tracking stays
    /// correct for a Success reached this way.
    pub fn update_data(&self, value: R) {
        let mut state = self.inner.state.lock().unwrap();
        state.data = Some(value.clone());
        state.status = Status::Success;
        state.error = None;
        state.data_updated_at = Some(self.inner.clock.now());
        state.is_invalidated = false;
        let subscribers = state.subscriber_list();
        drop(state);
        let ctx = SuccessContext {
            arg: self.inner.arg.clone(),
            result: value,
        };
        for subscriber in &subscribers {
            subscriber.on_success(self, &ctx);
        }
        for subscriber in &subscribers {
            subscriber.on_state_changed();
        }
    }

    /// Mark the entry stale. If it currently has observers, immediately
    /// starts a refetch; otherwise the invalidation takes effect on the
    /// next `refetch`/subscribe.
    pub fn invalidate(&self) {
        let should_refetch = {
            let mut state = self.inner.state.lock().unwrap();
            state.is_invalidated = true;
            !state.observers.is_empty()
        };
        if should_refetch {
            let this = self.clone();
            tokio::spawn(async move {
                let _ = this.refetch().await;
            });
        }
    }

    /// Cancel the in-flight Attempt, if any. Resets the entry to `Idle`,
    /// clearing `data` and `error` per the cancellation contract -- a
    /// cancelled attempt is never an error, and never keeps stale data.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match state.in_flight.take() {
            Some(in_flight) => {
                tracing::debug!(attempt = in_flight.id.0, "cancelling in-flight attempt");
                in_flight.signal.cancel();
                state.status = Status::Idle;
                state.error = None;
                state.data = None;
                let subscribers = state.subscriber_list();
                drop(state);
                for subscriber in &subscribers {
                    subscriber.on_state_changed();
                }
                true
            }
            None => false,
        }
    }

    /// Start (or join) an Attempt. If one is already in flight, returns its
    /// eventual result instead of starting a second one (deduplication).
    pub async fn refetch(&self) -> Result<R, QueryError<E>> {
        enum RefetchAction<A, R, E> {
            Join(watch::Receiver<Option<Result<R, QueryError<E>>>>),
            Start {
                id: AttemptId,
                signal: CancelSignal,
                tx: watch::Sender<Option<Result<R, QueryError<E>>>>,
                subscribers: Vec<Arc<dyn ExecutionSubscriber<A, R, E>>>,
            },
        }

        let action = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(in_flight) = &state.in_flight {
                RefetchAction::Join(in_flight.result_rx.clone())
            } else {
                let id = AttemptId::next();
                let signal = CancelSignal::new();
                let (tx, rx) = watch::channel(None);

                if state.data.is_none() {
                    state.status = Status::Loading;
                    state.error = None;
                }
                state.in_flight = Some(InFlight {
                    id,
                    signal: signal.clone(),
                    result_rx: rx,
                });

                let subscribers = state.subscriber_list();
                RefetchAction::Start {
                    id,
                    signal,
                    tx,
                    subscribers,
                }
            }
        };

        let (id, signal, tx) = match action {
            RefetchAction::Join(mut rx) => return wait_for_result(&mut rx).await,
            RefetchAction::Start {
                id,
                signal,
                tx,
                subscribers,
            } => {
                for subscriber in &subscribers {
                    subscriber.on_state_changed();
                }
                (id, signal, tx)
            }
        };

        let arg = self.inner.arg.clone();
        let call = (self.inner.fetcher)(arg.clone(), signal.clone());
        let wait_cancel = signal.clone().cancelled();

        let resolved: Result<R, QueryError<E>> =
            match futures::future::select(call, Box::pin(wait_cancel)).await {
                Either::Left((outcome, _)) => outcome.map_err(QueryError::Failed),
                Either::Right((_, _)) => Err(QueryError::Cancelled),
            };

        let mut state = self.inner.state.lock().unwrap();
        let still_current = matches!(&state.in_flight, Some(current) if current.id == id);
        if !still_current {
            // Superseded by `cancel` (which already reset state) or, in
            // principle, a later attempt. Out-of-order completions never
            // overwrite newer state; stay silent to callers, but trace it.
            tracing::debug!(attempt = id.0, "discarding superseded attempt result");
            drop(state);
            let _ = tx.send(Some(resolved.clone()));
            return resolved;
        }

        match &resolved {
            Ok(value) => {
                state.data = Some(value.clone());
                state.status = Status::Success;
                state.error = None;
                state.data_updated_at = Some(self.inner.clock.now());
                state.is_invalidated = false;
                state.in_flight = None;
                let subscribers = state.subscriber_list();
                drop(state);
                let ctx = SuccessContext {
                    arg: arg.clone(),
                    result: value.clone(),
                };
                for subscriber in &subscribers {
                    subscriber.on_success(self, &ctx);
                }
                for subscriber in &subscribers {
                    subscriber.on_state_changed();
                }
            }
            Err(QueryError::Cancelled) => {
                // `cancel()` always clears `in_flight` under the same lock
                // before signalling, so by the time a cancelled attempt gets
                // here `still_current` above has already become false and
                // returned through the supersession branch.
                unreachable!("a still-current attempt never resolves as Cancelled")
            }
            Err(QueryError::Failed(e)) => {
                tracing::warn!(attempt = id.0, "query function failed");
                state.error = Some(e.clone());
                state.status = Status::Error;
                state.in_flight = None;
                let subscribers = state.subscriber_list();
                drop(state);
                let ctx = FailureContext {
                    arg: arg.clone(),
                    error: e.clone(),
                };
                for subscriber in &subscribers {
                    subscriber.on_failure(&ctx);
                }
                for subscriber in &subscribers {
                    subscriber.on_state_changed();
                }
            }
            Err(QueryError::NoCurrentExecution(_)) => unreachable!("never produced by refetch"),
        }

        let _ = tx.send(Some(resolved.clone()));
        resolved
    }
}

async fn wait_for_result<R, E>(
    rx: &mut watch::Receiver<Option<Result<R, QueryError<E>>>>,
) -> Result<R, QueryError<E>>
where
    R: Clone,
    E: Clone,
{
    loop {
        if let Some(result) = rx.borrow().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            return Err(QueryError::Cancelled);
        }
    }
}
