use std::sync::{Arc, Mutex};

use slotmap::{new_key_type, SlotMap};

use crate::{
    endpoint::Endpoint,
    error::QueryError,
    execution::{ExecutionSubscriber, FixedExecution, ObserverKey},
    options::QueryOptions,
    status::{FailureContext, Status, SuccessContext},
};

new_key_type! {
    pub struct ListenerKey;
}

struct Binding<A, R, E> {
    execution: FixedExecution<A, R, E>,
    key: ObserverKey,
}

struct State<A, R, E> {
    current: Option<Binding<A, R, E>>,
    last_successful: Option<FixedExecution<A, R, E>>,
    arg: Option<A>,
}

struct Shared<A, R, E> {
    endpoint: Endpoint<A, R, E>,
    options: Mutex<QueryOptions<A, R, E>>,
    state: Mutex<State<A, R, E>>,
    listeners: Mutex<SlotMap<ListenerKey, Box<dyn Fn() + Send + Sync>>>,
}

impl<A, R, E> ExecutionSubscriber<A, R, E> for Shared<A, R, E>
where
    A: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn on_success(&self, execution: &FixedExecution<A, R, E>, ctx: &SuccessContext<A, R>) {
        // Record the execution that actually succeeded, not whatever the
        // observer happens to be bound to right now -- a rebind between
        // this execution starting its attempt and it resolving must not
        // make the callback attribute the success to the new execution.
        self.state.lock().unwrap().last_successful = Some(execution.clone());
        if let Some(on_success) = self.options.lock().unwrap().on_success.clone() {
            on_success(ctx);
        }
    }

    fn on_failure(&self, ctx: &FailureContext<A, E>) {
        if let Some(on_failure) = self.options.lock().unwrap().on_failure.clone() {
            on_failure(ctx);
        }
    }

    fn on_state_changed(&self) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.values() {
            listener();
        }
    }
}

/// A subscriber bound to one [`Endpoint`] at a time.
///
/// Tracks the execution it currently mirrors (`current`) and the most
/// recent one that ever reached `Success` (`last_successful`, which may be
/// for a different argument -- this is what keeps the previous page's data
/// visible while a new page loads).
pub struct QueryObserver<A, R, E> {
    inner: Arc<Shared<A, R, E>>,
}

impl<A, R, E> Clone for QueryObserver<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R, E> QueryObserver<A, R, E>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(endpoint: Endpoint<A, R, E>, options: QueryOptions<A, R, E>) -> Self {
        Self {
            inner: Arc::new(Shared {
                endpoint,
                options: Mutex::new(options),
                state: Mutex::new(State {
                    current: None,
                    last_successful: None,
                    arg: None,
                }),
                listeners: Mutex::new(SlotMap::with_key()),
            }),
        }
    }

    fn stale_time(&self) -> std::time::Duration {
        let override_stale = self.inner.options.lock().unwrap().stale_time;
        override_stale.unwrap_or(self.inner.endpoint.options().default_stale_time)
    }

    fn current_execution(&self) -> Option<FixedExecution<A, R, E>> {
        self.inner
            .state
            .lock()
            .unwrap()
            .current
            .as_ref()
            .map(|binding| binding.execution.clone())
    }

    /// Register a callback fired on every `stateChanged` notification.
    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerKey {
        self.inner
            .listeners
            .lock()
            .unwrap()
            .insert(Box::new(listener))
    }

    pub fn remove_listener(&self, key: ListenerKey) -> bool {
        self.inner.listeners.lock().unwrap().remove(key).is_some()
    }

    pub fn arg(&self) -> Option<A> {
        self.inner.state.lock().unwrap().arg.clone()
    }

    pub fn has_arg(&self) -> bool {
        self.inner.state.lock().unwrap().arg.is_some()
    }

    pub fn status(&self) -> Status {
        self.current_execution()
            .map(|execution| execution.status())
            .unwrap_or(Status::Idle)
    }

    pub fn data(&self) -> Option<R> {
        self.current_execution().and_then(|execution| execution.data())
    }

    pub fn error(&self) -> Option<E> {
        self.current_execution().and_then(|execution| execution.error())
    }

    /// `current.data` if the current execution is `Success`, else the data
    /// from the last execution this observer ever saw succeed (possibly for
    /// a different argument).
    pub fn last_data(&self) -> Option<R> {
        if self.is_success() {
            return self.data();
        }
        self.inner
            .state
            .lock()
            .unwrap()
            .last_successful
            .as_ref()
            .and_then(|execution| execution.data())
    }

    pub fn is_loading(&self) -> bool {
        self.status() == Status::Loading
    }

    pub fn is_fetching(&self) -> bool {
        self.current_execution()
            .map(|execution| execution.is_fetching())
            .unwrap_or(false)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }

    pub fn is_error(&self) -> bool {
        self.status() == Status::Error
    }

    pub fn is_uninitialized(&self) -> bool {
        self.status() == Status::Idle
    }

    pub fn has_data(&self) -> bool {
        self.data().is_some()
    }

    fn as_subscriber(&self) -> Arc<dyn ExecutionSubscriber<A, R, E>> {
        self.inner.clone()
    }

    fn bind(&self, execution: FixedExecution<A, R, E>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(old) = &state.current {
            old.execution.remove_observer(old.key);
        }
        let key = execution.add_observer(self.as_subscriber());
        state.current = Some(Binding { execution, key });
        drop(state);
        self.inner.on_state_changed();
    }

    /// Resolve `arg` through the endpoint's cache and switch to mirroring
    /// it, refetching only if it is not already fetching and is stale.
    pub async fn set_arg_async(&self, arg: A) -> Result<(), QueryError<E>> {
        let execution = self.inner.endpoint.cache().get_or_add(arg.clone());

        let already_current = self
            .inner
            .state
            .lock()
            .unwrap()
            .current
            .as_ref()
            .map(|binding| binding.execution.ptr_eq(&execution))
            .unwrap_or(false);

        if already_current {
            self.inner.state.lock().unwrap().arg = Some(arg);
            return Ok(());
        }

        self.bind(execution.clone());
        self.inner.state.lock().unwrap().arg = Some(arg);

        let stale_time = self.stale_time();
        if !execution.is_fetching() && execution.is_stale_by_time(stale_time) {
            execution.refetch().await?;
        }
        Ok(())
    }

    /// Fire-and-forget variant of [`Self::set_arg_async`]; swallows the
    /// refetch error but still updates observable state.
    pub fn set_arg(&self, arg: A) {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.set_arg_async(arg).await;
        });
    }

    /// Cache-bypassing "mutation" call: always runs the function, even for
    /// an argument with an existing cached success, and never pollutes the
    /// shared cache.
    pub async fn trigger_async(&self, arg: A) -> Result<R, QueryError<E>> {
        let execution = self.inner.endpoint.cache().add_uncached(arg.clone());
        self.bind(execution.clone());
        self.inner.state.lock().unwrap().arg = Some(arg);
        execution.refetch().await
    }

    pub fn trigger(&self, arg: A) {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.trigger_async(arg).await;
        });
    }

    pub async fn refetch(&self) -> Result<R, QueryError<E>> {
        match self.current_execution() {
            Some(execution) => execution.refetch().await,
            None => {
                tracing::warn!("refetch called on an observer with no current execution");
                Err(QueryError::NoCurrentExecution("refetch"))
            }
        }
    }

    pub fn cancel(&self) -> bool {
        self.current_execution()
            .map(|execution| execution.cancel())
            .unwrap_or(false)
    }

    /// Leave the current execution's observer set and clear `current`.
    /// Idempotent.
    pub fn detach(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(binding) = state.current.take() {
            binding.execution.remove_observer(binding.key);
        }
    }
}
