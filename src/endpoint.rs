use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    cache::Cache,
    cancel::CancelSignal,
    error::QueryError,
    execution::Fetcher,
    instant::{default_clock, Clock},
    observer::QueryObserver,
    options::{EndpointOptions, QueryOptions},
    status::Status,
};

/// A named async function plus its cache: the user-facing facade over one
/// [`Cache`].
///
/// `use_observer` is the only way to get a live, subscribable view; the
/// rest of the surface (`prefetch`, `invalidate*`, `update_query_data`,
/// `invoke`) is imperative and cache-bypassing or cache-maintaining but
/// never itself observable.
pub struct Endpoint<A, R, E> {
    cache: Arc<Cache<A, R, E>>,
}

impl<A, R, E> Clone for Endpoint<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<A, R, E> Endpoint<A, R, E>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(function: F) -> Self
    where
        F: Fn(A, CancelSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_options(function, EndpointOptions::default())
    }

    pub fn with_options<F, Fut>(function: F, options: EndpointOptions<A>) -> Self
    where
        F: Fn(A, CancelSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let fetcher: Fetcher<A, R, E> = Arc::new(move |arg, signal| {
            Box::pin(function(arg, signal)) as Pin<Box<dyn Future<Output = Result<R, E>> + Send>>
        });
        Self {
            cache: Arc::new(Cache::new(fetcher, default_clock(), options)),
        }
    }

    /// Like [`Self::with_options`], but with an explicit [`Clock`] instead
    /// of the system wall clock -- the hook tests use to control staleness
    /// without sleeping.
    pub fn with_clock<F, Fut>(function: F, options: EndpointOptions<A>, clock: Arc<dyn Clock>) -> Self
    where
        F: Fn(A, CancelSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let fetcher: Fetcher<A, R, E> = Arc::new(move |arg, signal| {
            Box::pin(function(arg, signal)) as Pin<Box<dyn Future<Output = Result<R, E>> + Send>>
        });
        Self {
            cache: Arc::new(Cache::new(fetcher, clock, options)),
        }
    }

    pub(crate) fn cache(&self) -> &Cache<A, R, E> {
        &self.cache
    }

    pub(crate) fn options(&self) -> &EndpointOptions<A> {
        self.cache.options()
    }

    /// Create a fresh observer bound to this endpoint. Arguments are
    /// supplied afterward via the observer's `set_arg`/`trigger`.
    pub fn use_observer(&self, options: QueryOptions<A, R, E>) -> QueryObserver<A, R, E> {
        QueryObserver::new(self.clone(), options)
    }

    /// Call the function directly, bypassing the cache entirely.
    pub async fn invoke(&self, arg: A, signal: CancelSignal) -> Result<R, E> {
        (self.cache.fetcher())(arg, signal).await
    }

    /// `get_or_add` then refetch, but only if the entry is `Idle` or
    /// `Error` -- a prior success or an in-flight attempt is left alone.
    pub async fn prefetch(&self, arg: A) -> Result<(), QueryError<E>> {
        let execution = self.cache.get_or_add(arg);
        match execution.status() {
            Status::Idle | Status::Error => {
                execution.refetch().await?;
                Ok(())
            }
            Status::Loading | Status::Success => Ok(()),
        }
    }

    pub fn invalidate(&self, arg: &A) {
        self.cache.invalidate(arg);
    }

    pub fn invalidate_where(&self, predicate: impl FnMut(&A) -> bool) {
        self.cache.invalidate_where(predicate);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn update_query_data(&self, arg: &A, value: R) -> bool {
        self.cache.update_query_data(arg, value)
    }
}
