use std::{sync::Arc, time::Duration};

use crate::status::{FailureContext, SuccessContext};

/// Endpoint-wide defaults, set once when the endpoint is built.
pub struct EndpointOptions<A> {
    /// How two arguments are compared for cache-key purposes.
    pub key_equality: Arc<dyn Fn(&A, &A) -> bool + Send + Sync>,
    /// Default staleness window used by observers that don't override it.
    pub default_stale_time: Duration,
}

impl<A> EndpointOptions<A> {
    pub fn new(default_stale_time: Duration) -> Self
    where
        A: PartialEq,
    {
        Self {
            key_equality: Arc::new(|a: &A, b: &A| a == b),
            default_stale_time,
        }
    }

    pub fn with_key_equality(
        mut self,
        key_equality: impl Fn(&A, &A) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.key_equality = Arc::new(key_equality);
        self
    }
}

impl<A: PartialEq> Default for EndpointOptions<A> {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl<A> Clone for EndpointOptions<A> {
    fn clone(&self) -> Self {
        Self {
            key_equality: self.key_equality.clone(),
            default_stale_time: self.default_stale_time,
        }
    }
}

/// Per-observer options, overriding the endpoint's defaults.
pub struct QueryOptions<A, R, E> {
    /// `None` means "use the endpoint's `default_stale_time`".
    pub stale_time: Option<Duration>,
    pub on_success: Option<Arc<dyn Fn(&SuccessContext<A, R>) + Send + Sync>>,
    pub on_failure: Option<Arc<dyn Fn(&FailureContext<A, E>) + Send + Sync>>,
}

impl<A, R, E> QueryOptions<A, R, E> {
    pub fn empty() -> Self {
        Self {
            stale_time: None,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn with_on_success(
        mut self,
        on_success: impl Fn(&SuccessContext<A, R>) + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(on_success));
        self
    }

    pub fn with_on_failure(
        mut self,
        on_failure: impl Fn(&FailureContext<A, E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(on_failure));
        self
    }
}

impl<A, R, E> Default for QueryOptions<A, R, E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A, R, E> Clone for QueryOptions<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            stale_time: self.stale_time,
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<A, R, E> std::fmt::Debug for QueryOptions<A, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("stale_time", &self.stale_time)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}
