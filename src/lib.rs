//! Core of an asynchronous query-state manager.
//!
//! Turns an async function `A -> Result<R, E>` into an [`Endpoint`]: a
//! cache-backed, deduplicated, observable state machine keyed on the
//! argument. Multiple [`QueryObserver`]s sharing an endpoint and argument
//! share one in-flight request and one cached result.
//!
//! What this crate deliberately does not do: render anything, speak HTTP or
//! any wire protocol, persist its cache across restarts, poll in the
//! background, or coordinate invalidation across unrelated endpoints. Those
//! are host concerns layered on top of the primitives here.

mod cache;
mod cancel;
mod endpoint;
mod error;
mod execution;
mod instant;
mod observer;
mod options;
mod status;

pub use cancel::CancelSignal;
pub use endpoint::Endpoint;
pub use error::QueryError;
pub use execution::{Fetcher, FixedExecution, ObserverKey};
pub use instant::{Clock, Instant, SystemClock};
pub use observer::{ListenerKey, QueryObserver};
pub use options::{EndpointOptions, QueryOptions};
pub use status::{FailureContext, Status, SuccessContext};

pub use instant::test_support;
