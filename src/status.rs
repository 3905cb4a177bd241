/// The four-way lifecycle of a single [`crate::FixedExecution`].
///
/// A sum type rather than a cluster of booleans: `isLoading`, `hasData`,
/// etc. on [`crate::QueryObserver`] are pattern-match projections over this,
/// not independent flags that could disagree with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// No attempt has been started for this argument yet.
    #[default]
    Idle,
    /// An attempt is in flight and no prior success exists.
    Loading,
    /// The most recent completed attempt produced data.
    Success,
    /// The most recent completed attempt failed.
    Error,
}

/// Context handed to an observer's `onSuccess` callback.
#[derive(Debug, Clone)]
pub struct SuccessContext<A, R> {
    pub arg: A,
    pub result: R,
}

/// Context handed to an observer's `onFailure` callback.
#[derive(Debug, Clone)]
pub struct FailureContext<A, E> {
    pub arg: A,
    pub error: E,
}
