/// Errors surfaced by the core back to a caller.
///
/// `E` is the error type of the user-supplied async function. A cancelled
/// attempt is never reported as `Failed`; it is its own variant so callers
/// can distinguish "the function rejected" from "someone called `cancel`".
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError<E> {
    /// The async function itself returned an error.
    #[error("query function failed")]
    Failed(#[source] E),

    /// The in-flight attempt was cancelled before it completed.
    #[error("query was cancelled")]
    Cancelled,

    /// An observer with no `current` execution was asked to refetch.
    #[error("observer has no current execution to {0}")]
    NoCurrentExecution(&'static str),
}

impl<E> QueryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }
}
