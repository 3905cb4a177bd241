use std::sync::{Arc, Mutex};

use crate::{
    execution::{Fetcher, FixedExecution},
    instant::Clock,
    options::EndpointOptions,
};

/// Keyed store of [`FixedExecution`]s for a single endpoint.
///
/// Lookup uses the endpoint's configurable key-equality rather than
/// `HashMap`'s `Hash`/`Eq`, so arguments only need `PartialEq`-like
/// comparison, not hashing.
pub struct Cache<A, R, E> {
    fetcher: Fetcher<A, R, E>,
    clock: Arc<dyn Clock>,
    options: EndpointOptions<A>,
    entries: Mutex<Vec<FixedExecution<A, R, E>>>,
}

impl<A, R, E> Cache<A, R, E>
where
    A: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(fetcher: Fetcher<A, R, E>, clock: Arc<dyn Clock>, options: EndpointOptions<A>) -> Self {
        Self {
            fetcher,
            clock,
            options,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn options(&self) -> &EndpointOptions<A> {
        &self.options
    }

    pub(crate) fn fetcher(&self) -> Fetcher<A, R, E> {
        self.fetcher.clone()
    }

    fn find(&self, entries: &[FixedExecution<A, R, E>], arg: &A) -> Option<usize> {
        entries
            .iter()
            .position(|entry| (self.options.key_equality)(entry.arg(), arg))
    }

    /// Return the entry for `arg`, creating and inserting an `Idle` one if
    /// absent.
    pub fn get_or_add(&self, arg: A) -> FixedExecution<A, R, E> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(index) = self.find(&entries, &arg) {
            return entries[index].clone();
        }
        let execution = FixedExecution::new(arg, self.fetcher.clone(), self.clock.clone());
        entries.push(execution.clone());
        execution
    }

    /// Return an existing entry for `arg` without creating one.
    pub fn get(&self, arg: &A) -> Option<FixedExecution<A, R, E>> {
        let entries = self.entries.lock().unwrap();
        self.find(&entries, arg).map(|index| entries[index].clone())
    }

    /// Allocate a fresh entry that is never inserted into the map, used by
    /// the `trigger` ("mutation") pattern. Collisions with cached entries
    /// are impossible by construction.
    pub fn add_uncached(&self, arg: A) -> FixedExecution<A, R, E> {
        FixedExecution::new(arg, self.fetcher.clone(), self.clock.clone())
    }

    pub fn invalidate(&self, arg: &A) {
        let entries = self.entries.lock().unwrap();
        if let Some(index) = self.find(&entries, arg) {
            entries[index].invalidate();
        }
    }

    pub fn invalidate_where(&self, mut predicate: impl FnMut(&A) -> bool) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            if predicate(entry.arg()) {
                entry.invalidate();
            }
        }
    }

    pub fn invalidate_all(&self) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            entry.invalidate();
        }
    }

    /// Set `arg`'s data directly. Returns `false` if no entry exists yet.
    pub fn update_query_data(&self, arg: &A, value: R) -> bool {
        let entries = self.entries.lock().unwrap();
        match self.find(&entries, arg) {
            Some(index) => {
                entries[index].update_data(value);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
