use std::collections::HashMap;
use std::hash::Hash;

use crate::failure::LookupFailure;

/// Intermediate-fidelity index: every key-build failure is retained (unlike
/// [`StrictIndex`](crate::StrictIndex), indexing never halts early), but a
/// stored failure is only raised on lookup when a caller-supplied *residual
/// predicate* says the failing element would still have reached the naive
/// scan's result.
pub struct PartlyRelaxedIndex<K, E, Err> {
    source: Vec<E>,
    buckets: HashMap<K, Vec<usize>>,
    key_selector: Box<dyn Fn(&E) -> Result<K, Err>>,
    /// `(index into source, error)` pairs in source order.
    key_failures: Vec<(usize, Err)>,
}

impl<K, E, Err> PartlyRelaxedIndex<K, E, Err>
where
    K: Eq + Hash,
{
    /// Build a partly-relaxed index from `source`. Every element is visited;
    /// elements whose key selector fails are recorded in `key_failures`
    /// instead of halting the scan.
    pub fn build<S, F>(source: S, key_selector: F) -> Self
    where
        S: IntoIterator<Item = E>,
        F: Fn(&E) -> Result<K, Err> + 'static,
    {
        let source: Vec<E> = source.into_iter().collect();
        let mut buckets: HashMap<K, Vec<usize>> = HashMap::new();
        let mut key_failures = Vec::new();

        for (idx, element) in source.iter().enumerate() {
            match key_selector(element) {
                Ok(key) => {
                    buckets.entry(key).or_default().push(idx);
                }
                Err(e) => key_failures.push((idx, e)),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            indexed = source.len() - key_failures.len(),
            failed = key_failures.len(),
            "built partly-relaxed index"
        );

        Self { source, buckets, key_selector: Box::new(key_selector), key_failures }
    }

    /// Look up every element sharing the key produced by `deferred_key`,
    /// filtered by `residual_predicate` when present.
    ///
    /// - If `deferred_key` fails and the source is empty, the result is empty.
    /// - If `deferred_key` fails, `residual_predicate` is absent: optionally
    ///   re-run `key_selector(source.first())` (when `key_before_criterion`),
    ///   then surface the probe's error.
    /// - If `deferred_key` fails, `residual_predicate` is present: scan for
    ///   the first element satisfying it; if found, apply the same
    ///   `key_before_criterion` logic to *that* element before surfacing the
    ///   probe's error, otherwise return empty.
    /// - Otherwise, surface the first stored key-build failure that
    ///   `residual_predicate` (if any) admits, before returning any results.
    /// - The returned bucket is filtered by `residual_predicate` when present.
    pub fn lookup<'a>(
        &'a self,
        deferred_key: impl FnOnce() -> Result<K, Err>,
        key_before_criterion: bool,
        residual_predicate: Option<&'a dyn Fn(&E) -> bool>,
    ) -> PartlyRelaxedLookup<'a, E, Err> {
        let criterion = match deferred_key() {
            Ok(key) => key,
            Err(probe_err) => {
                if self.source.is_empty() {
                    return PartlyRelaxedLookup::empty();
                }
                let admitting_element = match residual_predicate {
                    None => Some(&self.source[0]),
                    Some(p) => self.source.iter().find(|e| p(e)),
                };
                return match admitting_element {
                    None => PartlyRelaxedLookup::empty(),
                    Some(element) => {
                        if key_before_criterion {
                            if let Err(build_err) = (self.key_selector)(element) {
                                return PartlyRelaxedLookup::failed(LookupFailure::KeyBuild(build_err));
                            }
                        }
                        PartlyRelaxedLookup::failed(LookupFailure::Probe(probe_err))
                    }
                };
            }
        };

        let stored_failure = match residual_predicate {
            None => self.key_failures.first(),
            Some(p) => self.key_failures.iter().find(|(idx, _)| p(&self.source[*idx])),
        };
        if let Some((_, e)) = stored_failure {
            return PartlyRelaxedLookup::failed(LookupFailure::Stored(e));
        }

        let indices = self.buckets.get(&criterion).map(Vec::as_slice).unwrap_or(&[]);
        PartlyRelaxedLookup::bucket(&self.source, indices, residual_predicate)
    }
}

enum PartlyRelaxedState<'a, E> {
    Bucket {
        source: &'a [E],
        indices: std::slice::Iter<'a, usize>,
        residual_predicate: Option<&'a dyn Fn(&E) -> bool>,
    },
    Empty,
}

/// Lazy result of [`PartlyRelaxedIndex::lookup`].
pub struct PartlyRelaxedLookup<'a, E, Err> {
    state: PartlyRelaxedState<'a, E>,
    immediate_failure: Option<LookupFailure<'a, Err>>,
}

impl<'a, E, Err> PartlyRelaxedLookup<'a, E, Err> {
    fn empty() -> Self {
        Self { state: PartlyRelaxedState::Empty, immediate_failure: None }
    }

    fn failed(failure: LookupFailure<'a, Err>) -> Self {
        Self { state: PartlyRelaxedState::Empty, immediate_failure: Some(failure) }
    }

    fn bucket(source: &'a [E], indices: &'a [usize], residual_predicate: Option<&'a dyn Fn(&E) -> bool>) -> Self {
        Self {
            state: PartlyRelaxedState::Bucket { source, indices: indices.iter(), residual_predicate },
            immediate_failure: None,
        }
    }
}

impl<'a, E, Err> Iterator for PartlyRelaxedLookup<'a, E, Err> {
    type Item = Result<&'a E, LookupFailure<'a, Err>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(failure) = self.immediate_failure.take() {
            return Some(Err(failure));
        }
        match &mut self.state {
            PartlyRelaxedState::Bucket { source, indices, residual_predicate } => {
                for &idx in indices.by_ref() {
                    let element = &source[idx];
                    if residual_predicate.map_or(true, |p| p(element)) {
                        return Some(Ok(element));
                    }
                }
                None
            }
            PartlyRelaxedState::Empty => None,
        }
    }
}
