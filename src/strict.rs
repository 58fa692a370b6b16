use std::collections::HashMap;
use std::hash::Hash;

use crate::failure::LookupFailure;

/// Exception-faithful index: reproduces the exact error, in the exact causal
/// order, that the naive nested scan would have raised.
///
/// Unlike [`RelaxedIndex`](crate::RelaxedIndex), `Strict` stops indexing the
/// instant `key_selector` fails on some element — everything from that point
/// on is simply unseen by the index, exactly as a naive scan would never get
/// past that element either. The source is retained so `lookup` can re-derive
/// `key_selector(source.first())` on demand.
pub struct StrictIndex<K, E, Err> {
    source: Vec<E>,
    buckets: HashMap<K, Vec<usize>>,
    key_selector: Box<dyn Fn(&E) -> Result<K, Err>>,
    /// Models a language where `k.equals(null)` can itself throw: some key
    /// types have a fallible null-equality check worth reproducing. Absent
    /// for ordinary keys, where equality can never fail.
    key_operand_probe: Option<Box<dyn Fn(&K) -> Result<(), Err>>>,
    first_key_failure: Option<Err>,
}

impl<K, E, Err> StrictIndex<K, E, Err>
where
    K: Eq + Hash,
{
    /// Build a strict index from `source`.
    ///
    /// If `key_selector` fails on some element, indexing halts there: the
    /// error is recorded and every later element is treated as unseen. When
    /// `key_operand_probe` is supplied, each successfully-derived key is also
    /// probed (modeling a fallible `key.equals(null)`) before being inserted,
    /// and a failure there halts indexing the same way.
    pub fn build<S, F, P>(source: S, key_selector: F, key_operand_probe: Option<P>) -> Self
    where
        S: IntoIterator<Item = E>,
        F: Fn(&E) -> Result<K, Err> + 'static,
        P: Fn(&K) -> Result<(), Err> + 'static,
    {
        let source: Vec<E> = source.into_iter().collect();
        let mut buckets: HashMap<K, Vec<usize>> = HashMap::new();
        let mut first_key_failure = None;
        let mut valid_prefix = 0usize;

        for (idx, element) in source.iter().enumerate() {
            let key = match key_selector(element) {
                Ok(key) => key,
                Err(e) => {
                    first_key_failure = Some(e);
                    break;
                }
            };
            if let Some(probe) = &key_operand_probe {
                if let Err(e) = probe(&key) {
                    first_key_failure = Some(e);
                    break;
                }
            }
            buckets.entry(key).or_default().push(idx);
            valid_prefix += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            valid_prefix,
            total = source.len(),
            halted = first_key_failure.is_some(),
            "built strict index"
        );

        Self {
            source,
            buckets,
            key_selector: Box::new(key_selector),
            key_operand_probe: key_operand_probe
                .map(|p| Box::new(p) as Box<dyn Fn(&K) -> Result<(), Err>>),
            first_key_failure,
        }
    }

    /// Look up every element sharing the key produced by `deferred_key`,
    /// reproducing the naive scan's error order.
    ///
    /// - If `deferred_key` fails and the source is empty, the result is empty
    ///   (the naive query never had anything to compare against).
    /// - If `deferred_key` fails and the source is non-empty, the surfaced
    ///   error is `key_selector(source.first())`'s error when
    ///   `key_before_criterion` is set and that call also fails, otherwise the
    ///   probe's own error.
    /// - If `non_static_equals` is set and this index was built with a
    ///   `key_operand_probe`, a successfully-produced criterion is additionally
    ///   probed before the bucket lookup.
    /// - If this index halted during `build`, every lookup's bucket is
    ///   followed by a trailing failure replaying that halt.
    pub fn lookup<'a>(
        &'a self,
        deferred_key: impl FnOnce() -> Result<K, Err>,
        key_before_criterion: bool,
        non_static_equals: bool,
    ) -> StrictLookup<'a, E, Err> {
        let criterion = match deferred_key() {
            Ok(key) => key,
            Err(probe_err) => {
                if self.source.is_empty() {
                    return StrictLookup::empty();
                }
                if key_before_criterion {
                    if let Err(build_err) = (self.key_selector)(&self.source[0]) {
                        return StrictLookup::failed(LookupFailure::KeyBuild(build_err));
                    }
                }
                return StrictLookup::failed(LookupFailure::Probe(probe_err));
            }
        };

        if non_static_equals {
            if let Some(probe) = &self.key_operand_probe {
                if let Err(e) = probe(&criterion) {
                    return StrictLookup::failed(LookupFailure::Probe(e));
                }
            }
        }

        let indices = self.buckets.get(&criterion).map(Vec::as_slice).unwrap_or(&[]);
        StrictLookup::bucket(&self.source, indices, self.first_key_failure.as_ref())
    }
}

enum StrictLookupState<'a, E> {
    Bucket { source: &'a [E], indices: std::slice::Iter<'a, usize> },
    Empty,
}

/// Lazy result of [`StrictIndex::lookup`]: matches in source order, possibly
/// followed by a single trailing error on the final advance.
pub struct StrictLookup<'a, E, Err> {
    state: StrictLookupState<'a, E>,
    pending_failure: Option<&'a Err>,
    immediate_failure: Option<LookupFailure<'a, Err>>,
}

impl<'a, E, Err> StrictLookup<'a, E, Err> {
    fn empty() -> Self {
        Self { state: StrictLookupState::Empty, pending_failure: None, immediate_failure: None }
    }

    fn failed(failure: LookupFailure<'a, Err>) -> Self {
        Self { state: StrictLookupState::Empty, pending_failure: None, immediate_failure: Some(failure) }
    }

    fn bucket(source: &'a [E], indices: &'a [usize], pending_failure: Option<&'a Err>) -> Self {
        Self {
            state: StrictLookupState::Bucket { source, indices: indices.iter() },
            pending_failure,
            immediate_failure: None,
        }
    }
}

impl<'a, E, Err> Iterator for StrictLookup<'a, E, Err> {
    type Item = Result<&'a E, LookupFailure<'a, Err>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(failure) = self.immediate_failure.take() {
            return Some(Err(failure));
        }
        if let StrictLookupState::Bucket { source, indices } = &mut self.state {
            if let Some(&idx) = indices.next() {
                return Some(Ok(&source[idx]));
            }
        }
        self.pending_failure.take().map(|e| Err(LookupFailure::Stored(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        p: Option<i32>,
    }

    fn item(p: i32) -> Item {
        Item { p: Some(p) }
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("null dereference")]
    struct NullDeref;

    fn key_of(item: &Item) -> Result<i32, NullDeref> {
        item.p.ok_or(NullDeref)
    }

    fn no_probe() -> Option<fn(&i32) -> Result<(), NullDeref>> {
        None
    }

    #[test]
    fn s4_probe_failure_and_empty_source() {
        let index = StrictIndex::build(vec![item(1), item(2)], key_of, no_probe());
        let result: Vec<_> = index.lookup(|| Err::<i32, _>(NullDeref), false, false).collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Err(LookupFailure::Probe(NullDeref))));

        let empty_index: StrictIndex<i32, Item, NullDeref> =
            StrictIndex::build(Vec::new(), key_of, no_probe());
        let result: Vec<_> = empty_index.lookup(|| Err(NullDeref), false, false).collect();
        assert!(result.is_empty());
    }

    #[test]
    fn key_before_criterion_prefers_the_first_elements_failure() {
        let source = vec![Item { p: None }, item(2)];
        let index = StrictIndex::build(source, key_of, no_probe());
        // build halted immediately (first element fails), so this exercises
        // the key_before_criterion branch of lookup instead.
        let result: Vec<_> = index.lookup(|| Err::<i32, _>(NullDeref), true, false).collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Err(LookupFailure::KeyBuild(NullDeref))));
    }

    #[test]
    fn s5_trailing_failure_after_valid_prefix() {
        let source = vec![item(1), item(2), Item { p: None }, item(4), item(5)];
        let index = StrictIndex::build(source, key_of, no_probe());

        let result: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(1), false, false).collect();
        assert_eq!(result.len(), 2);
        assert_eq!(*result[0].as_ref().unwrap(), &item(1));
        assert!(matches!(result[1], Err(LookupFailure::Stored(NullDeref))));

        // a second, unrelated lookup still replays the same halt.
        let miss: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(999), false, false).collect();
        assert_eq!(miss.len(), 1);
        assert!(matches!(miss[0], Err(LookupFailure::Stored(NullDeref))));
    }

    #[test]
    fn clean_source_never_trails_a_failure() {
        let source = vec![item(1), item(2), item(1)];
        let index = StrictIndex::build(source, key_of, no_probe());
        let result: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(1), false, false).collect();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(Result::is_ok));
    }

    #[test]
    fn key_operand_probe_can_halt_indexing() {
        let probe = |k: &i32| if *k == 2 { Err(NullDeref) } else { Ok(()) };
        let index = StrictIndex::build(vec![item(1), item(2), item(3)], key_of, Some(probe));
        let result: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(1), false, false).collect();
        assert_eq!(result.len(), 2); // [item(1)] + trailing failure
        assert!(result[0].is_ok());
        assert!(matches!(result[1], Err(LookupFailure::Stored(NullDeref))));
    }
}
