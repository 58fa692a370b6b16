use std::collections::HashMap;
use std::hash::Hash;

/// Fastest-fidelity index: key-derivation and probe failures are both
/// swallowed silently.
///
/// `Relaxed` does not retain the source once built — only successfully-keyed
/// elements are kept, grouped into buckets by key. This makes it the cheapest
/// of the four variants both to build and to query, at the cost of quietly
/// returning fewer rows than the naive nested scan would have produced before
/// it failed.
#[derive(Debug)]
pub struct RelaxedIndex<K, E> {
    buckets: HashMap<K, Vec<E>>,
}

impl<K, E> RelaxedIndex<K, E>
where
    K: Eq + Hash,
{
    /// Build a relaxed index from `source`, deriving each element's key via
    /// `key_selector`. Any element for which `key_selector` fails is skipped;
    /// it will never appear in any bucket.
    pub fn build<S, F, Err>(source: S, key_selector: F) -> Self
    where
        S: IntoIterator<Item = E>,
        F: Fn(&E) -> Result<K, Err>,
    {
        let mut buckets: HashMap<K, Vec<E>> = HashMap::new();
        #[cfg(feature = "tracing")]
        let mut skipped = 0usize;

        for element in source {
            match key_selector(&element) {
                Ok(key) => {
                    buckets.entry(key).or_default().push(element);
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    {
                        skipped += 1;
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            indexed = buckets.values().map(Vec::len).sum::<usize>(),
            skipped,
            "built relaxed index"
        );

        Self { buckets }
    }

    /// Look up every element sharing the key produced by `deferred_key`.
    ///
    /// Never fails: if `deferred_key` itself fails, or the resulting key has
    /// no bucket, an empty sequence is returned.
    pub fn lookup<Err>(
        &self,
        deferred_key: impl FnOnce() -> Result<K, Err>,
    ) -> RelaxedLookup<'_, E> {
        match deferred_key() {
            Ok(key) => match self.buckets.get(&key) {
                Some(bucket) => RelaxedLookup::Bucket(bucket.iter()),
                None => RelaxedLookup::Empty,
            },
            Err(_) => RelaxedLookup::Empty,
        }
    }

    /// Total number of successfully-indexed elements across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy result of [`RelaxedIndex::lookup`]. Never yields an error.
pub enum RelaxedLookup<'a, E> {
    Bucket(std::slice::Iter<'a, E>),
    Empty,
}

impl<'a, E> Iterator for RelaxedLookup<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RelaxedLookup::Bucket(iter) => iter.next(),
            RelaxedLookup::Empty => None,
        }
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

    #[derive(Debug)]
    struct NullDeref;

    fn key_of(item: &Item) -> Result<i32, NullDeref> {
        item.p.ok_or(NullDeref)
    }

    #[test]
    fn s1_equality_lookup_and_miss() {
        let source = vec![item(10), item(20), item(10), item(30)];
        let index = RelaxedIndex::build(source, key_of);

        let hit: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(10)).collect();
        assert_eq!(hit, vec![&item(10), &item(10)]);

        let miss: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(99)).collect();
        assert!(miss.is_empty());
    }

    #[test]
    fn skips_elements_whose_key_selector_fails() {
        let source = vec![
            Item { p: Some(1) },
            Item { p: None },
            Item { p: Some(2) },
        ];
        let index = RelaxedIndex::build(source, key_of);

        let hit: Vec<_> = index.lookup(|| Ok::<_, NullDeref>(1)).collect();
        assert_eq!(hit, vec![&Item { p: Some(1) }]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn failing_probe_yields_empty() {
        let source = vec![item(1), item(2)];
        let index = RelaxedIndex::build(source, key_of);

        let result: Vec<_> = index.lookup(|| Err::<i32, _>(NullDeref)).collect();
        assert!(result.is_empty());
    }

    #[test]
    fn empty_source_never_allocates_a_bucket() {
        let index: RelaxedIndex<i32, Item> = RelaxedIndex::build(Vec::new(), key_of);
        assert!(index.is_empty());
        assert!(index.lookup(|| Ok::<_, NullDeref>(0)).next().is_none());
    }
}
