use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

/// Grouping-style index that hands back per-element wrappers instead of
/// raising key-build failures eagerly, so the caller decides whether and when
/// to resolve them.
///
/// Unlike a naive port of the source design, `lookup` never mutates or reuses
/// any per-instance state across calls — every call allocates its own small,
/// immutable view, exactly as the design notes this crate is built from
/// recommend ("allocate a fresh lightweight view per lookup; measure before
/// reintroducing pooling"). That makes this variant just as safe for
/// concurrent lookup as the other three, unlike the shared-mutable-wrapper
/// design it's adapted from.
pub struct SlowGroupIndex<K, E, Err> {
    source: Vec<E>,
    /// Indices into `source`, grouped contiguously by key.
    ordered: Vec<usize>,
    /// key -> half-open `[start, stop)` range into `ordered`.
    groups: HashMap<K, (usize, usize)>,
    /// `(index into source, error)` for every element whose key selector failed.
    key_failures: Vec<(usize, Err)>,
}

impl<K, E, Err> SlowGroupIndex<K, E, Err>
where
    K: Eq + Hash,
{
    /// Build a slow-group index from `source`. Every element is visited;
    /// elements whose key selector fails are recorded in `key_failures`
    /// rather than being sorted into a group.
    pub fn build<S, F>(source: S, key_selector: F) -> Self
    where
        S: IntoIterator<Item = E>,
        F: Fn(&E) -> Result<K, Err>,
    {
        let source: Vec<E> = source.into_iter().collect();
        let mut buckets: HashMap<K, Vec<usize>> = HashMap::new();
        let mut key_failures = Vec::new();

        for (idx, element) in source.iter().enumerate() {
            match key_selector(element) {
                Ok(key) => buckets.entry(key).or_default().push(idx),
                Err(e) => key_failures.push((idx, e)),
            }
        }

        let mut ordered = Vec::with_capacity(source.len());
        let mut groups = HashMap::with_capacity(buckets.len());
        for (key, indices) in buckets {
            let start = ordered.len();
            ordered.extend(indices);
            groups.insert(key, (start, ordered.len()));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            groups = groups.len(),
            failed = key_failures.len(),
            "built slow-group index"
        );

        Self { source, ordered, groups, key_failures }
    }

    /// Look up the grouping for the key produced by `deferred_key`.
    ///
    /// If `deferred_key` fails, every element of the source is yielded,
    /// wrapped with that shared failure — any consumer that resolves any one
    /// of those wrappers observes the same error. Otherwise, the matching
    /// group's elements are yielded in source order, followed by every
    /// element whose own key selector failed during build (the naive
    /// grouping scan would have reached those elements too, regardless of
    /// which key is being looked up, since it has to derive every element's
    /// key to know which group it belongs to).
    pub fn lookup<'a>(
        &'a self,
        deferred_key: impl FnOnce() -> Result<K, Err>,
    ) -> SlowGroupLookup<'a, E, Err> {
        match deferred_key() {
            Err(probe_err) => SlowGroupLookup::argument_exception(&self.source, probe_err),
            Ok(key) => {
                let range = self.groups.get(&key).copied();
                SlowGroupLookup::group(&self.source, &self.ordered, range, &self.key_failures)
            }
        }
    }
}

enum GroupedItemInner<'a, E, Err> {
    Valid(&'a E),
    Stored(&'a E, &'a Err),
    Probe(&'a E, Rc<Err>),
}

/// A single element wrapper returned by [`SlowGroupIndex::lookup`]. Carries
/// its pending error (if any) as data rather than raising it immediately;
/// call [`GroupedItem::into_result`] to resolve it.
pub struct GroupedItem<'a, E, Err> {
    inner: GroupedItemInner<'a, E, Err>,
}

impl<'a, E, Err> GroupedItem<'a, E, Err>
where
    Err: std::fmt::Display,
{
    /// Resolve this wrapper: `Ok` for a successfully-keyed element, `Err` for
    /// one whose own key selector failed during build, or whose whole lookup
    /// was wrapping the original probe's failure.
    pub fn into_result(self) -> Result<&'a E, GroupedFailure<'a, Err>> {
        match self.inner {
            GroupedItemInner::Valid(element) => Ok(element),
            GroupedItemInner::Stored(_, err) => Err(GroupedFailure::Stored(err)),
            GroupedItemInner::Probe(_, err) => Err(GroupedFailure::Probe(err)),
        }
    }
}

impl<'a, E, Err> GroupedItem<'a, E, Err> {
    /// The wrapped element, regardless of whether its key succeeded.
    pub fn value(&self) -> &'a E {
        match self.inner {
            GroupedItemInner::Valid(element)
            | GroupedItemInner::Stored(element, _)
            | GroupedItemInner::Probe(element, _) => element,
        }
    }

    /// `true` if resolving this wrapper will not fail.
    pub fn is_valid(&self) -> bool {
        matches!(self.inner, GroupedItemInner::Valid(_))
    }
}

/// The error a [`GroupedItem`] carries once resolved.
#[derive(Debug, thiserror::Error)]
pub enum GroupedFailure<'a, Err>
where
    Err: std::fmt::Display,
{
    /// This element's own key selector failed during index construction.
    #[error("key selector failed for this element during index construction: {}", *.0)]
    Stored(&'a Err),
    /// The deferred probe key failed; every element in this lookup shares this error.
    #[error("probe key evaluation failed: {0}")]
    Probe(Rc<Err>),
}

enum SlowGroupLookupState<'a, E, Err> {
    Group {
        source: &'a [E],
        group_indices: std::slice::Iter<'a, usize>,
        failures: std::slice::Iter<'a, (usize, Err)>,
    },
    ArgumentException {
        remaining: std::slice::Iter<'a, E>,
        probe_err: Rc<Err>,
    },
    Empty,
}

/// Lazy result of [`SlowGroupIndex::lookup`]: a sequence of [`GroupedItem`]s.
pub struct SlowGroupLookup<'a, E, Err> {
    state: SlowGroupLookupState<'a, E, Err>,
}

impl<'a, E, Err> SlowGroupLookup<'a, E, Err> {
    fn group(
        source: &'a [E],
        ordered: &'a [usize],
        range: Option<(usize, usize)>,
        failures: &'a [(usize, Err)],
    ) -> Self {
        let (start, stop) = match range {
            Some(range) => range,
            // no element has this key: the naive scan's nested loop would never
            // compare against anything, so this lookup is empty regardless of
            // which elements failed to key during construction.
            None => return Self { state: SlowGroupLookupState::Empty },
        };
        Self {
            state: SlowGroupLookupState::Group {
                source,
                group_indices: ordered[start..stop].iter(),
                failures: failures.iter(),
            },
        }
    }

    fn argument_exception(source: &'a [E], probe_err: Err) -> Self {
        Self {
            state: SlowGroupLookupState::ArgumentException {
                remaining: source.iter(),
                probe_err: Rc::new(probe_err),
            },
        }
    }
}

impl<'a, E, Err> Iterator for SlowGroupLookup<'a, E, Err> {
    type Item = GroupedItem<'a, E, Err>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            SlowGroupLookupState::Group { source, group_indices, failures } => {
                if let Some(&idx) = group_indices.next() {
                    return Some(GroupedItem { inner: GroupedItemInner::Valid(&source[idx]) });
                }
                failures.next().map(|(idx, err)| GroupedItem {
                    inner: GroupedItemInner::Stored(&source[*idx], err),
                })
            }
            SlowGroupLookupState::ArgumentException { remaining, probe_err } => {
                remaining.next().map(|element| GroupedItem {
                    inner: GroupedItemInner::Probe(element, probe_err.clone()),
                })
            }
            SlowGroupLookupState::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        k: Option<&'static str>,
        v: i32,
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("null key")]
    struct NullKey;

    fn key_of(record: &Record) -> Result<&'static str, NullKey> {
        record.k.ok_or(NullKey)
    }

    #[test]
    fn s6_grouping_with_trailing_failures() {
        let source = vec![
            Record { k: Some("x"), v: 1 },
            Record { k: None, v: 2 },
            Record { k: Some("x"), v: 3 },
        ];
        let index = SlowGroupIndex::build(source, key_of);

        let items: Vec<_> = index.lookup(|| Ok::<_, NullKey>("x")).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_valid());
        assert!(items[1].is_valid());
        assert!(!items[2].is_valid());

        let values: Vec<i32> = items.iter().map(|item| item.value().v).collect();
        assert_eq!(values, vec![1, 3, 2]);

        let mut resolved = items.into_iter();
        assert_eq!(resolved.next().unwrap().into_result().unwrap().v, 1);
        assert_eq!(resolved.next().unwrap().into_result().unwrap().v, 3);
        assert!(matches!(
            resolved.next().unwrap().into_result(),
            Err(GroupedFailure::Stored(NullKey))
        ));
    }

    #[test]
    fn miss_yields_an_empty_sequence_even_with_unrelated_failures() {
        let source = vec![
            Record { k: Some("x"), v: 1 },
            Record { k: None, v: 2 },
        ];
        let index = SlowGroupIndex::build(source, key_of);
        let items: Vec<_> = index.lookup(|| Ok::<_, NullKey>("y")).collect();
        assert!(items.is_empty());
    }

    #[test]
    fn probe_failure_wraps_the_whole_source() {
        let source = vec![Record { k: Some("x"), v: 1 }, Record { k: Some("y"), v: 2 }];
        let index = SlowGroupIndex::build(source, key_of);
        let items: Vec<_> = index.lookup(|| Err::<&'static str, _>(NullKey)).collect();
        assert_eq!(items.len(), 2);
        for item in &items {
            assert!(!item.is_valid());
        }
        assert!(matches!(items.into_iter().next().unwrap().into_result(), Err(GroupedFailure::Probe(_))));
    }
}
