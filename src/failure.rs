/// The reason a `lookup` call surfaced an error, distinguishing *which* step
/// of the reconstructed naive-scan failure order produced it.
///
/// `Probe` and `KeyBuild` wrap an error produced fresh by this very lookup
/// call (evaluating the deferred key, or re-running the key selector while
/// reconstructing the original failure order). `Stored` instead *borrows*
/// an error recorded once during index construction — since a sealed index
/// can answer arbitrarily many independent lookups, a recorded failure is
/// read by reference rather than cloned or moved out, so `Err` needs no
/// `Clone` bound anywhere in this crate.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum LookupFailure<'a, Err> {
    /// The deferred probe key itself (`deferred_key()`) failed to produce a key.
    #[error("probe key evaluation failed: {0}")]
    Probe(Err),
    /// While reconstructing the naive scan's original failure order, re-running
    /// `key_selector` on an element (e.g. the source's first element) failed.
    #[error("key selector failed while reconstructing original failure order: {0}")]
    KeyBuild(Err),
    /// A failure recorded during index construction is being replayed now that
    /// this lookup has reached the point the naive scan would have hit it.
    #[error("stored key-build failure from index construction: {0}")]
    Stored(&'a Err),
}
