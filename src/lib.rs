//! Exception-faithful hash indexes for the classic "for each element, find all
//! other elements with the same key" nested-lookup pattern.
//!
//! A naive nested scan re-evaluates `key_selector` for every pair of elements
//! and observes each failure at the moment it happens, in source order. A
//! plain hash index would evaluate `key_selector` once per element up front
//! and silently reorder or hide those failures. The four index variants here
//! each choose a different point on that tradeoff:
//!
//! - [`RelaxedIndex`]: fastest, swallows every failure.
//! - [`StrictIndex`]: reproduces the naive scan's failure, in its original order.
//! - [`PartlyRelaxedIndex`]: reproduces a stored failure only when a residual
//!   predicate says the failing element would still have been visited.
//! - [`SlowGroupIndex`]: hands back per-element wrappers so the caller decides
//!   when (and whether) to resolve a failure.
//!
//! All four are built eagerly from a finite, already-owned source and are
//! immutable from the moment `build` returns: there are no `&mut self`
//! methods on a built index, so "Sealed" is enforced by the type system
//! rather than by a runtime flag.

mod failure;
mod partly_relaxed;
mod relaxed;
mod slow_group;
mod strict;

pub use failure::LookupFailure;
pub use partly_relaxed::{PartlyRelaxedIndex, PartlyRelaxedLookup};
pub use relaxed::{RelaxedIndex, RelaxedLookup};
pub use slow_group::{GroupedFailure, GroupedItem, SlowGroupIndex, SlowGroupLookup};
pub use strict::{StrictIndex, StrictLookup};
