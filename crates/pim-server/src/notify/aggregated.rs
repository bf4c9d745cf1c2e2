//! Aggregated fetch scopes (C3, §4.3): the reference-counted union of what
//! every currently subscribed observer wants fetched, kept per entity kind
//! so the collector (C4) fetches each entity at most once per notification
//! regardless of subscriber count.
//!
//! Semantics recap (§4.3):
//! - "at least one wants X" booleans: true iff the counter for X is > 0.
//! - "all want X" booleans (`cacheOnly`, `fetchIdOnly`): true iff the
//!   counter equals the current subscriber count.
//! - attribute sets: reference-counted union, a name drops out at zero.
//! - ancestor depth: the maximum requested depth wins.
//! - `fetchAllAttributes` defaults true, suppressed only when every
//!   subscriber has explicitly opted out.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use pim_model::AncestorDepth;
use pim_protocol::{CollectionFetchScope, ItemFetchScope, TagFetchScope};

fn ancestor_index(depth: AncestorDepth) -> usize {
    match depth {
        AncestorDepth::None => 0,
        AncestorDepth::Parent => 1,
        AncestorDepth::All => 2,
    }
}

fn ancestor_from_index(idx: usize) -> AncestorDepth {
    match idx {
        0 => AncestorDepth::None,
        1 => AncestorDepth::Parent,
        _ => AncestorDepth::All,
    }
}

#[derive(Default)]
struct ItemInner {
    subscriber_count: usize,
    parts: BTreeMap<Vec<u8>, usize>,
    ancestor_counts: [usize; 3],
    cache_only_count: usize,
    full_payload_count: usize,
    all_attributes_optout_count: usize,
    fetch_size_count: usize,
    fetch_mtime_count: usize,
    fetch_remote_revision_count: usize,
    ignore_errors_count: usize,
    fetch_flags_count: usize,
    fetch_remote_id_count: usize,
    fetch_gid_count: usize,
    fetch_tags_count: usize,
    fetch_relations_count: usize,
    fetch_virtual_references_count: usize,
}

impl ItemInner {
    fn adjust(&mut self, scope: &ItemFetchScope, delta: isize) {
        for part in &scope.requested_parts {
            let entry = self.parts.entry(part.clone()).or_insert(0);
            *entry = (*entry as isize + delta).max(0) as usize;
            if *entry == 0 {
                self.parts.remove(part);
            }
        }
        let idx = ancestor_index(scope.ancestor_depth);
        self.ancestor_counts[idx] = (self.ancestor_counts[idx] as isize + delta).max(0) as usize;

        let bump = |count: &mut usize, flag: bool| {
            if flag {
                *count = (*count as isize + delta).max(0) as usize;
            }
        };
        bump(&mut self.cache_only_count, scope.cache_only);
        bump(&mut self.full_payload_count, scope.full_payload);
        bump(&mut self.all_attributes_optout_count, !scope.all_attributes);
        bump(&mut self.fetch_size_count, scope.fetch_size);
        bump(&mut self.fetch_mtime_count, scope.fetch_mtime);
        bump(&mut self.fetch_remote_revision_count, scope.fetch_remote_revision);
        bump(&mut self.ignore_errors_count, scope.ignore_errors);
        bump(&mut self.fetch_flags_count, scope.fetch_flags);
        bump(&mut self.fetch_remote_id_count, scope.fetch_remote_id);
        bump(&mut self.fetch_gid_count, scope.fetch_gid);
        bump(&mut self.fetch_tags_count, scope.fetch_tags);
        bump(&mut self.fetch_relations_count, scope.fetch_relations);
        bump(&mut self.fetch_virtual_references_count, scope.fetch_virtual_references);
    }

    fn derived(&self) -> ItemFetchScope {
        let max_ancestor_idx = self
            .ancestor_counts
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &count)| count > 0)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let all_want = |count: usize| self.subscriber_count > 0 && count == self.subscriber_count;
        ItemFetchScope {
            requested_parts: self.parts.keys().cloned().collect(),
            ancestor_depth: ancestor_from_index(max_ancestor_idx),
            cache_only: all_want(self.cache_only_count),
            full_payload: self.full_payload_count > 0,
            all_attributes: !(self.subscriber_count > 0 && self.all_attributes_optout_count == self.subscriber_count),
            fetch_size: self.fetch_size_count > 0,
            fetch_mtime: self.fetch_mtime_count > 0,
            fetch_remote_revision: self.fetch_remote_revision_count > 0,
            ignore_errors: self.subscriber_count > 0 && self.ignore_errors_count == self.subscriber_count,
            fetch_flags: self.fetch_flags_count > 0,
            fetch_remote_id: self.fetch_remote_id_count > 0,
            fetch_gid: self.fetch_gid_count > 0,
            fetch_tags: self.fetch_tags_count > 0,
            fetch_relations: self.fetch_relations_count > 0,
            fetch_virtual_references: self.fetch_virtual_references_count > 0,
        }
    }
}

/// Per-item aggregated fetch scope (§4.3). `ignoreErrors` uses "all want"
/// semantics like `cacheOnly`: a single subscriber that cares about errors
/// forces the collector to honor them for everyone (§8 scenario 1).
pub struct AggregatedItemScope {
    inner: Mutex<ItemInner>,
}

impl Default for AggregatedItemScope {
    fn default() -> Self {
        Self { inner: Mutex::new(ItemInner::default()) }
    }
}

impl AggregatedItemScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscriber(&self, scope: &ItemFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count += 1;
        inner.adjust(scope, 1);
    }

    pub fn remove_subscriber(&self, scope: &ItemFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count = inner.subscriber_count.saturating_sub(1);
        inner.adjust(scope, -1);
    }

    /// §4.3 "Updates: `apply(oldScope, newScope)` computes per-field deltas
    /// from one subscriber and mutates counters accordingly", used when a
    /// `ModifySubscription` changes an existing subscriber's scope without
    /// changing the subscriber count.
    pub fn apply(&self, old: &ItemFetchScope, new: &ItemFetchScope) {
        let mut inner = self.inner.lock();
        inner.adjust(old, -1);
        inner.adjust(new, 1);
    }

    pub fn derived(&self) -> ItemFetchScope {
        self.inner.lock().derived()
    }
}

#[derive(Default)]
struct CollectionInner {
    subscriber_count: usize,
    include_statistics_count: usize,
    fetch_id_only_count: usize,
    attributes: BTreeMap<Vec<u8>, usize>,
}

impl CollectionInner {
    fn adjust(&mut self, scope: &CollectionFetchScope, delta: isize) {
        let bump = |count: &mut usize, flag: bool| {
            if flag {
                *count = (*count as isize + delta).max(0) as usize;
            }
        };
        bump(&mut self.include_statistics_count, scope.include_statistics);
        bump(&mut self.fetch_id_only_count, scope.fetch_id_only);
        for attr in &scope.attributes {
            let entry = self.attributes.entry(attr.clone()).or_insert(0);
            *entry = (*entry as isize + delta).max(0) as usize;
            if *entry == 0 {
                self.attributes.remove(attr);
            }
        }
    }

    fn derived(&self) -> CollectionFetchScope {
        CollectionFetchScope {
            include_statistics: self.include_statistics_count > 0,
            fetch_id_only: self.subscriber_count > 0 && self.fetch_id_only_count == self.subscriber_count,
            attributes: self.attributes.keys().cloned().collect(),
        }
    }
}

/// Per-collection aggregated fetch scope (§4.3). `fetchIdOnly` is the
/// collection-kind exclusivity flag mentioned alongside `cacheOnly`.
pub struct AggregatedCollectionScope {
    inner: Mutex<CollectionInner>,
}

impl Default for AggregatedCollectionScope {
    fn default() -> Self {
        Self { inner: Mutex::new(CollectionInner::default()) }
    }
}

impl AggregatedCollectionScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscriber(&self, scope: &CollectionFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count += 1;
        inner.adjust(scope, 1);
    }

    pub fn remove_subscriber(&self, scope: &CollectionFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count = inner.subscriber_count.saturating_sub(1);
        inner.adjust(scope, -1);
    }

    pub fn apply(&self, old: &CollectionFetchScope, new: &CollectionFetchScope) {
        let mut inner = self.inner.lock();
        inner.adjust(old, -1);
        inner.adjust(new, 1);
    }

    pub fn derived(&self) -> CollectionFetchScope {
        self.inner.lock().derived()
    }
}

#[derive(Default)]
struct TagInner {
    subscriber_count: usize,
    fetch_id_only_count: usize,
    fetch_remote_id_count: usize,
    fetch_all_attributes_optout_count: usize,
    attributes: BTreeMap<Vec<u8>, usize>,
}

impl TagInner {
    fn adjust(&mut self, scope: &TagFetchScope, delta: isize) {
        let bump = |count: &mut usize, flag: bool| {
            if flag {
                *count = (*count as isize + delta).max(0) as usize;
            }
        };
        bump(&mut self.fetch_id_only_count, scope.fetch_id_only);
        bump(&mut self.fetch_remote_id_count, scope.fetch_remote_id);
        bump(&mut self.fetch_all_attributes_optout_count, !scope.fetch_all_attributes);
        for attr in &scope.attributes {
            let entry = self.attributes.entry(attr.clone()).or_insert(0);
            *entry = (*entry as isize + delta).max(0) as usize;
            if *entry == 0 {
                self.attributes.remove(attr);
            }
        }
    }

    fn derived(&self) -> TagFetchScope {
        TagFetchScope {
            fetch_id_only: self.subscriber_count > 0 && self.fetch_id_only_count == self.subscriber_count,
            fetch_remote_id: self.fetch_remote_id_count > 0,
            fetch_all_attributes: !(self.subscriber_count > 0
                && self.fetch_all_attributes_optout_count == self.subscriber_count),
            attributes: self.attributes.keys().cloned().collect(),
        }
    }
}

/// Per-tag aggregated fetch scope (§4.3, §4.7 "`fetchAllAttributes` and an
/// explicit attribute allow-list combine additively").
pub struct AggregatedTagScope {
    inner: Mutex<TagInner>,
}

impl Default for AggregatedTagScope {
    fn default() -> Self {
        Self { inner: Mutex::new(TagInner::default()) }
    }
}

impl AggregatedTagScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscriber(&self, scope: &TagFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count += 1;
        inner.adjust(scope, 1);
    }

    pub fn remove_subscriber(&self, scope: &TagFetchScope) {
        let mut inner = self.inner.lock();
        inner.subscriber_count = inner.subscriber_count.saturating_sub(1);
        inner.adjust(scope, -1);
    }

    pub fn apply(&self, old: &TagFetchScope, new: &TagFetchScope) {
        let mut inner = self.inner.lock();
        inner.adjust(old, -1);
        inner.adjust(new, 1);
    }

    pub fn derived(&self) -> TagFetchScope {
        self.inner.lock().derived()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    fn scope_with(parts: &[&str], ancestor: AncestorDepth, cache_only: bool, ignore_errors: bool) -> ItemFetchScope {
        let mut scope = ItemFetchScope::default();
        scope.requested_parts = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        scope.ancestor_depth = ancestor;
        scope.cache_only = cache_only;
        scope.ignore_errors = ignore_errors;
        scope
    }

    /// §8 scenario 1: two subscribers, A narrower, B wider; union takes the
    /// widest view, and removing B must restore A's exact values.
    #[test]
    fn scenario_one_aggregated_item_scope_two_subscribers() {
        let agg = AggregatedItemScope::new();
        let a = scope_with(&["FOO"], AncestorDepth::Parent, true, true);
        agg.add_subscriber(&a);

        let b = scope_with(&["FOO"], AncestorDepth::All, true, true);
        agg.add_subscriber(&b);

        let derived = agg.derived();
        assert_eq!(derived.requested_parts.len(), 1);
        assert!(derived.requested_parts.contains(b"FOO".as_slice()));
        assert_eq!(derived.ancestor_depth, AncestorDepth::All);
        assert!(derived.cache_only);
        assert!(derived.ignore_errors);

        agg.remove_subscriber(&b);
        let derived = agg.derived();
        assert_eq!(derived.ancestor_depth, AncestorDepth::Parent);
        assert!(derived.cache_only);
    }

    #[test]
    fn all_want_semantics_drop_when_one_subscriber_disagrees() {
        let agg = AggregatedItemScope::new();
        agg.add_subscriber(&scope_with(&[], AncestorDepth::None, true, true));
        agg.add_subscriber(&scope_with(&[], AncestorDepth::None, false, false));
        let derived = agg.derived();
        assert!(!derived.cache_only);
        assert!(!derived.ignore_errors);
    }

    #[test]
    fn fetch_all_attributes_suppressed_only_when_every_subscriber_opts_out() {
        let agg = AggregatedItemScope::new();
        let mut opt_out = ItemFetchScope::default();
        opt_out.all_attributes = false;
        agg.add_subscriber(&opt_out);
        assert!(!agg.derived().all_attributes);

        let default_scope = ItemFetchScope::default();
        agg.add_subscriber(&default_scope);
        assert!(agg.derived().all_attributes);
    }

    #[test]
    fn collection_fetch_id_only_requires_all_subscribers() {
        let agg = AggregatedCollectionScope::new();
        let mut id_only = CollectionFetchScope::default();
        id_only.fetch_id_only = true;
        agg.add_subscriber(&id_only);
        assert!(agg.derived().fetch_id_only);
        agg.add_subscriber(&CollectionFetchScope::default());
        assert!(!agg.derived().fetch_id_only);
    }

    fn scope_from(parts: &BTreeSet<u8>, ancestor_idx: u8, cache_only: bool, ignore_errors: bool, all_attributes: bool) -> ItemFetchScope {
        let mut scope = ItemFetchScope::default();
        scope.requested_parts = parts.iter().map(|b| vec![*b]).collect();
        scope.ancestor_depth = ancestor_from_index(ancestor_idx as usize);
        scope.cache_only = cache_only;
        scope.ignore_errors = ignore_errors;
        scope.all_attributes = all_attributes;
        scope
    }

    proptest! {
        /// §8 "For every sequence of notifications fed to an aggregated
        /// scope, the derived scope equals the field-wise union over current
        /// subscribers' scopes." Exercised here over arbitrary subscriber
        /// counts and field combinations rather than the two fixed
        /// subscribers scenario 1 hand-picks.
        #[test]
        fn derived_scope_equals_the_field_wise_union_of_subscribers(
            subs in prop::collection::vec(
                (prop::collection::btree_set(0u8..4, 0..3), 0u8..3, any::<bool>(), any::<bool>(), any::<bool>()),
                1..8,
            )
        ) {
            let agg = AggregatedItemScope::new();
            let mut expected_parts: BTreeSet<Vec<u8>> = BTreeSet::new();
            let mut max_ancestor = 0u8;
            let mut all_cache_only = true;
            let mut all_ignore_errors = true;
            let mut all_opted_out = true;

            for (parts, ancestor_idx, cache_only, ignore_errors, all_attributes) in &subs {
                let scope = scope_from(parts, *ancestor_idx, *cache_only, *ignore_errors, *all_attributes);
                expected_parts.extend(scope.requested_parts.iter().cloned());
                max_ancestor = max_ancestor.max(*ancestor_idx);
                all_cache_only &= *cache_only;
                all_ignore_errors &= *ignore_errors;
                all_opted_out &= !*all_attributes;
                agg.add_subscriber(&scope);
            }

            let derived = agg.derived();
            prop_assert_eq!(derived.requested_parts, expected_parts);
            prop_assert_eq!(derived.ancestor_depth, ancestor_from_index(max_ancestor as usize));
            prop_assert_eq!(derived.cache_only, all_cache_only);
            prop_assert_eq!(derived.ignore_errors, all_ignore_errors);
            prop_assert_eq!(derived.all_attributes, !all_opted_out);
        }
    }
}
