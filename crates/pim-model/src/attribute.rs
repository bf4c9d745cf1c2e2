use std::collections::BTreeMap;

/// An opaque key/value pair attached to a Collection, Tag, or Item. The
/// server never interprets the bytes; it only stores, fetches and diffs
/// them by key.
pub type AttributeName = Vec<u8>;
pub type AttributeValue = Vec<u8>;

/// A set of typed attributes, keyed by name. `BTreeMap` gives deterministic
/// iteration order, which matters for notification `changed-parts` diffing
/// and for test assertions.
pub type AttributeMap = BTreeMap<AttributeName, AttributeValue>;

/// Computes which attribute names differ in value (or presence) between two
/// snapshots. Used by handlers to populate a notification's changed-parts.
pub fn changed_attribute_names(before: &AttributeMap, after: &AttributeMap) -> Vec<AttributeName> {
    let mut changed = Vec::new();
    for (k, v) in after {
        match before.get(k) {
            Some(old) if old == v => {}
            _ => changed.push(k.clone()),
        }
    }
    for k in before.keys() {
        if !after.contains_key(k) {
            changed.push(k.clone());
        }
    }
    changed.sort();
    changed.dedup();
    changed
}
