//! Per-kind fetch scope payloads exchanged on the wire as part of
//! `FetchItems`/`FetchTags` commands and `CreateSubscription`/
//! `ModifySubscription` payloads. These are the "old"/"new" scope values fed
//! into the aggregated fetch scopes (C3, spec §4.3).

use crate::buffer::{Decoder, Encoder};
use crate::error::CodecError;
use pim_model::AncestorDepth;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFetchScope {
    pub requested_parts: BTreeSet<Vec<u8>>,
    pub ancestor_depth: AncestorDepth,
    pub cache_only: bool,
    pub full_payload: bool,
    pub all_attributes: bool,
    pub fetch_size: bool,
    pub fetch_mtime: bool,
    pub fetch_remote_revision: bool,
    pub ignore_errors: bool,
    pub fetch_flags: bool,
    pub fetch_remote_id: bool,
    pub fetch_gid: bool,
    pub fetch_tags: bool,
    pub fetch_relations: bool,
    pub fetch_virtual_references: bool,
}

impl Default for ItemFetchScope {
    fn default() -> Self {
        Self {
            requested_parts: BTreeSet::new(),
            ancestor_depth: AncestorDepth::None,
            cache_only: false,
            full_payload: false,
            all_attributes: false,
            fetch_size: true,
            fetch_mtime: true,
            fetch_remote_revision: false,
            ignore_errors: false,
            fetch_flags: true,
            fetch_remote_id: true,
            fetch_gid: true,
            fetch_tags: false,
            fetch_relations: false,
            fetch_virtual_references: false,
        }
    }
}

impl ItemFetchScope {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.write_list(
            &self.requested_parts.iter().cloned().collect::<Vec<_>>(),
            |e, p| e.write_bytes(p),
        );
        enc.write_u8(self.ancestor_depth as u8);
        enc.write_bool(self.cache_only);
        enc.write_bool(self.full_payload);
        enc.write_bool(self.all_attributes);
        enc.write_bool(self.fetch_size);
        enc.write_bool(self.fetch_mtime);
        enc.write_bool(self.fetch_remote_revision);
        enc.write_bool(self.ignore_errors);
        enc.write_bool(self.fetch_flags);
        enc.write_bool(self.fetch_remote_id);
        enc.write_bool(self.fetch_gid);
        enc.write_bool(self.fetch_tags);
        enc.write_bool(self.fetch_relations);
        enc.write_bool(self.fetch_virtual_references);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let requested_parts = dec.read_list(|d| d.read_bytes())?.into_iter().collect();
        let ancestor_depth = match dec.read_u8()? {
            0 => AncestorDepth::None,
            1 => AncestorDepth::Parent,
            2 => AncestorDepth::All,
            other => {
                return Err(CodecError::UnknownDiscriminant {
                    context: "AncestorDepth",
                    discriminant: other as u32,
                })
            }
        };
        Ok(Self {
            requested_parts,
            ancestor_depth,
            cache_only: dec.read_bool()?,
            full_payload: dec.read_bool()?,
            all_attributes: dec.read_bool()?,
            fetch_size: dec.read_bool()?,
            fetch_mtime: dec.read_bool()?,
            fetch_remote_revision: dec.read_bool()?,
            ignore_errors: dec.read_bool()?,
            fetch_flags: dec.read_bool()?,
            fetch_remote_id: dec.read_bool()?,
            fetch_gid: dec.read_bool()?,
            fetch_tags: dec.read_bool()?,
            fetch_relations: dec.read_bool()?,
            fetch_virtual_references: dec.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFetchScope {
    pub include_statistics: bool,
    pub fetch_id_only: bool,
    pub attributes: BTreeSet<Vec<u8>>,
}

impl Default for CollectionFetchScope {
    fn default() -> Self {
        Self {
            include_statistics: false,
            fetch_id_only: false,
            attributes: BTreeSet::new(),
        }
    }
}

impl CollectionFetchScope {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.write_bool(self.include_statistics);
        enc.write_bool(self.fetch_id_only);
        enc.write_list(&self.attributes.iter().cloned().collect::<Vec<_>>(), |e, a| {
            e.write_bytes(a)
        });
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            include_statistics: dec.read_bool()?,
            fetch_id_only: dec.read_bool()?,
            attributes: dec.read_list(|d| d.read_bytes())?.into_iter().collect(),
        })
    }
}

/// §4.7 fetch-tags: `fetchAllAttributes` and an explicit attribute allow
/// list combine additively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFetchScope {
    pub fetch_id_only: bool,
    pub fetch_remote_id: bool,
    pub fetch_all_attributes: bool,
    pub attributes: BTreeSet<Vec<u8>>,
}

impl Default for TagFetchScope {
    fn default() -> Self {
        Self {
            fetch_id_only: false,
            fetch_remote_id: false,
            fetch_all_attributes: true,
            attributes: BTreeSet::new(),
        }
    }
}

impl TagFetchScope {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.write_bool(self.fetch_id_only);
        enc.write_bool(self.fetch_remote_id);
        enc.write_bool(self.fetch_all_attributes);
        enc.write_list(&self.attributes.iter().cloned().collect::<Vec<_>>(), |e, a| {
            e.write_bytes(a)
        });
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            fetch_id_only: dec.read_bool()?,
            fetch_remote_id: dec.read_bool()?,
            fetch_all_attributes: dec.read_bool()?,
            attributes: dec.read_list(|d| d.read_bytes())?.into_iter().collect(),
        })
    }
}
