//! Wire encoding for [`pim_model::Scope`] (§6). A discriminant byte selects
//! the variant, followed by its payload list.

use crate::buffer::{Decoder, Encoder};
use crate::error::CodecError;
use pim_model::{Gid, RemoteId, Scope};

const EMPTY: u8 = 0;
const UID: u8 = 1;
const REMOTE_ID: u8 = 2;
const GID: u8 = 3;
const HIERARCHICAL_RID: u8 = 4;

pub fn write_scope(enc: &mut Encoder, scope: &Scope) {
    match scope {
        Scope::Empty => enc.write_u8(EMPTY),
        Scope::Uid(ids) => {
            enc.write_u8(UID);
            enc.write_list(ids, |e, v| e.write_i64(*v));
        }
        Scope::RemoteId(rids) => {
            enc.write_u8(REMOTE_ID);
            enc.write_list(rids, |e, v| e.write_str(&v.0));
        }
        Scope::Gid(gids) => {
            enc.write_u8(GID);
            enc.write_list(gids, |e, v| e.write_str(&v.0));
        }
        Scope::HierarchicalRid(rids) => {
            enc.write_u8(HIERARCHICAL_RID);
            enc.write_list(rids, |e, v| e.write_str(&v.0));
        }
    }
}

pub fn read_scope(dec: &mut Decoder<'_>) -> Result<Scope, CodecError> {
    Ok(match dec.read_u8()? {
        EMPTY => Scope::Empty,
        UID => Scope::Uid(dec.read_list(|d| d.read_i64())?),
        REMOTE_ID => Scope::RemoteId(dec.read_list(|d| d.read_str().map(RemoteId))?),
        GID => Scope::Gid(dec.read_list(|d| d.read_str().map(Gid))?),
        HIERARCHICAL_RID => Scope::HierarchicalRid(dec.read_list(|d| d.read_str().map(RemoteId))?),
        other => {
            return Err(CodecError::UnknownDiscriminant {
                context: "Scope",
                discriminant: other as u32,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_scope_round_trips() {
        let scope = Scope::Uid(vec![1, 2, 3]);
        let mut enc = Encoder::new();
        write_scope(&mut enc, &scope);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(read_scope(&mut dec).unwrap(), scope);
    }

    #[test]
    fn hierarchical_rid_round_trips() {
        let scope = Scope::HierarchicalRid(vec![RemoteId("a".into()), RemoteId("b".into())]);
        let mut enc = Encoder::new();
        write_scope(&mut enc, &scope);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(read_scope(&mut dec).unwrap(), scope);
    }
}
