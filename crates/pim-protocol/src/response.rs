//! Response payloads (§4.1, §6): `Hello`, a stream of per-entity fetch
//! results terminated by a bare `Success`/`Failure`, and fixed-shape results
//! for the rest. A response frame's tag always matches the command frame
//! that caused it, except `Hello` which is unsolicited (§6).

use crate::buffer::{Decoder, Encoder};
use crate::error::CodecError;
use pim_model::ErrorCategory;

fn write_error_category(enc: &mut Encoder, cat: ErrorCategory) {
    enc.write_u8(match cat {
        ErrorCategory::Malformed => 0,
        ErrorCategory::Rejected => 1,
        ErrorCategory::NotFound => 2,
        ErrorCategory::PermissionDenied => 3,
        ErrorCategory::Conflict => 4,
        ErrorCategory::Transient => 5,
        ErrorCategory::Rolledback => 6,
        ErrorCategory::UserCanceled => 7,
        ErrorCategory::AlreadyDeleted => 8,
    });
}

fn read_error_category(dec: &mut Decoder<'_>) -> Result<ErrorCategory, CodecError> {
    Ok(match dec.read_u8()? {
        0 => ErrorCategory::Malformed,
        1 => ErrorCategory::Rejected,
        2 => ErrorCategory::NotFound,
        3 => ErrorCategory::PermissionDenied,
        4 => ErrorCategory::Conflict,
        5 => ErrorCategory::Transient,
        6 => ErrorCategory::Rolledback,
        7 => ErrorCategory::UserCanceled,
        8 => ErrorCategory::AlreadyDeleted,
        other => {
            return Err(CodecError::UnknownDiscriminant {
                context: "ErrorCategory",
                discriminant: other as u32,
            })
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPayload {
    pub id: i64,
    pub parent_collection: i64,
    pub resource: String,
    pub remote_id: String,
    pub remote_revision: Option<String>,
    pub mime_type: String,
    pub revision: u64,
    pub gid: Option<String>,
    pub size: u64,
    pub mtime_unix_ms: u64,
    pub flags: Vec<String>,
    pub tags: Vec<i64>,
    pub parts: Vec<PartPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPayload {
    pub name: String,
    pub version: u32,
    pub external: bool,
    pub data: Vec<u8>,
    pub exists: bool,
    pub datasize: u64,
}

impl PartPayload {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_str(&self.name);
        enc.write_u32(self.version);
        enc.write_bool(self.external);
        enc.write_bytes(&self.data);
        enc.write_bool(self.exists);
        enc.write_u64(self.datasize);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: dec.read_str()?,
            version: dec.read_u32()?,
            external: dec.read_bool()?,
            data: dec.read_bytes()?,
            exists: dec.read_bool()?,
            datasize: dec.read_u64()?,
        })
    }
}

impl ItemPayload {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i64(self.id);
        enc.write_i64(self.parent_collection);
        enc.write_str(&self.resource);
        enc.write_str(&self.remote_id);
        enc.write_option(&self.remote_revision, |e, v| e.write_str(v));
        enc.write_str(&self.mime_type);
        enc.write_u64(self.revision);
        enc.write_option(&self.gid, |e, v| e.write_str(v));
        enc.write_u64(self.size);
        enc.write_u64(self.mtime_unix_ms);
        enc.write_list(&self.flags, |e, f| e.write_str(f));
        enc.write_list(&self.tags, |e, t| e.write_i64(*t));
        enc.write_list(&self.parts, |e, p| p.encode(e));
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: dec.read_i64()?,
            parent_collection: dec.read_i64()?,
            resource: dec.read_str()?,
            remote_id: dec.read_str()?,
            remote_revision: dec.read_option(|d| d.read_str())?,
            mime_type: dec.read_str()?,
            revision: dec.read_u64()?,
            gid: dec.read_option(|d| d.read_str())?,
            size: dec.read_u64()?,
            mtime_unix_ms: dec.read_u64()?,
            flags: dec.read_list(|d| d.read_str())?,
            tags: dec.read_list(|d| d.read_i64())?,
            parts: dec.read_list(PartPayload::decode)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatsPayload {
    pub count: u64,
    pub unseen: u64,
    pub size: u64,
}

impl CollectionStatsPayload {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u64(self.count);
        enc.write_u64(self.unseen);
        enc.write_u64(self.size);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            count: dec.read_u64()?,
            unseen: dec.read_u64()?,
            size: dec.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPayload {
    pub id: i64,
    pub parent_id: i64,
    pub resource: String,
    pub name: String,
    pub remote_id: String,
    pub content_mime_types: Vec<String>,
    pub virtual_: bool,
    pub enabled: bool,
    pub attributes: Vec<(Vec<u8>, Vec<u8>)>,
    pub statistics: Option<CollectionStatsPayload>,
}

impl CollectionPayload {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i64(self.id);
        enc.write_i64(self.parent_id);
        enc.write_str(&self.resource);
        enc.write_str(&self.name);
        enc.write_str(&self.remote_id);
        enc.write_list(&self.content_mime_types, |e, m| e.write_str(m));
        enc.write_bool(self.virtual_);
        enc.write_bool(self.enabled);
        enc.write_list(&self.attributes, |e, (k, v)| {
            e.write_bytes(k);
            e.write_bytes(v);
        });
        enc.write_option(&self.statistics, |e, s| s.encode(e));
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: dec.read_i64()?,
            parent_id: dec.read_i64()?,
            resource: dec.read_str()?,
            name: dec.read_str()?,
            remote_id: dec.read_str()?,
            content_mime_types: dec.read_list(|d| d.read_str())?,
            virtual_: dec.read_bool()?,
            enabled: dec.read_bool()?,
            attributes: dec.read_list(|d| Ok((d.read_bytes()?, d.read_bytes()?)))?,
            statistics: dec.read_option(CollectionStatsPayload::decode)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPayload {
    pub id: i64,
    pub gid: String,
    pub parent: Option<i64>,
    pub tag_type: String,
    pub remote_id: Option<String>,
    pub attributes: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TagPayload {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i64(self.id);
        enc.write_str(&self.gid);
        enc.write_option(&self.parent, |e, p| e.write_i64(*p));
        enc.write_str(&self.tag_type);
        enc.write_option(&self.remote_id, |e, r| e.write_str(r));
        enc.write_list(&self.attributes, |e, (k, v)| {
            e.write_bytes(k);
            e.write_bytes(v);
        });
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: dec.read_i64()?,
            gid: dec.read_str()?,
            parent: dec.read_option(|d| d.read_i64())?,
            tag_type: dec.read_str()?,
            remote_id: dec.read_option(|d| d.read_str())?,
            attributes: dec.read_list(|d| Ok((d.read_bytes()?, d.read_bytes()?)))?,
        })
    }
}

/// The closed set of server responses (§4.1, §6).
///
/// `FetchItems`/`FetchTags`/`FetchCollections` never appear as a single
/// `Response` value on the wire: each matching entity is framed as its own
/// tagged response (reusing the originating command's tag) and the stream is
/// terminated by a `Success`/`Failure` (§6 "fetch responses").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Hello { server_version: u32 },
    Success,
    Failure { message: String, category: ErrorCategory },
    Item(ItemPayload),
    Collection(CollectionPayload),
    Tag(TagPayload),
    CollectionStats(CollectionStatsPayload),
    Capability { supports_tristate_prefs: bool, protocol_revision: u32 },
}

impl Response {
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Response::Hello { server_version } => enc.write_u32(*server_version),
            Response::Success => {}
            Response::Failure { message, category } => {
                enc.write_str(message);
                write_error_category(enc, *category);
            }
            Response::Item(p) => p.encode(enc),
            Response::Collection(p) => p.encode(enc),
            Response::Tag(p) => p.encode(enc),
            Response::CollectionStats(p) => p.encode(enc),
            Response::Capability { supports_tristate_prefs, protocol_revision } => {
                enc.write_bool(*supports_tristate_prefs);
                enc.write_u32(*protocol_revision);
            }
        }
    }

    pub fn decode(kind: super::frame::CommandKind, dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        use super::frame::CommandKind as K;
        Ok(match kind {
            K::Hello => Response::Hello { server_version: dec.read_u32()? },
            K::Capability => Response::Capability {
                supports_tristate_prefs: dec.read_bool()?,
                protocol_revision: dec.read_u32()?,
            },
            K::FetchCollectionStats => Response::CollectionStats(CollectionStatsPayload::decode(dec)?),
            _ => Response::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CommandKind;

    #[test]
    fn failure_carries_category() {
        let resp = Response::Failure {
            message: "no such item".into(),
            category: ErrorCategory::NotFound,
        };
        let mut enc = Encoder::new();
        resp.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_str().unwrap(), "no such item");
        assert_eq!(read_error_category(&mut dec).unwrap(), ErrorCategory::NotFound);
    }

    #[test]
    fn item_payload_round_trips() {
        let payload = ItemPayload {
            id: 1,
            parent_collection: 2,
            resource: "res0".into(),
            remote_id: "rid".into(),
            remote_revision: None,
            mime_type: "message/rfc822".into(),
            revision: 3,
            gid: Some("g1".into()),
            size: 128,
            mtime_unix_ms: 1000,
            flags: vec!["\\Seen".into()],
            tags: vec![9],
            parts: vec![PartPayload {
                name: "PLD:RFC822".into(),
                version: 1,
                external: false,
                data: b"hi".to_vec(),
                exists: true,
                datasize: 2,
            }],
        };
        let mut enc = Encoder::new();
        payload.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(ItemPayload::decode(&mut dec).unwrap(), payload);
    }

    #[test]
    fn hello_round_trips() {
        let resp = Response::Hello { server_version: 42 };
        let mut enc = Encoder::new();
        resp.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Response::decode(CommandKind::Hello, &mut dec).unwrap(), resp);
    }
}
