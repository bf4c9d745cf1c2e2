//! Frame header layout: `<tag:u8><type:u8><payload>` (§6). The high bit of
//! `type` distinguishes a response from the command it answers; the
//! remaining seven bits select the `CommandKind`. A `tag` of `0` is reserved
//! for server-initiated frames that correlate with no prior request (the
//! unsolicited `Hello`, and notifications).

use crate::error::CodecError;
use crate::buffer::{Decoder, Encoder};

pub const RESPONSE_BIT: u8 = 0x80;
pub const NO_TAG: u8 = 0;

/// Every command and response variant the protocol knows about, plus the
/// notification kinds (§3 Notification variants map 1:1 onto the `*Change`
/// members here). Notifications are commands that never carry a response
/// tag (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Invalid = 0,
    Hello = 1,
    Login = 2,
    Logout = 3,
    Capability = 4,
    Select = 5,
    FetchItems = 6,
    FetchTags = 7,
    FetchCollectionStats = 8,
    CreateItem = 9,
    ModifyItem = 10,
    DeleteItem = 11,
    MoveItem = 12,
    LinkItems = 13,
    UnlinkItems = 14,
    CreateCollection = 15,
    ModifyCollection = 16,
    DeleteCollection = 17,
    MoveCollection = 18,
    CreateTag = 19,
    ModifyTag = 20,
    DeleteTag = 21,
    CreateSubscription = 22,
    ModifySubscription = 23,
    DeleteSubscription = 24,
    SearchResult = 25,
    ItemChangeNotification = 26,
    CollectionChangeNotification = 27,
    TagChangeNotification = 28,
    RelationChangeNotification = 29,
    SubscriptionChangeNotification = 30,
    DebugChangeNotification = 31,
}

impl CommandKind {
    pub const MAX_DISCRIMINANT: u8 = 31;

    /// Never fails: an out-of-range byte maps to [`CommandKind::Invalid`]
    /// rather than an error, so a session can still reply with a tagged
    /// failure response (§4.1 contract).
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CommandKind::Hello,
            2 => CommandKind::Login,
            3 => CommandKind::Logout,
            4 => CommandKind::Capability,
            5 => CommandKind::Select,
            6 => CommandKind::FetchItems,
            7 => CommandKind::FetchTags,
            8 => CommandKind::FetchCollectionStats,
            9 => CommandKind::CreateItem,
            10 => CommandKind::ModifyItem,
            11 => CommandKind::DeleteItem,
            12 => CommandKind::MoveItem,
            13 => CommandKind::LinkItems,
            14 => CommandKind::UnlinkItems,
            15 => CommandKind::CreateCollection,
            16 => CommandKind::ModifyCollection,
            17 => CommandKind::DeleteCollection,
            18 => CommandKind::MoveCollection,
            19 => CommandKind::CreateTag,
            20 => CommandKind::ModifyTag,
            21 => CommandKind::DeleteTag,
            22 => CommandKind::CreateSubscription,
            23 => CommandKind::ModifySubscription,
            24 => CommandKind::DeleteSubscription,
            25 => CommandKind::SearchResult,
            26 => CommandKind::ItemChangeNotification,
            27 => CommandKind::CollectionChangeNotification,
            28 => CommandKind::TagChangeNotification,
            29 => CommandKind::RelationChangeNotification,
            30 => CommandKind::SubscriptionChangeNotification,
            31 => CommandKind::DebugChangeNotification,
            _ => CommandKind::Invalid,
        }
    }

    pub fn is_notification(self) -> bool {
        matches!(
            self,
            CommandKind::ItemChangeNotification
                | CommandKind::CollectionChangeNotification
                | CommandKind::TagChangeNotification
                | CommandKind::RelationChangeNotification
                | CommandKind::SubscriptionChangeNotification
                | CommandKind::DebugChangeNotification
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: u8,
    pub kind: CommandKind,
    pub is_response: bool,
}

impl FrameHeader {
    pub fn command(tag: u8, kind: CommandKind) -> Self {
        Self { tag, kind, is_response: false }
    }

    pub fn response(tag: u8, kind: CommandKind) -> Self {
        Self { tag, kind, is_response: true }
    }

    pub fn notification(kind: CommandKind) -> Self {
        debug_assert!(kind.is_notification());
        Self { tag: NO_TAG, kind, is_response: false }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.write_u8(self.tag);
        let type_byte = (self.kind as u8) | if self.is_response { RESPONSE_BIT } else { 0 };
        enc.write_u8(type_byte);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tag = dec.read_u8()?;
        let type_byte = dec.read_u8()?;
        let is_response = type_byte & RESPONSE_BIT != 0;
        let kind = CommandKind::from_u8(type_byte & !RESPONSE_BIT);
        Ok(Self { tag, kind, is_response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_bit_round_trips() {
        let mut enc = Encoder::new();
        FrameHeader::response(9, CommandKind::FetchItems).encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let header = FrameHeader::decode(&mut dec).unwrap();
        assert_eq!(header.tag, 9);
        assert!(header.is_response);
        assert_eq!(header.kind, CommandKind::FetchItems);
    }

    #[test]
    fn unknown_type_byte_decodes_as_invalid_not_error() {
        let mut enc = Encoder::new();
        enc.write_u8(3); // tag
        enc.write_u8(200); // unknown low 7 bits after masking
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let header = FrameHeader::decode(&mut dec).unwrap();
        assert_eq!(header.kind, CommandKind::Invalid);
    }

    #[test]
    fn notification_kinds_never_carry_response_tag() {
        assert!(CommandKind::ItemChangeNotification.is_notification());
        let header = FrameHeader::notification(CommandKind::ItemChangeNotification);
        assert_eq!(header.tag, NO_TAG);
        assert!(!header.is_response);
    }
}
