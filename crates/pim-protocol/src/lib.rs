//! Wire codec and command/response factory for the PIM broker session
//! protocol (§4.1, §6). This crate knows nothing about sessions, handlers or
//! storage: it only turns bytes into typed commands/responses and back.

pub mod buffer;
pub mod command;
pub mod error;
pub mod fetch_scope;
pub mod frame;
pub mod notification_codec;
pub mod response;
pub mod scope_wire;

pub use buffer::{Decoder, Encoder};
pub use command::{
    Command, CollectionChangeSet, CreateCollectionCommand, CreateItemCommand,
    CreateSubscriptionCommand, CreateTagCommand, DeleteCollectionCommand, DeleteItemCommand,
    DeleteSubscriptionCommand, DeleteTagCommand, FetchCollectionStatsCommand, FetchItemsCommand,
    FetchTagsCommand, LinkItemsCommand, LoginCommand, ModifyCollectionCommand, ModifyItemCommand,
    ModifySubscriptionCommand, ModifyTagCommand, MoveCollectionCommand, MoveItemCommand,
    SearchResultCommand, SelectCommand, SubscriberFilterWire, UnlinkItemsCommand,
};
pub use error::CodecError;
pub use fetch_scope::{CollectionFetchScope, ItemFetchScope, TagFetchScope};
pub use frame::{CommandKind, FrameHeader, NO_TAG, RESPONSE_BIT};
pub use notification_codec::{decode_debug_notification, decode_notification, encode_notification};
pub use response::{CollectionPayload, CollectionStatsPayload, ItemPayload, PartPayload, Response, TagPayload};
pub use scope_wire::{read_scope, write_scope};

/// Encode a complete command frame (header + payload) in one call.
pub fn encode_command_frame(tag: u8, command: &Command) -> Vec<u8> {
    let kind = command_kind(command);
    let mut enc = Encoder::new();
    FrameHeader::command(tag, kind).encode(&mut enc);
    command.encode(&mut enc);
    enc.into_bytes()
}

/// Encode a complete response frame (header + payload) in one call.
pub fn encode_response_frame(tag: u8, kind: CommandKind, response: &Response) -> Vec<u8> {
    let mut enc = Encoder::new();
    FrameHeader::response(tag, kind).encode(&mut enc);
    response.encode(&mut enc);
    enc.into_bytes()
}

/// Maps a [`Command`] variant back to the [`CommandKind`] discriminant used
/// on the wire (§4.1 factory: "maps a type byte to a zero-argument
/// constructor"; this is the inverse direction, variant to type byte).
pub fn command_kind(command: &Command) -> CommandKind {
    match command {
        Command::Login(_) => CommandKind::Login,
        Command::Logout => CommandKind::Logout,
        Command::Capability => CommandKind::Capability,
        Command::Select(_) => CommandKind::Select,
        Command::FetchItems(_) => CommandKind::FetchItems,
        Command::FetchTags(_) => CommandKind::FetchTags,
        Command::FetchCollectionStats(_) => CommandKind::FetchCollectionStats,
        Command::CreateItem(_) => CommandKind::CreateItem,
        Command::ModifyItem(_) => CommandKind::ModifyItem,
        Command::DeleteItem(_) => CommandKind::DeleteItem,
        Command::MoveItem(_) => CommandKind::MoveItem,
        Command::LinkItems(_) => CommandKind::LinkItems,
        Command::UnlinkItems(_) => CommandKind::UnlinkItems,
        Command::CreateCollection(_) => CommandKind::CreateCollection,
        Command::ModifyCollection(_) => CommandKind::ModifyCollection,
        Command::DeleteCollection(_) => CommandKind::DeleteCollection,
        Command::MoveCollection(_) => CommandKind::MoveCollection,
        Command::CreateTag(_) => CommandKind::CreateTag,
        Command::ModifyTag(_) => CommandKind::ModifyTag,
        Command::DeleteTag(_) => CommandKind::DeleteTag,
        Command::CreateSubscription(_) => CommandKind::CreateSubscription,
        Command::ModifySubscription(_) => CommandKind::ModifySubscription,
        Command::DeleteSubscription(_) => CommandKind::DeleteSubscription,
        Command::SearchResult(_) => CommandKind::SearchResult,
        Command::Invalid => CommandKind::Invalid,
    }
}

/// Maps a [`pim_model::EntityKind`] to the notification [`CommandKind`] that
/// carries it on the wire, and back. Kept alongside `command_kind` because
/// notifications share the same type-byte space as commands (§4.1).
pub fn write_entity_kind(enc: &mut Encoder, kind: pim_model::EntityKind) {
    enc.write_u8(match kind {
        pim_model::EntityKind::Item => CommandKind::ItemChangeNotification as u8,
        pim_model::EntityKind::Collection => CommandKind::CollectionChangeNotification as u8,
        pim_model::EntityKind::Tag => CommandKind::TagChangeNotification as u8,
        pim_model::EntityKind::Relation => CommandKind::RelationChangeNotification as u8,
        pim_model::EntityKind::Subscription => CommandKind::SubscriptionChangeNotification as u8,
    });
}

pub fn entity_kind_for_command_kind(kind: CommandKind) -> Option<pim_model::EntityKind> {
    match kind {
        CommandKind::ItemChangeNotification => Some(pim_model::EntityKind::Item),
        CommandKind::CollectionChangeNotification => Some(pim_model::EntityKind::Collection),
        CommandKind::TagChangeNotification => Some(pim_model::EntityKind::Tag),
        CommandKind::RelationChangeNotification => Some(pim_model::EntityKind::Relation),
        CommandKind::SubscriptionChangeNotification => Some(pim_model::EntityKind::Subscription),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_round_trips_through_header_and_body() {
        let cmd = Command::Logout;
        let bytes = encode_command_frame(5, &cmd);
        let mut dec = Decoder::new(&bytes);
        let header = FrameHeader::decode(&mut dec).unwrap();
        assert_eq!(header.tag, 5);
        assert!(!header.is_response);
        assert_eq!(Command::decode(header.kind, &mut dec).unwrap(), cmd);
    }

    #[test]
    fn entity_kind_round_trips_through_command_kind() {
        for kind in [
            pim_model::EntityKind::Item,
            pim_model::EntityKind::Collection,
            pim_model::EntityKind::Tag,
            pim_model::EntityKind::Relation,
            pim_model::EntityKind::Subscription,
        ] {
            let mut enc = Encoder::new();
            write_entity_kind(&mut enc, kind);
            let bytes = enc.into_bytes();
            let byte = bytes[0];
            let command_kind = CommandKind::from_u8(byte);
            assert_eq!(entity_kind_for_command_kind(command_kind), Some(kind));
        }
    }
}
