use thiserror::Error;

/// Decoding/encoding failures for the frame codec (§7 `Malformed`).
///
/// Encoding a well-formed [`crate::command::Command`]/[`crate::response::Response`]
/// never fails (§4.1 contract); only [`CodecError::decode`] paths are
/// reachable from untrusted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame truncated: needed {needed} more byte(s), had {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unknown enum discriminant {discriminant} in {context}")]
    UnknownDiscriminant { context: &'static str, discriminant: u32 },
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("frame payload exceeds configured maximum of {max} bytes")]
    PayloadTooLarge { max: usize },
}
