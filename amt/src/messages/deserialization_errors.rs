use thiserror::Error;

use std::io;

/// Enumeration that represents the various errors that may occur while
/// trying to deserialize an AMT message.
///
/// Every variant is fatal to the current datagram only; AMT messages
/// arrive as complete UDP payloads, so the caller drops the datagram
/// and keeps receiving.
#[derive(Debug, Error)]
pub enum MessageDeserializationError {
    /// The bytes contained in the message were not what were expected,
    /// and thus the message could not be parsed
    #[error("The message was not encoded in an expected format")]
    InvalidMessageFormat,

    /// The message ended before its declared layout was complete
    #[error("The message was shorter than its format requires")]
    NotEnoughBytes,

    /// The leading type byte names a message this role never receives
    /// (or a type unknown to the protocol entirely)
    #[error("No parser is registered for message type {message_type}")]
    NoParserForType { message_type: u8 },

    /// Failed to read the values from the input buffer
    #[error("An IO error occurred while reading the input: {0}")]
    Io(#[from] io::Error),
}
