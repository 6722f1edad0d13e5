use std::io;
use thiserror::Error;

/// Error raised when a bit-field accessor is constructed or used with
/// values that do not fit its container word.
#[derive(Debug, Error, PartialEq)]
pub enum BitFieldError {
    /// The requested bit range does not fit within the containing word
    #[error("bit-field of width {width} at offset {offset} does not fit in a {container_bits}-bit container")]
    OutOfRange {
        offset: u32,
        width: u32,
        container_bits: u32,
    },

    /// The value passed to a setter has bits above the field width
    #[error("value {value:#x} does not fit in a {width}-bit field")]
    ValueTooLarge { value: u32, width: u32 },
}

/// Represents the various errors that may occur while trying to parse a
/// packet or protocol message from raw bytes.
///
/// A parse failure is fatal to the datagram being parsed, never to the
/// receiving endpoint; callers drop the datagram and continue.
#[derive(Debug, Error)]
pub enum PacketDeserializationError {
    /// The buffer ended before the declared message length was reached
    #[error("the buffer does not contain enough bytes for the message being parsed")]
    NotEnoughBytes,

    /// The leading version or type field did not match any known format
    #[error("unknown packet type or version: {value:#x}")]
    UnknownFormat { value: u8 },

    /// A length field disagrees with the number of bytes actually present
    #[error("the declared length {declared} is inconsistent with the {actual} bytes available")]
    LengthMismatch { declared: usize, actual: usize },

    /// The checksum field did not match the computed checksum
    #[error("checksum verification failed")]
    InvalidChecksum,

    /// Failed to read the values from the input buffer
    #[error("an IO error occurred while reading the input: {0}")]
    Io(#[from] io::Error),
}

/// Represents the various errors that may occur while serializing a
/// packet or protocol message into raw bytes.
#[derive(Debug, Error)]
pub enum PacketSerializationError {
    /// More sources or records were supplied than the 16-bit count field can hold
    #[error("too many entries for a 16-bit count field: {count}")]
    TooManyEntries { count: usize },

    /// The payload is too large for the envelope's length field
    #[error("payload of {length} bytes exceeds the maximum the length field can describe")]
    PayloadTooLarge { length: usize },

    /// Failed to write the values to the output buffer
    #[error("an IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}
