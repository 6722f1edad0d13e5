use thiserror::Error;

use std::io;

/// Enumeration that represents the various errors that may occur while
/// trying to serialize an AMT message.
#[derive(Debug, Error)]
pub enum MessageSerializationError {
    /// Failed to write the values to the output buffer
    #[error("An IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}
