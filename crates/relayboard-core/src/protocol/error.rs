//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a relay board
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Channel {channel} out of range (board has {max} channels)")]
    ChannelOutOfRange { channel: u32, max: u8 },

    #[error("{length} channel states given, a board has at most {max}")]
    TooManyChannels { length: usize, max: u8 },

    #[error("Frame length {length} exceeds maximum {max}")]
    PayloadTooLarge { length: usize, max: usize },

    #[error("Pulse duration {ms}ms exceeds maximum {max}ms")]
    DurationTooLong { ms: u32, max: u32 },

    #[error("Frame too short: {length} bytes")]
    FrameTooShort { length: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Response slave id {actual:#04x} does not match request {expected:#04x}")]
    SlaveIdMismatch { expected: u8, actual: u8 },

    #[error("Response length {length} does not meet minimum {min}")]
    ResponseTooShort { length: usize, min: usize },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Channel {channel} reported {actual} after command, expected {expected}")]
    UnexpectedConfirmation {
        channel: u8,
        expected: bool,
        actual: bool,
    },

    #[error("Board rejected function {function:#04x}")]
    SlaveException { function: u8, response: Vec<u8> },

    #[error("Unexpected function {actual:#04x} in response to {expected:#04x}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Read timed out")]
    Timeout,

    #[error("Not connected to board")]
    NotConnected,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("I/O error: {0}")]
    TransportIo(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Map an I/O error from the serial link, folding read timeouts into [`RelayError::Timeout`]
    pub(crate) fn from_link(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => RelayError::Timeout,
            std::io::ErrorKind::NotConnected => RelayError::NotConnected,
            _ => RelayError::TransportIo(err),
        }
    }
}
