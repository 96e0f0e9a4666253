//! Serial Protocol Communication
//!
//! Implements the fixed 8-byte framed protocol spoken by relay output and
//! input sense boards, along with the timing rules for reading replies.

mod error;
pub mod frame;
pub mod function;
pub mod serial;
pub mod transport;

pub use error::{RelayError, Result};
pub use frame::{checksum, verify_slave, Frame, FrameCodec};
pub use function::{expected_length, FunctionCode, ResponsePlan};
pub use serial::{list_ports, open_port, Parity, PortInfo, SerialLink, SerialPortLink, SerialSettings};
pub use transport::{calculate_delay, TimedTransport, TrafficCounters};

/// Header sentinel opening every frame
pub const HEADER: u8 = 0x55;

/// Size of a request or confirmed response
pub const FRAME_SIZE: usize = 8;

/// Payload bytes carried by each frame
pub const PAYLOAD_SIZE: usize = 4;

/// Bytes read before deciding between an echo and an exception reply
pub const MIN_RESPONSE_SIZE: usize = 4;

/// Size of an exception reply
pub const EXCEPTION_SIZE: usize = 5;

/// Largest reply buffer the link allocates
pub const MAX_ADU_SIZE: usize = 256;

/// Bit set in the function byte of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Default baud rate for relay boards
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
