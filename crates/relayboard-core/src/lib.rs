//! # RelayBoard Core Library
//!
//! Client-side driver for serial relay output and input sense boards.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - 8-byte frame encoding/decoding with checksum verification
//! - Reply timing derived from the line's baud rate
//! - Confirmed and silent (fire-and-forget) channel, group and pulse commands
//! - A channel state cache that tracks predicted states for silent commands
//!
//! ## Example
//!
//! ```rust,ignore
//! use relayboard_core::prelude::*;
//!
//! let link = SerialPortLink::connect(SerialSettings::new("/dev/ttyUSB0"))?;
//! let client = RelayClient::new(link, ClientConfig::new(1, 8));
//!
//! client.on_one(1)?;
//! client.on_point_nil(3, 1000)?;
//! println!("{:?}", client.status()?);
//! ```

pub mod channels;
pub mod client;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channels::{group_mask, ChannelSet, ChannelStateCache};
    pub use crate::client::{ClientConfig, RelayClient};
    pub use crate::protocol::{
        FrameCodec, FunctionCode, RelayError, SerialLink, SerialPortLink, SerialSettings,
        TimedTransport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
