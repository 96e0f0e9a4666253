//! Frame encoding/decoding
//!
//! Every request and confirmed response is a fixed 8-byte frame:
//! - 1 byte: Header sentinel (0x55)
//! - 1 byte: Slave address
//! - 1 byte: Function code
//! - 4 bytes: Payload
//! - 1 byte: Checksum (sum of the first 7 bytes, truncated to 8 bits)

use tracing::trace;

use super::{RelayError, Result, FRAME_SIZE, HEADER, MIN_RESPONSE_SIZE, PAYLOAD_SIZE};

/// A decoded wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Always [`HEADER`] on a well-formed frame
    pub header: u8,
    /// Board address
    pub slave_id: u8,
    /// Raw function byte
    pub function: u8,
    /// Four data bytes
    pub payload: [u8; PAYLOAD_SIZE],
    /// Wrapping sum of the seven preceding bytes
    pub checksum: u8,
}

impl Frame {
    /// Build a frame and compute its checksum
    pub fn new(slave_id: u8, function: u8, payload: [u8; PAYLOAD_SIZE]) -> Self {
        let mut frame = Self {
            header: HEADER,
            slave_id,
            function,
            payload,
            checksum: 0,
        };
        frame.checksum = checksum(&frame.to_bytes());
        frame
    }

    /// Encode to raw bytes
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = self.header;
        bytes[1] = self.slave_id;
        bytes[2] = self.function;
        bytes[3..7].copy_from_slice(&self.payload);
        bytes[7] = self.checksum;
        bytes
    }

    /// Decode a frame from raw bytes, verifying the checksum
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_SIZE {
            return Err(RelayError::FrameTooShort { length: data.len() });
        }

        let expected = checksum(data);
        if data[7] != expected {
            return Err(RelayError::ChecksumMismatch {
                expected,
                actual: data[7],
            });
        }

        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&data[3..7]);

        Ok(Self {
            header: data[0],
            slave_id: data[1],
            function: data[2],
            payload,
            checksum: data[7],
        })
    }
}

/// Encodes requests for one slave and validates its replies
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    slave_id: u8,
}

impl FrameCodec {
    /// Codec addressing board `slave_id`
    pub fn new(slave_id: u8) -> Self {
        Self { slave_id }
    }

    /// Board address written into each frame
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// Encode a function code and payload into a wire frame.
    ///
    /// Payloads shorter than 4 bytes are zero-padded; anything that would
    /// push the frame past 8 bytes is rejected.
    pub fn encode(&self, function: impl Into<u8>, payload: &[u8]) -> Result<[u8; FRAME_SIZE]> {
        let length = payload.len() + 4;
        if length > FRAME_SIZE {
            return Err(RelayError::PayloadTooLarge {
                length,
                max: FRAME_SIZE,
            });
        }

        let mut data = [0u8; PAYLOAD_SIZE];
        data[..payload.len()].copy_from_slice(payload);

        let bytes = Frame::new(self.slave_id, function.into(), data).to_bytes();
        trace!("encoded frame {:02x?}", bytes);
        Ok(bytes)
    }

    /// Decode a frame into its function code and payload
    pub fn decode(&self, data: &[u8]) -> Result<(u8, [u8; PAYLOAD_SIZE])> {
        let frame = Frame::from_bytes(data)?;
        Ok((frame.function, frame.payload))
    }

    /// Check a reply against the request that produced it
    pub fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        verify_slave(request, response)
    }
}

/// Checksum over the first 7 bytes of a frame
pub fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .take(FRAME_SIZE - 1)
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Verify reply length and the leading address byte
pub fn verify_slave(request: &[u8], response: &[u8]) -> Result<()> {
    if response.len() < MIN_RESPONSE_SIZE {
        return Err(RelayError::ResponseTooShort {
            length: response.len(),
            min: MIN_RESPONSE_SIZE,
        });
    }
    let expected = request.first().copied().unwrap_or_default();
    if response[0] != expected {
        return Err(RelayError::SlaveIdMismatch {
            expected,
            actual: response[0],
        });
    }
    Ok(())
}
