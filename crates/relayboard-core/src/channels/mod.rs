//! Channel states
//!
//! A board exposes up to 32 binary channels. On the wire they travel as a
//! 4-byte big-endian word where bit 0 of the last byte is channel 1.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::protocol::{RelayError, Result, PAYLOAD_SIZE};

mod cache;

pub use cache::ChannelStateCache;

/// Channel count used when none is configured
pub const DEFAULT_BRANCHES: u8 = 8;

/// Most channels a board can address
pub const MAX_BRANCHES: u8 = 32;

/// Ordered channel states, channel 1 first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ChannelSetFile")]
pub struct ChannelSet {
    states: Vec<bool>,
}

/// On-disk form of [`ChannelSet`], checked on the way in
#[derive(Deserialize)]
struct ChannelSetFile {
    states: Vec<bool>,
}

impl TryFrom<ChannelSetFile> for ChannelSet {
    type Error = RelayError;

    fn try_from(file: ChannelSetFile) -> Result<Self> {
        Self::from_states(file.states)
    }
}

impl ChannelSet {
    /// `len` channels, all off
    pub fn new(len: u8) -> Self {
        Self::filled(len, false)
    }

    /// `len` channels, all set to `value`
    pub fn filled(len: u8, value: bool) -> Self {
        Self {
            states: vec![value; len.min(MAX_BRANCHES) as usize],
        }
    }

    /// Build from explicit states, channel 1 first
    pub fn from_states(states: Vec<bool>) -> Result<Self> {
        if states.len() > MAX_BRANCHES as usize {
            return Err(RelayError::TooManyChannels {
                length: states.len(),
                max: MAX_BRANCHES,
            });
        }
        Ok(Self { states })
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True if the set holds no channels
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State at a 0-based index
    pub fn get(&self, index: usize) -> Option<bool> {
        self.states.get(index).copied()
    }

    /// Set the state at a 0-based index, returning false if out of range
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        match self.states.get_mut(index) {
            Some(state) => {
                *state = value;
                true
            }
            None => false,
        }
    }

    /// States in channel order
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.states.iter().copied()
    }

    /// Borrow the states, channel 1 first
    pub fn as_slice(&self) -> &[bool] {
        &self.states
    }

    /// 0-based indices of channels that are on
    pub fn active(&self) -> Vec<u8> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i as u8)
            .collect()
    }

    /// Status word with bit `i` holding channel `i + 1`
    pub fn to_word(&self) -> u32 {
        self.states
            .iter()
            .take(MAX_BRANCHES as usize)
            .enumerate()
            .filter(|(_, on)| **on)
            .fold(0u32, |word, (i, _)| word | (1 << i))
    }

    /// Pack into the 4-byte wire representation
    pub fn pack(&self) -> [u8; PAYLOAD_SIZE] {
        let mut bytes = [0u8; PAYLOAD_SIZE];
        BigEndian::write_u32(&mut bytes, self.to_word());
        bytes
    }

    /// Unpack the first `len` channels of a status word
    pub fn from_word(word: u32, len: u8) -> Self {
        let len = len.min(MAX_BRANCHES);
        Self {
            states: (0..len).map(|i| word & (1 << i) != 0).collect(),
        }
    }

    /// Unpack the first `len` channels of a 4-byte wire payload
    pub fn unpack(bytes: &[u8], len: u8) -> Result<Self> {
        if bytes.len() != PAYLOAD_SIZE {
            return Err(RelayError::MalformedResponse(format!(
                "status payload is {} bytes, expected {}",
                bytes.len(),
                PAYLOAD_SIZE
            )));
        }
        Ok(Self::from_word(BigEndian::read_u32(bytes), len))
    }
}

/// Read the state of 0-based `index` out of a 4-byte status payload
pub fn bit_at(bytes: &[u8; PAYLOAD_SIZE], index: u8) -> bool {
    BigEndian::read_u32(bytes) & (1 << index) != 0
}

/// Pack 0-based channel indices into a group bitmask.
///
/// Channels left out are untouched by the board; a set bit means "act on this channel".
pub fn group_mask(indices: &[u8], branch_count: u8) -> Result<[u8; PAYLOAD_SIZE]> {
    let mut word = 0u32;
    for &index in indices {
        if index >= branch_count.min(MAX_BRANCHES) {
            return Err(RelayError::ChannelOutOfRange {
                channel: index as u32,
                max: branch_count,
            });
        }
        word |= 1 << index;
    }
    let mut bytes = [0u8; PAYLOAD_SIZE];
    BigEndian::write_u32(&mut bytes, word);
    Ok(bytes)
}
