//! Relay client
//!
//! Channel, group, pulse and run operations on top of the frame codec, the
//! timed transport and the channel state cache.
//!
//! Confirmed operations read the board's echo before returning. Silent
//! (`*_nil`) operations only write; the cache is updated with the state the
//! command should produce, and pulse operations arm a timer that puts the
//! channel back once the board's window has closed.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::channels::{
    bit_at, group_mask, ChannelSet, ChannelStateCache, DEFAULT_BRANCHES, MAX_BRANCHES,
};
use crate::protocol::{
    FrameCodec, FunctionCode, RelayError, Result, SerialLink, TimedTransport, TrafficCounters,
    DEFAULT_BAUD_RATE, PAYLOAD_SIZE,
};

/// Longest pulse the 24-bit duration field can carry
pub const MAX_PULSE_MS: u32 = 0x00FF_FFFF;

/// Default head start given to cache reverts ahead of the board's own revert
pub const DEFAULT_PULSE_GUARD_MS: u64 = 10;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ClientConfigFile")]
pub struct ClientConfig {
    slave_id: u8,
    branch_count: u8,
    baud_rate: u32,
    pulse_guard_ms: u64,
}

/// On-disk form of [`ClientConfig`], before clamping
#[derive(Deserialize)]
#[serde(default)]
struct ClientConfigFile {
    slave_id: u8,
    branch_count: u8,
    baud_rate: u32,
    pulse_guard_ms: u64,
}

impl Default for ClientConfigFile {
    fn default() -> Self {
        Self {
            slave_id: 1,
            branch_count: DEFAULT_BRANCHES,
            baud_rate: DEFAULT_BAUD_RATE,
            pulse_guard_ms: DEFAULT_PULSE_GUARD_MS,
        }
    }
}

impl From<ClientConfigFile> for ClientConfig {
    fn from(file: ClientConfigFile) -> Self {
        ClientConfig::new(file.slave_id, file.branch_count)
            .with_baud_rate(file.baud_rate)
            .with_pulse_guard(Duration::from_millis(file.pulse_guard_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigFile::default().into()
    }
}

impl ClientConfig {
    /// Configuration for `slave_id`, with `branch_count` clamped to 8..=32
    pub fn new(slave_id: u8, branch_count: u8) -> Self {
        Self {
            slave_id,
            branch_count: branch_count.clamp(DEFAULT_BRANCHES, MAX_BRANCHES),
            baud_rate: DEFAULT_BAUD_RATE,
            pulse_guard_ms: DEFAULT_PULSE_GUARD_MS,
        }
    }

    /// Baud rate used for reply timing
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// How much earlier than the pulse length the cache reverts
    pub fn with_pulse_guard(mut self, guard: Duration) -> Self {
        self.pulse_guard_ms = guard.as_millis() as u64;
        self
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RelayError::InvalidConfig(e.to_string()))
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// Configured channel count, between 8 and 32
    pub fn branch_count(&self) -> u8 {
        self.branch_count
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn pulse_guard(&self) -> Duration {
        Duration::from_millis(self.pulse_guard_ms)
    }
}

/// Client for one relay board.
///
/// Safe to share between threads: requests are serialized on the link so a
/// reply is always read by the caller that sent the request.
pub struct RelayClient<L> {
    config: ClientConfig,
    codec: FrameCodec,
    transport: Mutex<TimedTransport<L>>,
    cache: ChannelStateCache,
}

impl<L: SerialLink> RelayClient<L> {
    /// Client over `link` with an all-off cache
    pub fn new(link: L, config: ClientConfig) -> Self {
        Self {
            codec: FrameCodec::new(config.slave_id()),
            transport: Mutex::new(TimedTransport::new(link, config.baud_rate())),
            cache: ChannelStateCache::new(config.branch_count()),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The client's channel state cache
    pub fn cache(&self) -> &ChannelStateCache {
        &self.cache
    }

    /// Snapshot of the cached channel states
    pub fn cached(&self) -> ChannelSet {
        self.cache.get_all()
    }

    /// Traffic counters of the transport
    pub fn counters(&self) -> TrafficCounters {
        self.transport().counters()
    }

    /// Give back the underlying link
    pub fn into_link(self) -> L {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_link()
    }

    fn transport(&self) -> MutexGuard<'_, TimedTransport<L>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode, send and decode one request while holding the link.
    /// Returns `None` for silent codes.
    fn exchange(
        &self,
        function: FunctionCode,
        payload: &[u8],
    ) -> Result<Option<[u8; PAYLOAD_SIZE]>> {
        let mut transport = self.transport();
        let request = self.codec.encode(function, payload)?;
        let response = transport.send(&request)?;
        if function.is_silent() {
            return Ok(None);
        }
        self.codec.verify(&request, &response)?;
        let (_, data) = self.codec.decode(&response)?;
        Ok(Some(data))
    }

    fn send(&self, function: FunctionCode, payload: &[u8]) -> Result<[u8; PAYLOAD_SIZE]> {
        self.exchange(function, payload)?.ok_or_else(|| {
            RelayError::MalformedResponse(format!("no reply to {:#04x}", function.code()))
        })
    }

    fn send_nil(&self, function: FunctionCode, payload: &[u8]) -> Result<()> {
        self.exchange(function, payload).map(|_| ())
    }

    /// Validate a 1-based channel and return its 0-based index
    fn check_channel(&self, channel: u8) -> Result<usize> {
        if channel == 0 || channel > self.config.branch_count() {
            return Err(RelayError::ChannelOutOfRange {
                channel: channel as u32,
                max: self.config.branch_count(),
            });
        }
        Ok(channel as usize - 1)
    }

    fn one(&self, channel: u8, function: FunctionCode, expected: Option<bool>) -> Result<()> {
        let index = self.check_channel(channel)?;
        let status = self.send(function, &[0, 0, 0, channel])?;
        let actual = bit_at(&status, index as u8);
        if let Some(expected) = expected {
            if actual != expected {
                return Err(RelayError::UnexpectedConfirmation {
                    channel,
                    expected,
                    actual,
                });
            }
        }
        self.cache.set(index, actual)
    }

    /// Switch channel `channel` (1-based) off and confirm it
    pub fn off_one(&self, channel: u8) -> Result<()> {
        self.one(channel, FunctionCode::OffOne, Some(false))
    }

    /// Switch channel `channel` (1-based) on and confirm it
    pub fn on_one(&self, channel: u8) -> Result<()> {
        self.one(channel, FunctionCode::OnOne, Some(true))
    }

    /// Toggle channel `channel` (1-based).
    ///
    /// Any reported state is accepted since the previous state is unknown;
    /// the cache takes whatever the board reports.
    pub fn flip_one(&self, channel: u8) -> Result<()> {
        self.one(channel, FunctionCode::FlipOne, None)
    }

    /// Read the state of every configured channel
    pub fn status(&self) -> Result<ChannelSet> {
        let data = self.send(FunctionCode::ReadStatus, &[0, 0, 0, 0])?;
        ChannelSet::unpack(&data, self.config.branch_count())
    }

    /// Read the state of channel `channel` (1-based)
    pub fn status_one(&self, channel: u8) -> Result<bool> {
        let index = self.check_channel(channel)?;
        let status = self.status()?;
        status.get(index).ok_or(RelayError::ChannelOutOfRange {
            channel: channel as u32,
            max: self.config.branch_count(),
        })
    }

    /// Mirror a group command in the cache, once per set bit of its mask
    fn apply_group(&self, mask: &[u8; PAYLOAD_SIZE], function: FunctionCode) -> Result<()> {
        let word = u32::from_be_bytes(*mask);
        for index in (0..MAX_BRANCHES as usize).filter(|i| word & (1u32 << *i) != 0) {
            match function {
                FunctionCode::OnGroup | FunctionCode::OnGroupNil => self.cache.set(index, true)?,
                FunctionCode::OffGroup | FunctionCode::OffGroupNil => {
                    self.cache.set(index, false)?
                }
                _ => {
                    self.cache.toggle(index)?;
                }
            }
        }
        Ok(())
    }

    fn group(&self, indices: &[u8], function: FunctionCode) -> Result<()> {
        let mask = group_mask(indices, self.config.branch_count())?;
        if function.is_silent() {
            self.send_nil(function, &mask)?;
        } else {
            self.send(function, &mask)?;
        }
        self.apply_group(&mask, function)
    }

    /// Switch off the given 0-based channels, leaving the rest untouched
    pub fn off_group(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::OffGroup)
    }

    /// Switch on the given 0-based channels, leaving the rest untouched
    pub fn on_group(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::OnGroup)
    }

    /// Toggle the given 0-based channels, leaving the rest untouched
    pub fn flip_group(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::FlipGroup)
    }

    fn point(&self, channel: u8, ms: u32, function: FunctionCode, value: bool) -> Result<()> {
        let index = self.check_channel(channel)?;
        if ms > MAX_PULSE_MS {
            return Err(RelayError::DurationTooLong {
                ms,
                max: MAX_PULSE_MS,
            });
        }
        let payload = [(ms >> 16) as u8, (ms >> 8) as u8, ms as u8, channel];
        if function.is_silent() {
            self.send_nil(function, &payload)?;
        } else {
            self.send(function, &payload)?;
        }

        self.cache.set(index, value)?;
        let delay = Duration::from_millis(ms as u64).saturating_sub(self.config.pulse_guard());
        debug!(
            "channel {} pulsed {} for {}ms",
            channel,
            if value { "on" } else { "off" },
            ms
        );
        self.cache.schedule_pulse(index, !value, delay)?;
        Ok(())
    }

    /// Switch channel `channel` (1-based) off for `ms` milliseconds; the board switches it back
    pub fn off_point(&self, channel: u8, ms: u32) -> Result<()> {
        self.point(channel, ms, FunctionCode::OffPoint, false)
    }

    /// Switch channel `channel` (1-based) on for `ms` milliseconds; the board switches it back
    pub fn on_point(&self, channel: u8, ms: u32) -> Result<()> {
        self.point(channel, ms, FunctionCode::OnPoint, true)
    }

    /// Write all 32 outputs at once and wait for the echo
    pub fn run(&self, states: &ChannelSet) -> Result<()> {
        self.send(FunctionCode::RunCmd, &states.pack())?;
        self.cache.replace(states);
        Ok(())
    }

    /// Write all 32 outputs at once without waiting for a reply
    pub fn run_nil(&self, states: &ChannelSet) -> Result<()> {
        self.send_nil(FunctionCode::RunCmdNil, &states.pack())?;
        self.cache.replace(states);
        Ok(())
    }

    /// Switch every output on
    pub fn on_all(&self) -> Result<()> {
        self.run_nil(&ChannelSet::filled(MAX_BRANCHES, true))
    }

    /// Switch every output off
    pub fn off_all(&self) -> Result<()> {
        self.run_nil(&ChannelSet::new(MAX_BRANCHES))
    }

    fn one_nil(&self, channel: u8, function: FunctionCode) -> Result<()> {
        let index = self.check_channel(channel)?;
        self.send_nil(function, &[0, 0, 0, channel])?;
        match function {
            FunctionCode::OnOneNil => self.cache.set(index, true),
            FunctionCode::OffOneNil => self.cache.set(index, false),
            _ => self.cache.toggle(index).map(|_| ()),
        }
    }

    /// Switch channel `channel` (1-based) off without waiting for a reply
    pub fn off_one_nil(&self, channel: u8) -> Result<()> {
        self.one_nil(channel, FunctionCode::OffOneNil)
    }

    /// Switch channel `channel` (1-based) on without waiting for a reply
    pub fn on_one_nil(&self, channel: u8) -> Result<()> {
        self.one_nil(channel, FunctionCode::OnOneNil)
    }

    /// Toggle channel `channel` (1-based) without waiting for a reply
    pub fn flip_one_nil(&self, channel: u8) -> Result<()> {
        self.one_nil(channel, FunctionCode::FlipOneNil)
    }

    /// Switch off the given 0-based channels without waiting for a reply
    pub fn off_group_nil(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::OffGroupNil)
    }

    /// Switch on the given 0-based channels without waiting for a reply
    pub fn on_group_nil(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::OnGroupNil)
    }

    /// Toggle the given 0-based channels without waiting for a reply
    pub fn flip_group_nil(&self, indices: &[u8]) -> Result<()> {
        self.group(indices, FunctionCode::FlipGroupNil)
    }

    /// Pulse channel `channel` (1-based) off for `ms` milliseconds without waiting for a reply
    pub fn off_point_nil(&self, channel: u8, ms: u32) -> Result<()> {
        self.point(channel, ms, FunctionCode::OffPointNil, false)
    }

    /// Pulse channel `channel` (1-based) on for `ms` milliseconds without waiting for a reply
    pub fn on_point_nil(&self, channel: u8, ms: u32) -> Result<()> {
        self.point(channel, ms, FunctionCode::OnPointNil, true)
    }
}
