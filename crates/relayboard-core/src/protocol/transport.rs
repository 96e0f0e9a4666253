//! Timed transport
//!
//! Writes a request frame, waits out the line time the board needs to answer
//! and reads the reply in two stages: the minimum header first, then either
//! the rest of the echo frame or the short exception tail.

use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::function::expected_length;
use super::serial::SerialLink;
use super::{RelayError, Result, EXCEPTION_FLAG, EXCEPTION_SIZE, MIN_RESPONSE_SIZE};

/// Baud rates above this use the fixed delays below
const MAX_TIMED_BAUD: u32 = 19200;
const FIXED_CHARACTER_DELAY_US: u64 = 750;
const FIXED_FRAME_DELAY_US: u64 = 1750;

/// Inter-character silence in microseconds for a baud rate
pub fn character_delay_us(baud_rate: u32) -> u64 {
    if baud_rate == 0 || baud_rate > MAX_TIMED_BAUD {
        FIXED_CHARACTER_DELAY_US
    } else {
        15_000_000 / baud_rate as u64
    }
}

/// Inter-frame silence in microseconds for a baud rate
pub fn frame_delay_us(baud_rate: u32) -> u64 {
    if baud_rate == 0 || baud_rate > MAX_TIMED_BAUD {
        FIXED_FRAME_DELAY_US
    } else {
        35_000_000 / baud_rate as u64
    }
}

/// Time to wait before `chars` bytes have crossed the line and the frame gap has passed
pub fn calculate_delay(baud_rate: u32, chars: usize) -> Duration {
    Duration::from_micros(character_delay_us(baud_rate) * chars as u64 + frame_delay_us(baud_rate))
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// Bytes written to the link
    pub tx_bytes: u64,
    /// Bytes read from the link
    pub rx_bytes: u64,
    /// Requests sent
    pub tx_frames: u64,
    /// Replies received
    pub rx_frames: u64,
}

/// Request/response exchange over a [`SerialLink`]
pub struct TimedTransport<L> {
    link: L,
    baud_rate: u32,
    counters: TrafficCounters,
}

impl<L: SerialLink> TimedTransport<L> {
    /// Wrap `link`, timing replies for `baud_rate`
    pub fn new(link: L, baud_rate: u32) -> Self {
        Self {
            link,
            baud_rate,
            counters: TrafficCounters::default(),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Traffic so far
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Give back the underlying link
    pub fn into_link(self) -> L {
        self.link
    }

    /// Wait before reading a reply, for `chars` bytes in total on the line
    pub fn delay(&self, chars: usize) -> Duration {
        calculate_delay(self.baud_rate, chars)
    }

    /// Send a request and return the raw reply.
    ///
    /// Silent function codes return an empty reply without touching the
    /// read side. An exception reply is returned as [`RelayError::SlaveException`].
    pub fn send(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        if request.len() < MIN_RESPONSE_SIZE {
            return Err(RelayError::FrameTooShort {
                length: request.len(),
            });
        }

        self.link.ensure_open()?;

        debug!("sending {:02x?}", request);
        self.link.write(request).map_err(RelayError::from_link)?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(request.len() as u64);
        self.counters.tx_frames = self.counters.tx_frames.saturating_add(1);

        let function = request[2];
        let bytes_to_read = expected_length(function);
        if bytes_to_read == 0 {
            trace!("function {:#04x} is silent, not reading", function);
            return Ok(Vec::new());
        }

        let delay = self.delay(request.len() + bytes_to_read);
        trace!("waiting {}us before reading", delay.as_micros());
        thread::sleep(delay);

        let mut response = self
            .link
            .read_at_least(MIN_RESPONSE_SIZE)
            .map_err(RelayError::from_link)?;
        if response.len() < MIN_RESPONSE_SIZE {
            return Err(RelayError::ResponseTooShort {
                length: response.len(),
                min: MIN_RESPONSE_SIZE,
            });
        }

        let actual = response[2];
        if actual == function {
            self.fill(&mut response, bytes_to_read)?;
        } else if actual == function | EXCEPTION_FLAG {
            self.fill(&mut response, EXCEPTION_SIZE)?;
            warn!("board rejected function {:#04x}: {:02x?}", function, response);
            return Err(RelayError::SlaveException { function, response });
        } else {
            return Err(RelayError::UnexpectedFunction {
                expected: function,
                actual,
            });
        }

        debug!("received {:02x?}", response);
        Ok(response)
    }

    /// Read until `response` holds exactly `length` bytes
    fn fill(&mut self, response: &mut Vec<u8>, length: usize) -> Result<()> {
        if response.len() < length {
            let rest = self
                .link
                .read_at_least(length - response.len())
                .map_err(RelayError::from_link)?;
            response.extend_from_slice(&rest);
        }
        if response.len() > length {
            trace!("discarding {} trailing bytes", response.len() - length);
            response.truncate(length);
        }
        self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(response.len() as u64);
        self.counters.rx_frames = self.counters.rx_frames.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Link replaying scripted read chunks
    #[derive(Default)]
    struct ScriptedLink {
        written: Vec<u8>,
        chunks: VecDeque<Vec<u8>>,
        read_requests: Vec<usize>,
    }

    impl SerialLink for ScriptedLink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read_at_least(&mut self, n: usize) -> io::Result<Vec<u8>> {
            self.read_requests.push(n);
            self.chunks
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    #[test]
    fn test_delay_at_9600() {
        let expected = 15_000_000 / 9600 * 8 + 35_000_000 / 9600;
        assert_eq!(calculate_delay(9600, 8), Duration::from_micros(expected));
        assert_eq!(calculate_delay(9600, 8).as_micros(), 16141);
    }

    #[test]
    fn test_delay_fixed_above_19200() {
        assert_eq!(character_delay_us(115200), 750);
        assert_eq!(frame_delay_us(0), 1750);
        assert_eq!(calculate_delay(38400, 16), Duration::from_micros(750 * 16 + 1750));
        assert_eq!(character_delay_us(19200), 781);
    }

    #[test]
    fn test_silent_code_skips_read() {
        let mut transport = TimedTransport::new(ScriptedLink::default(), 115200);
        let request = [0x55, 0x01, 0x33, 0, 0, 0, 0, 0x89];
        let response = transport.send(&request).expect("send");
        assert!(response.is_empty());
        assert!(transport.link().read_requests.is_empty());
        assert_eq!(transport.link().written, request.to_vec());
    }

    #[test]
    fn test_two_stage_read() {
        let link = ScriptedLink {
            chunks: VecDeque::from(vec![
                vec![0x55, 0x01, 0x10, 0x00, 0x00],
                vec![0x00, 0x05, 0x6b],
            ]),
            ..Default::default()
        };
        let mut transport = TimedTransport::new(link, 115200);
        let response = transport
            .send(&[0x55, 0x01, 0x10, 0, 0, 0, 0, 0x66])
            .expect("send");
        assert_eq!(response.len(), 8);
        assert_eq!(transport.link().read_requests, vec![4, 3]);
        assert_eq!(transport.counters().rx_frames, 1);
    }

    #[test]
    fn test_exception_reads_five_bytes() {
        let link = ScriptedLink {
            chunks: VecDeque::from(vec![vec![0x55, 0x01, 0x92, 0x01], vec![0xe9]]),
            ..Default::default()
        };
        let mut transport = TimedTransport::new(link, 115200);
        let err = transport
            .send(&[0x55, 0x01, 0x12, 0, 0, 0, 1, 0x69])
            .unwrap_err();
        match err {
            RelayError::SlaveException { function, response } => {
                assert_eq!(function, 0x12);
                assert_eq!(response.len(), 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.link().read_requests, vec![4, 1]);
    }

    #[test]
    fn test_desync_is_reported() {
        let link = ScriptedLink {
            chunks: VecDeque::from(vec![vec![0x55, 0x01, 0x44, 0x00]]),
            ..Default::default()
        };
        let mut transport = TimedTransport::new(link, 115200);
        let err = transport
            .send(&[0x55, 0x01, 0x12, 0, 0, 0, 1, 0x69])
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::UnexpectedFunction {
                expected: 0x12,
                actual: 0x44
            }
        ));
    }

    #[test]
    fn test_read_timeout() {
        let mut transport = TimedTransport::new(ScriptedLink::default(), 115200);
        let err = transport
            .send(&[0x55, 0x01, 0x10, 0, 0, 0, 0, 0x66])
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout));
    }
}
