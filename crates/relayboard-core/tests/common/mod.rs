//! Simulated relay board for integration tests

#![allow(dead_code)]

use relayboard_core::protocol::{expected_length, Frame, SerialLink, EXCEPTION_FLAG, HEADER};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Board state and behaviour switches
#[derive(Debug, Default)]
pub struct Board {
    pub slave_id: u8,
    /// Output word, bit 0 is channel 1
    pub state: u32,
    pub pending: VecDeque<u8>,
    pub writes: Vec<Vec<u8>>,
    pub reads: Vec<usize>,
    /// Reply with exception frames
    pub reject: bool,
    /// Ignore commands but still reply
    pub stuck: bool,
    /// Ignore commands and never reply
    pub deaf: bool,
    /// Flip a bit in each reply's checksum
    pub corrupt: bool,
    /// Override the reply header byte
    pub reply_header: Option<u8>,
    pub fail_on_send: bool,
    /// Set if a request was written while a reply was still unread
    pub interleaved: bool,
}

impl Board {
    fn apply(&mut self, function: u8, payload: [u8; 4]) {
        let word = u32::from_be_bytes(payload);
        let bit = 1u32.checked_shl(payload[3].wrapping_sub(1) as u32).unwrap_or(0);
        match function {
            0x11 | 0x31 | 0x22 | 0x30 => self.state &= !bit,
            0x12 | 0x32 | 0x21 | 0x38 => self.state |= bit,
            0x14 | 0x34 => self.state ^= bit,
            0x13 | 0x33 => self.state = word,
            0x15 | 0x35 => self.state &= !word,
            0x16 | 0x36 => self.state |= word,
            0x17 | 0x37 => self.state ^= word,
            _ => {}
        }
    }

    fn handle(&mut self, request: &[u8]) {
        let frame = match Frame::from_bytes(request) {
            Ok(frame) => frame,
            Err(_) => return,
        };
        if self.deaf {
            return;
        }
        if !self.stuck {
            self.apply(frame.function, frame.payload);
        }
        if expected_length(frame.function) == 0 {
            return;
        }

        if self.reject {
            let mut reply = vec![HEADER, self.slave_id, frame.function | EXCEPTION_FLAG, 0x01];
            let sum = reply.iter().fold(0u8, |s, b| s.wrapping_add(*b));
            reply.push(sum);
            self.pending.extend(reply);
            return;
        }

        let mut reply = Frame::new(self.slave_id, frame.function, self.state.to_be_bytes()).to_bytes();
        if let Some(header) = self.reply_header {
            reply[0] = header;
        }
        if self.corrupt {
            reply[7] ^= 0x01;
        }
        self.pending.extend(reply);
    }
}

/// [`SerialLink`] talking to a shared [`Board`]
#[derive(Debug, Clone)]
pub struct BoardLink {
    board: Arc<Mutex<Board>>,
}

impl BoardLink {
    pub fn new() -> Self {
        Self {
            board: Arc::new(Mutex::new(Board {
                slave_id: 1,
                ..Board::default()
            })),
        }
    }

    pub fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().expect("board lock")
    }
}

impl SerialLink for BoardLink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut board = self.board();
        if board.fail_on_send {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        if !board.pending.is_empty() {
            board.interleaved = true;
        }
        board.writes.push(bytes.to_vec());
        board.handle(bytes);
        Ok(())
    }

    fn read_at_least(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut board = self.board();
        board.reads.push(n);
        if board.pending.len() < n {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
        }
        Ok(board.pending.drain(..n).collect())
    }
}
