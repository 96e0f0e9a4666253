//! Function codes
//!
//! Defines the operations understood by the board and how many bytes each
//! one answers with.

use serde::{Deserialize, Serialize};

use super::{EXCEPTION_FLAG, FRAME_SIZE};

/// First function code of the silent (no response) range
pub const SILENT_FIRST: u8 = 0x30;

/// Last function code of the silent (no response) range
pub const SILENT_LAST: u8 = 0x38;

/// Operations addressed to a relay board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read the 32-bit channel status word
    ReadStatus = 0x10,
    /// Switch one channel off
    OffOne = 0x11,
    /// Switch one channel on
    OnOne = 0x12,
    /// Write all 32 channels at once
    RunCmd = 0x13,
    /// Toggle one channel
    FlipOne = 0x14,
    /// Switch a group of channels off
    OffGroup = 0x15,
    /// Switch a group of channels on
    OnGroup = 0x16,
    /// Toggle a group of channels
    FlipGroup = 0x17,
    /// Switch one channel on for a timed window
    OnPoint = 0x21,
    /// Switch one channel off for a timed window
    OffPoint = 0x22,
    /// [`FunctionCode::OffPoint`] with no reply
    OffPointNil = 0x30,
    /// [`FunctionCode::OffOne`] with no reply
    OffOneNil = 0x31,
    /// [`FunctionCode::OnOne`] with no reply
    OnOneNil = 0x32,
    /// [`FunctionCode::RunCmd`] with no reply
    RunCmdNil = 0x33,
    /// [`FunctionCode::FlipOne`] with no reply
    FlipOneNil = 0x34,
    /// [`FunctionCode::OffGroup`] with no reply
    OffGroupNil = 0x35,
    /// [`FunctionCode::OnGroup`] with no reply
    OnGroupNil = 0x36,
    /// [`FunctionCode::FlipGroup`] with no reply
    FlipGroupNil = 0x37,
    /// [`FunctionCode::OnPoint`] with no reply
    OnPointNil = 0x38,
}

/// What the board sends back for a given request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePlan {
    /// Nothing is sent back
    Silent,
    /// A full frame echoing the function code
    Echo,
}

impl ResponsePlan {
    /// Bytes to read for a successful reply
    pub fn length(&self) -> usize {
        match self {
            ResponsePlan::Silent => 0,
            ResponsePlan::Echo => FRAME_SIZE,
        }
    }

    /// True if nothing should be read back
    pub fn is_silent(&self) -> bool {
        matches!(self, ResponsePlan::Silent)
    }
}

const ALL: [FunctionCode; 19] = [
    FunctionCode::ReadStatus,
    FunctionCode::OffOne,
    FunctionCode::OnOne,
    FunctionCode::RunCmd,
    FunctionCode::FlipOne,
    FunctionCode::OffGroup,
    FunctionCode::OnGroup,
    FunctionCode::FlipGroup,
    FunctionCode::OnPoint,
    FunctionCode::OffPoint,
    FunctionCode::OffPointNil,
    FunctionCode::OffOneNil,
    FunctionCode::OnOneNil,
    FunctionCode::RunCmdNil,
    FunctionCode::FlipOneNil,
    FunctionCode::OffGroupNil,
    FunctionCode::OnGroupNil,
    FunctionCode::FlipGroupNil,
    FunctionCode::OnPointNil,
];

impl FunctionCode {
    /// Every known function code
    pub fn all() -> &'static [FunctionCode] {
        &ALL
    }

    /// Wire byte for this code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Look up a code from its wire byte
    pub fn from_byte(byte: u8) -> Option<FunctionCode> {
        ALL.iter().copied().find(|f| f.code() == byte)
    }

    /// Response plan for this code
    pub fn response_plan(&self) -> ResponsePlan {
        plan_for(self.code())
    }

    /// Check if this code suppresses the response frame
    pub fn is_silent(&self) -> bool {
        self.response_plan().is_silent()
    }

    /// Function byte the board answers with when it rejects this code
    pub fn exception_code(&self) -> u8 {
        self.code() | EXCEPTION_FLAG
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        FunctionCode::from_byte(byte).ok_or(byte)
    }
}

impl From<FunctionCode> for u8 {
    fn from(function: FunctionCode) -> u8 {
        function.code()
    }
}

fn plan_for(function: u8) -> ResponsePlan {
    if (SILENT_FIRST..=SILENT_LAST).contains(&function) {
        ResponsePlan::Silent
    } else {
        ResponsePlan::Echo
    }
}

/// Number of bytes a successful reply to `function` occupies (0 for silent codes)
pub fn expected_length(function: u8) -> usize {
    plan_for(function).length()
}
