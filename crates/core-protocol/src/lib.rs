//! Framed byte protocol used between the analyser and the printhead's
//! controller: a byte-stuffed envelope (`0x02 ... 0x03`, `0x1B` escape)
//! wrapping single-byte outbound commands and variable-length inbound
//! response frames.

use tracing::warn;

pub const FRAME_START: u8 = 0x02;
pub const FRAME_END: u8 = 0x03;
pub const ESCAPE: u8 = 0x1B;

/// Outbound command payload bytes recognized by the printhead controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Poll,
    SetPaperIn,
    SetPaperOut,
    SetPlatenIn,
    SetPlatenOut,
    RecordingStart,
    RecordingStop,
}

impl Command {
    pub fn payload_byte(self) -> u8 {
        match self {
            Command::Poll => b'P',
            Command::SetPaperIn => b'A',
            Command::SetPaperOut => b'a',
            Command::SetPlatenIn => b'L',
            Command::SetPlatenOut => b'l',
            Command::RecordingStart => b'R',
            Command::RecordingStop => b'r',
        }
    }

    /// Wire form of this command: `0x02 <payload> 0x03`. Command payload
    /// bytes are drawn from a set disjoint from the control bytes, so no
    /// escaping is needed on the outbound path.
    pub fn to_bytes(self) -> [u8; 3] {
        [FRAME_START, self.payload_byte(), FRAME_END]
    }
}

/// Leading byte of an inbound response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Acknowledge,
    MotorAdvance,
    MotorReverse,
    BurnLine,
}

impl ResponseCode {
    pub fn from_leading_byte(byte: u8) -> Option<Self> {
        match byte {
            0x06 => Some(ResponseCode::Acknowledge),
            b'F' => Some(ResponseCode::MotorAdvance),
            b'B' => Some(ResponseCode::MotorReverse),
            b'U' => Some(ResponseCode::BurnLine),
            _ => None,
        }
    }
}

/// A fully decoded inbound frame: leading response byte plus any payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

/// Incremental byte-stuffed frame decoder. Feed it bytes as they arrive, in
/// any chunking, and it emits complete frames as they are assembled; a
/// partial frame may span arbitrarily many [`FrameCodec::feed`] calls
/// without losing data, and the internal buffer holds at most one frame's
/// worth of in-progress bytes at a time.
#[derive(Debug, Default)]
pub struct FrameCodec {
    state: FrameState,
    escape_next: bool,
    buffer: Vec<u8>,
    /// Count of resynchronization events (stray bytes discarded in `Idle`,
    /// or a frame aborted by a spurious `FRAME_START`). Surfaced as the
    /// `FramingLoss` error kind, recorded as a recoverable framing loss,
    /// not fatal.
    framing_losses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FrameState {
    #[default]
    Idle,
    Processing,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn framing_losses(&self) -> u64 {
        self.framing_losses
    }

    /// Feed a chunk of raw bytes, returning every frame that was completed
    /// as a result (zero, one, or several).
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.process_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.state == FrameState::Idle {
            if byte == FRAME_START {
                self.buffer.clear();
                self.escape_next = false;
                self.state = FrameState::Processing;
            } else {
                self.framing_losses += 1;
                warn!(target: "serial.codec", byte, "framing_loss_idle_discard");
            }
            return None;
        }

        // Processing.
        if self.escape_next {
            self.buffer.push(byte);
            self.escape_next = false;
            return None;
        }

        if byte == ESCAPE {
            self.escape_next = true;
            return None;
        }

        if byte == FRAME_START {
            self.framing_losses += 1;
            warn!(target: "serial.codec", "framing_loss_frame_aborted");
            self.state = FrameState::Idle;
            self.buffer.clear();
            return None;
        }

        if byte == FRAME_END {
            self.state = FrameState::Idle;
            return Some(std::mem::take(&mut self.buffer));
        }

        self.buffer.push(byte);
        None
    }
}

/// Parse a completed frame's raw bytes into a [`Frame`], if its leading
/// byte names a known response code.
pub fn parse_frame(raw: &[u8]) -> Option<Frame> {
    let (&code_byte, payload) = raw.split_first()?;
    let code = ResponseCode::from_leading_byte(code_byte)?;
    Some(Frame {
        code,
        payload: payload.to_vec(),
    })
}
