//! Analyser loop: owns a transport (real serial link or an in-memory test
//! double), drives raw bytes through the frame codec, and interprets each
//! completed frame against a [`PrintoutBuilder`].

use core_bitmap::{Printout, HEAD_WIDTH};
use core_capture::PrintoutBuilder;
use core_protocol::{parse_frame, Command, FrameCodec, ResponseCode};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum AnalyserError {
    #[error("serial transport error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to open serial port {port} at {baud} baud: {source}")]
    Open {
        port: String,
        baud: u32,
        source: serialport::Error,
    },
}

/// The byte-level I/O boundary the analyser loop drives. Non-blocking:
/// `read_available` must return immediately with whatever bytes are
/// currently buffered, never waiting for more.
pub trait Transport: Send {
    fn read_available(&mut self) -> io::Result<Vec<u8>>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Real hardware transport over a [`serialport::SerialPort`].
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> Result<Self, AnalyserError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|source| AnalyserError::Open {
                port: path.to_string(),
                baud,
                source,
            })?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; available];
        self.port.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)
    }
}

/// In-memory [`Transport`] double: bytes pushed onto the inbound queue are
/// returned whole on the next `read_available`; writes accumulate for
/// inspection. Used by tests and by the worker's scenario harness.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

impl Transport for InMemoryTransport {
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.inbound.drain(..).collect())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outbound.extend_from_slice(bytes);
        Ok(())
    }
}

/// Raw wire length of a `BurnLine` payload: 48 bytes pack 384 (`HEAD_WIDTH`)
/// pixels at 1 bit each.
const BURN_PAYLOAD_BYTES: usize = HEAD_WIDTH / 8;

/// Unpack a `BurnLine` payload into a `HEAD_WIDTH`-element 0/1 mask. The
/// wire payload is byte-reversed (printhead orientation) before unpacking
/// MSB-first. Payloads shorter than [`BURN_PAYLOAD_BYTES`] are right-padded
/// with zero bytes; the caller is responsible for counting this condition.
fn unpack_burn_payload(payload: &[u8]) -> [u8; HEAD_WIDTH] {
    let mut bytes = payload.to_vec();
    bytes.resize(BURN_PAYLOAD_BYTES, 0);
    bytes.reverse();

    let mut mask = [0u8; HEAD_WIDTH];
    for (byte_idx, byte) in bytes.iter().take(BURN_PAYLOAD_BYTES).enumerate() {
        for bit in 0..8 {
            mask[byte_idx * 8 + bit] = (byte >> (7 - bit)) & 1;
        }
    }
    mask
}

/// Holds the serial transport, the frame codec and the printout builder
/// for the lifetime of a capture session. `process` is the only method
/// that consumes transport bytes; it is non-blocking.
pub struct Analyser {
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    builder: PrintoutBuilder,
    payload_length_errors: u64,
}

impl Analyser {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(),
            builder: PrintoutBuilder::new(),
            payload_length_errors: 0,
        }
    }

    pub fn open(path: &str, baud: u32) -> Result<Self, AnalyserError> {
        Ok(Self::new(Box::new(SerialTransport::open(path, baud)?)))
    }

    pub fn send(&mut self, command: Command) -> Result<(), AnalyserError> {
        self.transport.write_all(&command.to_bytes())?;
        Ok(())
    }

    /// Drain whatever bytes are currently available and interpret every
    /// frame they complete. Non-blocking: if nothing is available this
    /// returns immediately having done nothing.
    pub fn process(&mut self) -> Result<(), AnalyserError> {
        let bytes = self.transport.read_available()?;
        if bytes.is_empty() {
            return Ok(());
        }
        for raw in self.codec.feed(&bytes) {
            let Some(frame) = parse_frame(&raw) else {
                continue;
            };
            self.dispatch(frame);
        }
        Ok(())
    }

    fn dispatch(&mut self, frame: core_protocol::Frame) {
        match frame.code {
            ResponseCode::Acknowledge => {
                trace!(target: "serial.analyser", "acknowledge");
            }
            ResponseCode::MotorAdvance => self.builder.line_advance(),
            ResponseCode::MotorReverse => self.builder.line_reverse(),
            ResponseCode::BurnLine => {
                if frame.payload.len() != BURN_PAYLOAD_BYTES {
                    self.payload_length_errors += 1;
                    warn!(
                        target: "serial.analyser",
                        len = frame.payload.len(),
                        expected = BURN_PAYLOAD_BYTES,
                        "burn_line_payload_length_mismatch"
                    );
                }
                let mask = unpack_burn_payload(&frame.payload);
                self.builder.burn_line(&mask);
            }
        }
    }

    pub fn payload_length_errors(&self) -> u64 {
        self.payload_length_errors
    }

    pub fn framing_losses(&self) -> u64 {
        self.codec.framing_losses()
    }

    /// A copy of the builder's stable prefix, or `None` if it has none yet.
    pub fn get_printout(&self) -> Option<Printout> {
        self.builder.get_image()
    }

    /// The same snapshot as [`Analyser::get_printout`], after which the
    /// builder is cleared down to its in-progress row.
    pub fn take_printout(&mut self) -> Option<Printout> {
        let snapshot = self.builder.get_image();
        self.builder.clear();
        snapshot
    }
}
