//! Request/reply framing.
//!
//! Pure data transformation: [`Command::encode`] turns an opcode and its
//! parameters into request bytes, and [`decode_response`] parses a reply
//! from any [`ByteSource`] into caller-supplied buffers.  The transaction
//! executor feeds it bytes straight off the bus; tests feed it slices.
//!
//! # Wire format
//!
//! Lengths are big-endian when they take two bytes.  Whether a parameter or
//! response length takes one or two bytes is fixed per opcode (see
//! [`crate::command::param_width`]).
//!
//! ```text
//! request:  E0 | op & 7F | nparams | (len, bytes)* | 00 padding to 4n
//! reply:    E0 | op | 80 | nresp   | (len, bytes)* | EE
//! rejected: EF
//! ```

use log::{trace, warn};

use crate::command::{
    opcode_name, param_width, response_width, LengthWidth, END_BYTE, ERROR_BYTE, FRAME_ALIGN,
    OPCODE_MASK, REPLY_FLAG, START_BYTE,
};
use crate::error::FrameError;

/// Upper bound on the number of responses a caller can collect from one reply.
/// A network scan is the widest reply, one SSID per network.
pub const MAX_RESPONSES: usize = 10;

/// Bytes actually stored into each caller slot, one entry per response kept.
pub type ResponseLengths = heapless::Vec<usize, MAX_RESPONSES>;

// Fixed bytes in front of the parameter list.
const OFF_OPCODE: usize = 1;
const OFF_NPARAMS: usize = 2;
const REQUEST_HEADER_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One outgoing command: an opcode plus its ordered parameters.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    opcode: u8,
    params: &'a [&'a [u8]],
}

impl<'a> Command<'a> {
    pub fn new(opcode: u8, params: &'a [&'a [u8]]) -> Self {
        Self {
            opcode: opcode & OPCODE_MASK,
            params,
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn params(&self) -> &'a [&'a [u8]] {
        self.params
    }

    /// Length-prefix width declared for this opcode.
    pub fn width(&self) -> LengthWidth {
        param_width(self.opcode)
    }

    /// Size of the encoded frame including padding.
    pub fn encoded_len(&self) -> usize {
        let prefix = self.width().prefix_len();
        let body: usize = self.params.iter().map(|p| prefix + p.len()).sum();
        (REQUEST_HEADER_LEN + body).next_multiple_of(FRAME_ALIGN)
    }

    /// Serialise into request bytes.
    ///
    /// Fails when there are more than 255 parameters or a parameter does not
    /// fit its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.params.len() > u8::MAX as usize {
            return Err(FrameError::TooManyParams(self.params.len()));
        }
        let width = self.width();

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(START_BYTE);
        buf.push(self.opcode);
        buf.push(self.params.len() as u8);

        for (index, param) in self.params.iter().enumerate() {
            if param.len() > width.max_len() {
                return Err(FrameError::ParamTooLong {
                    index,
                    len: param.len(),
                });
            }
            push_len(&mut buf, width, param.len());
            buf.extend_from_slice(param);
        }

        while buf.len() % FRAME_ALIGN != 0 {
            buf.push(0x00);
        }
        Ok(buf)
    }
}

fn push_len(buf: &mut Vec<u8>, width: LengthWidth, len: usize) {
    match width {
        LengthWidth::Eight => buf.push(len as u8),
        LengthWidth::Sixteen => buf.extend_from_slice(&(len as u16).to_be_bytes()),
    }
}

/// A request as seen from the co-processor side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: u8,
    pub params: Vec<Vec<u8>>,
}

impl Request {
    /// Parameter `index` as a byte slice, empty when absent.
    pub fn param(&self, index: usize) -> &[u8] {
        self.params.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse request bytes, ignoring trailing padding.
pub fn decode_request(bytes: &[u8]) -> Result<Request, FrameError> {
    if bytes.len() < REQUEST_HEADER_LEN {
        return Err(FrameError::Truncated);
    }
    if bytes[0] != START_BYTE {
        return Err(FrameError::UnexpectedByte {
            expected: START_BYTE,
            actual: bytes[0],
        });
    }
    let opcode = bytes[OFF_OPCODE];
    let nparams = bytes[OFF_NPARAMS] as usize;
    let width = param_width(opcode);

    let mut src = SliceSource::new(&bytes[REQUEST_HEADER_LEN..]);
    let mut params = Vec::with_capacity(nparams);
    for _ in 0..nparams {
        let len = read_len(&mut src, width)?;
        let mut param = vec![0u8; len];
        src.read_exact(&mut param)?;
        params.push(param);
    }
    Ok(Request { opcode, params })
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Serialise a successful reply to `opcode`.
///
/// A reply cannot carry more than 255 responses, and each response must fit
/// the opcode's length prefix.  Anything beyond either bound is dropped with
/// a warning so the frame stays well formed.
pub fn encode_reply(opcode: u8, responses: &[Vec<u8>]) -> Vec<u8> {
    let width = response_width(opcode);
    let count = responses.len().min(u8::MAX as usize);
    if count < responses.len() {
        warn!(
            "[link] {} reply has {} responses, sending {}",
            opcode_name(opcode),
            responses.len(),
            count
        );
    }

    let mut buf = vec![START_BYTE, (opcode & OPCODE_MASK) | REPLY_FLAG, count as u8];
    for (index, response) in responses[..count].iter().enumerate() {
        let len = response.len().min(width.max_len());
        if len < response.len() {
            warn!(
                "[link] {} response #{} clipped from {} to {} bytes",
                opcode_name(opcode),
                index,
                response.len(),
                len
            );
        }
        push_len(&mut buf, width, len);
        buf.extend_from_slice(&response[..len]);
    }
    buf.push(END_BYTE);
    buf
}

/// Serialise a rejection.
pub fn encode_error_reply() -> Vec<u8> {
    vec![ERROR_BYTE]
}

/// Anything the reply decoder can pull bytes from.
pub trait ByteSource {
    fn read_byte(&mut self) -> Result<u8, FrameError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Called between start-byte attempts.
    fn retry_pause(&mut self) {}
}

/// [`ByteSource`] over an in-memory buffer.
#[derive(Debug)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    fn read_byte(&mut self) -> Result<u8, FrameError> {
        let byte = *self.bytes.get(self.pos).ok_or(FrameError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        let end = self.pos + buf.len();
        let src = self.bytes.get(self.pos..end).ok_or(FrameError::Truncated)?;
        buf.copy_from_slice(src);
        self.pos = end;
        Ok(())
    }
}

fn read_len<S: ByteSource>(src: &mut S, width: LengthWidth) -> Result<usize, FrameError> {
    let hi = src.read_byte()? as usize;
    match width {
        LengthWidth::Eight => Ok(hi),
        LengthWidth::Sixteen => Ok((hi << 8) | src.read_byte()? as usize),
    }
}

fn expect_byte<S: ByteSource>(src: &mut S, expected: u8) -> Result<(), FrameError> {
    let actual = src.read_byte()?;
    if actual != expected {
        return Err(FrameError::UnexpectedByte { expected, actual });
    }
    Ok(())
}

fn discard<S: ByteSource>(src: &mut S, mut count: usize) -> Result<(), FrameError> {
    let mut scratch = [0u8; 32];
    while count > 0 {
        let n = count.min(scratch.len());
        src.read_exact(&mut scratch[..n])?;
        count -= n;
    }
    Ok(())
}

/// Parse the reply to `opcode` into `slots`.
///
/// Up to `start_attempts` bytes are read looking for [`START_BYTE`], with a
/// [`ByteSource::retry_pause`] between attempts.  Responses beyond
/// `slots.len()` and bytes beyond a slot's capacity are read and dropped.
/// Returns how many bytes landed in each kept slot.
pub fn decode_response<S: ByteSource>(
    src: &mut S,
    opcode: u8,
    slots: &mut [&mut [u8]],
    start_attempts: u8,
) -> Result<ResponseLengths, FrameError> {
    let width = response_width(opcode);

    let mut attempts = 0u8;
    loop {
        match src.read_byte()? {
            START_BYTE => break,
            ERROR_BYTE => return Err(FrameError::RemoteError),
            _ => {}
        }
        attempts += 1;
        if attempts >= start_attempts {
            return Err(FrameError::MissingStart);
        }
        src.retry_pause();
    }

    expect_byte(src, (opcode & OPCODE_MASK) | REPLY_FLAG)?;

    let count = src.read_byte()? as usize;
    let capacity = slots.len().min(MAX_RESPONSES);
    let mut lengths = ResponseLengths::new();

    for index in 0..count {
        let len = read_len(src, width)?;
        if index >= capacity {
            warn!(
                "[link] {} response #{} dropped, caller expects {}",
                opcode_name(opcode),
                index,
                capacity
            );
            discard(src, len)?;
            continue;
        }

        let slot = &mut slots[index];
        let kept = len.min(slot.len());
        src.read_exact(&mut slot[..kept])?;
        if kept < len {
            warn!(
                "[link] {} response #{} truncated: {} bytes, kept {}",
                opcode_name(opcode),
                index,
                len,
                kept
            );
            discard(src, len - kept)?;
        }
        trace!("[link] ← {} #{} ({} bytes)", opcode_name(opcode), index, kept);
        // capacity <= MAX_RESPONSES, so this cannot overflow.
        let _ = lengths.push(kept);
    }

    expect_byte(src, END_BYTE)?;
    Ok(lengths)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
