use thiserror::Error;

use crate::command::opcode_name;

/// Failures while building or parsing a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected {expected:#04x} but got {actual:#04x}")]
    UnexpectedByte { expected: u8, actual: u8 },
    #[error("error response to co-processor command")]
    RemoteError,
    #[error("timeout waiting for start byte")]
    MissingStart,
    #[error("too many parameters ({0})")]
    TooManyParams(usize),
    #[error("parameter {index} is {len} bytes, longer than its length prefix allows")]
    ParamTooLong { index: usize, len: usize },
    #[error("frame truncated")]
    Truncated,
    #[error("bus read failed")]
    ReadFailed,
}

fn level(high: &bool) -> &'static str {
    if *high {
        "high"
    } else {
        "low"
    }
}

fn name(op: &u8) -> &'static str {
    opcode_name(*op)
}

/// Failures of a whole command/response exchange or a radio operation.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("timeout waiting for ready {}", level(.high))]
    ReadyTimeout { high: bool },
    #[error("interrupted while waiting for the bus")]
    Interrupted,
    #[error("bus write failed")]
    WriteFailed,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("no response to {}", name(.opcode))]
    NoResponse { opcode: u8 },
    #[error("{} failed with status {status}", name(.opcode))]
    CommandFailed { opcode: u8, status: u8 },
    #[error("radio is not enabled")]
    NotEnabled,
    #[error("{0} is not implemented by the co-processor")]
    NotImplemented(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl LinkError {
    /// `true` for failures caused by waiting too long rather than a bad reply.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LinkError::ReadyTimeout { .. } | LinkError::Frame(FrameError::MissingStart)
        )
    }
}

/// Why joining an access point did not succeed.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no co-processor answered")]
    NoRadio,
    #[error("no access point with that SSID")]
    NoApFound,
    #[error("association failed")]
    ConnectionFailed,
    #[error("unexpected connection status {0}")]
    Unspecified(u8),
    #[error("timed out waiting to associate")]
    TimedOut,
    #[error(transparent)]
    Link(#[from] LinkError),
}
