use airlift_link::LinkError;
use thiserror::Error;

/// POSIX-style error numbers reported by [`SocketError::errno`].
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const EOPNOTSUPP: i32 = 95;
    pub const EADDRINUSE: i32 = 98;
    pub const EADDRNOTAVAIL: i32 = 99;
    pub const ENOTCONN: i32 = 107;
    pub const ETIMEDOUT: i32 = 110;
    /// getaddrinfo's "name or service not known".
    pub const EAI_NONAME: i32 = -2;
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("operation would block")]
    WouldBlock,
    #[error("timed out")]
    TimedOut,
    #[error("socket is not connected")]
    NotConnected,
    #[error("operation not supported")]
    NotSupported,
    #[error("address not available")]
    AddrNotAvailable,
    #[error("socket in use")]
    InUse,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("out of sockets")]
    OutOfSockets,
    #[error("name or service not known")]
    NameNotResolved,
    #[error("socket is closed")]
    Closed,
    #[error("operation failed")]
    Failed,
    #[error("co-processor link failed")]
    Link(#[source] LinkError),
}

impl SocketError {
    /// Negative POSIX-style code for language-neutral callers.
    pub fn errno(&self) -> i32 {
        let code = match self {
            SocketError::WouldBlock => errno::EAGAIN,
            SocketError::TimedOut => errno::ETIMEDOUT,
            SocketError::NotConnected => errno::ENOTCONN,
            SocketError::NotSupported => errno::EOPNOTSUPP,
            SocketError::AddrNotAvailable => errno::EADDRNOTAVAIL,
            SocketError::InUse => errno::EADDRINUSE,
            SocketError::InvalidArgument(_) => errno::EINVAL,
            SocketError::OutOfSockets => errno::ENOMEM,
            SocketError::NameNotResolved => return errno::EAI_NONAME,
            SocketError::Closed => errno::EBADF,
            SocketError::Failed | SocketError::Link(_) => errno::EIO,
        };
        -code
    }

    /// Deadline elapsed in a polling operation; worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SocketError::TimedOut)
    }
}

/// Transport failures and rejected commands both surface as generic
/// failures; only the former keeps its cause attached.
impl From<LinkError> for SocketError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NoResponse { .. } | LinkError::CommandFailed { .. } => SocketError::Failed,
            LinkError::InvalidArgument(what) => SocketError::InvalidArgument(what),
            other => SocketError::Link(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_link::opcode;

    #[test]
    fn codes_are_negative_posix_numbers() {
        assert_eq!(SocketError::WouldBlock.errno(), -11);
        assert_eq!(SocketError::TimedOut.errno(), -110);
        assert_eq!(SocketError::NotSupported.errno(), -95);
        assert_eq!(SocketError::AddrNotAvailable.errno(), -99);
        assert_eq!(SocketError::NameNotResolved.errno(), -2);
    }

    #[test]
    fn would_block_and_timeout_are_distinct() {
        assert!(SocketError::TimedOut.is_timeout());
        assert!(!SocketError::WouldBlock.is_timeout());
        assert_ne!(SocketError::TimedOut.errno(), SocketError::WouldBlock.errno());
    }

    #[test]
    fn wire_failures_never_leak_as_parse_errors() {
        let err: SocketError = LinkError::CommandFailed {
            opcode: opcode::START_CLIENT_TCP,
            status: 0,
        }
        .into();
        assert!(matches!(err, SocketError::Failed));

        let err: SocketError = LinkError::ReadyTimeout { high: false }.into();
        assert_eq!(err.to_string(), "co-processor link failed");
        assert_eq!(err.errno(), -5);
    }
}
