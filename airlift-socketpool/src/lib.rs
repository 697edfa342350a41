//! # airlift-socketpool
//!
//! BSD-style sockets on top of [`airlift_link`].  The co-processor runs the
//! TCP/IP stack; this crate keeps per-socket bookkeeping and turns socket
//! calls into link commands.
//!
//! ```text
//!  ┌────────────┐  socket()   ┌──────────────────────────────┐
//!  │ SocketPool │────────────▶│ Socket (slot num + role)     │
//!  └─────┬──────┘             │ bind / listen / accept       │
//!        │ gethostbyname      │ connect / send / recv_into   │
//!        ▼                    └──────────────┬───────────────┘
//!  ┌────────────┐                            │ Rc<RefCell<Radio>>
//!  │ resolver   │───────────────────────────▶▼
//!  └────────────┘                   airlift_link::Radio
//! ```
//!
//! - [`pool`]: socket factory and name lookup
//! - [`socket`]: per-socket state machine and poll loops
//! - [`state`]: lifecycle and TCP state types
//! - [`timeout`]: timeout sentinels and deadlines
//! - [`resolver`]: two-phase co-processor DNS lookup
//! - [`emulator`]: loopback co-processor for tests and the demo
//! - [`error`]: socket errors and their POSIX codes

pub mod emulator;
pub mod error;
pub mod pool;
pub mod resolver;
pub mod socket;
pub mod state;
pub mod timeout;

pub use emulator::Emulator;
pub use error::SocketError;
pub use pool::{AddrInfo, SocketPool};
pub use socket::{SharedRadio, Socket};
pub use state::{proto, AddressFamily, Endpoint, SocketState, SocketType, TcpState};
pub use timeout::{PollConfig, Timeout, BLOCK_FOREVER};
