//! # airlift-link
//!
//! Host side of the SPI link to a NINA-FW style WiFi co-processor
//! (Adafruit AirLift, u-blox NINA-W102, ESP32 running nina-fw).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Radio (radio.rs)               │  enabled, hostname,
//! │   call / call_status / expect_success          │  power mode, join, ping
//! ├───────────────────────────────────────────────┤
//! │            Transport (transport.rs)            │  READY/CS handshake,
//! │   begin/end transaction, send, wait_response   │  bus lock, timeouts
//! ├───────────────────────────────────────────────┤
//! │   frame.rs (codec)        command.rs (table)   │  pure, no I/O
//! ├───────────────────────┬───────────────────────┤
//! │  Bus (bus.rs)         │  Platform             │  capability traits
//! │  HalBus / Simulated   │  Std / Simulated      │
//! └───────────────────────┴───────────────────────┘
//! ```
//!
//! The crate is single-threaded: one [`Radio`] owns the bus and
//! every exchange runs to completion before the next begins.

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod platform;
pub mod radio;
pub mod simulator;
pub mod transport;

pub use bus::{Bus, HalBus, Line};
pub use command::{opcode, ConnectionMode, LengthWidth};
pub use config::LinkConfig;
pub use error::{FrameError, JoinError, LinkError};
pub use frame::{Command, ResponseLengths};
pub use platform::{Platform, StdPlatform};
pub use radio::{
    AddressInfo, AuthMode, ConnectionStatus, NetworkInfo, PowerManagement, Radio, ScannedNetwork,
};
pub use transport::Transport;
