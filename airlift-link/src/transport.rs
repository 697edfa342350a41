//! Transaction executor.
//!
//! Every command costs two bus transactions: one to write the request and
//! one to read the reply.  Each transaction follows the same handshake with
//! the co-processor:
//!
//! ```text
//!   wait READY low (caller timeout)      co-processor idle
//!   lock bus, configure SPI
//!   CS low
//!   wait READY high (ack timeout)        co-processor saw CS
//!   ... transfer bytes ...
//!   CS high, unlock                      end_transaction
//! ```
//!
//! The bus is released on every exit path, including errors.  A torn-down
//! bus is not an error: the exchange simply yields zero responses.

use log::{debug, trace};

use crate::bus::{Bus, Line};
use crate::command::opcode_name;
use crate::config::LinkConfig;
use crate::error::{FrameError, LinkError};
use crate::frame::{decode_response, ByteSource, Command, ResponseLengths};
use crate::platform::Platform;

pub struct Transport<B, P> {
    bus: B,
    platform: P,
    config: LinkConfig,
}

impl<B: Bus, P: Platform> Transport<B, P> {
    pub fn new(bus: B, platform: P, config: LinkConfig) -> Self {
        Self {
            bus,
            platform,
            config,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Release chip select and the bus lock if held.
    pub fn end_transaction(&mut self) {
        if self.bus.has_lock() {
            self.bus.gpio_write(Line::ChipSelect, true);
            self.bus.unlock();
        }
    }

    /// Spin until READY reads `high`, yielding each round.  On timeout or
    /// interrupt the transaction is ended before the error is returned.
    fn wait_for_ready(&mut self, high: bool, timeout_ms: u32) -> Result<(), LinkError> {
        let start = self.platform.now_ms();
        while self.platform.now_ms().saturating_sub(start) < timeout_ms as u64 {
            if self.bus.gpio_read(Line::Ready) == high {
                return Ok(());
            }
            self.platform.run_background_tasks();
            if self.platform.is_interrupted() {
                break;
            }
        }
        self.end_transaction();
        Err(LinkError::ReadyTimeout { high })
    }

    /// Wait for the co-processor to go idle, then take the bus and assert CS.
    ///
    /// Returns `Ok(false)` without touching anything when the bus has been
    /// torn down.
    pub fn begin_transaction(&mut self, timeout_ms: u32) -> Result<bool, LinkError> {
        if self.bus.deinited() {
            return Ok(false);
        }
        self.wait_for_ready(false, timeout_ms)?;

        while !self.bus.try_lock() {
            self.platform.run_background_tasks();
            if self.platform.is_interrupted() {
                return Err(LinkError::Interrupted);
            }
        }
        let c = &self.config;
        let (baud, pol, pha, bits) = (c.baudrate, c.polarity, c.phase, c.bits);
        self.bus.configure(baud, pol, pha, bits);

        self.bus.gpio_write(Line::ChipSelect, false);
        let ack = self.config.ack_timeout_ms;
        self.wait_for_ready(true, ack)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Command / response
    // -----------------------------------------------------------------------

    /// Write one request frame.  Always waits the default link timeout for
    /// the co-processor to go idle.  Returns `Ok(false)` on a torn-down bus.
    pub fn send_command(&mut self, cmd: &Command<'_>) -> Result<bool, LinkError> {
        let bytes = cmd.encode()?;
        let timeout = self.config.default_timeout_ms;
        if !self.begin_transaction(timeout)? {
            return Ok(false);
        }
        debug!(
            "[link] → {} ({:#04x}) params={:?}",
            opcode_name(cmd.opcode()),
            cmd.opcode(),
            cmd.params().iter().map(|p| p.len()).collect::<Vec<_>>()
        );
        let written = self.bus.write(&bytes);
        self.end_transaction();
        if !written {
            return Err(LinkError::WriteFailed);
        }
        Ok(true)
    }

    /// Read the reply to `opcode` into `slots`, waiting up to `timeout_ms`
    /// for the co-processor to finish processing.
    pub fn wait_response(
        &mut self,
        opcode: u8,
        slots: &mut [&mut [u8]],
        timeout_ms: u32,
    ) -> Result<ResponseLengths, LinkError> {
        if !self.begin_transaction(timeout_ms)? {
            return Ok(ResponseLengths::new());
        }
        let attempts = self.config.start_byte_attempts;
        let result = decode_response(&mut BusSource { transport: self }, opcode, slots, attempts);
        self.end_transaction();

        let lengths = result?;
        trace!(
            "[link] ← {} responses={:?}",
            opcode_name(opcode),
            lengths.as_slice()
        );
        Ok(lengths)
    }

    /// Send `cmd` and collect its reply.
    pub fn call(
        &mut self,
        cmd: &Command<'_>,
        slots: &mut [&mut [u8]],
        timeout_ms: u32,
    ) -> Result<ResponseLengths, LinkError> {
        if !self.send_command(cmd)? {
            return Ok(ResponseLengths::new());
        }
        self.wait_response(cmd.opcode(), slots, timeout_ms)
    }
}

/// Reply bytes pulled straight off the bus.
struct BusSource<'t, B, P> {
    transport: &'t mut Transport<B, P>,
}

impl<B: Bus, P: Platform> ByteSource for BusSource<'_, B, P> {
    fn read_byte(&mut self) -> Result<u8, FrameError> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        if buf.is_empty() || self.transport.bus.read(buf, 0xFF) {
            Ok(())
        } else {
            Err(FrameError::ReadFailed)
        }
    }

    fn retry_pause(&mut self) {
        let ms = self.transport.config.start_byte_retry_ms;
        self.transport.platform.delay_ms(ms);
    }
}
