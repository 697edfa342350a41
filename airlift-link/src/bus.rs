//! Physical link capability.
//!
//! The executor never touches hardware directly; it drives a [`Bus`]: a
//! lockable SPI byte pipe plus the handful of GPIO lines the co-processor
//! handshake needs.  [`HalBus`] implements it over `embedded-hal` 1.0
//! drivers; the simulator implements it in memory.
//!
//! ```text
//!   host                          co-processor
//!   ----                          ------------
//!   CS    ─────────────────────▶  chip select (active low)
//!   SCK/MOSI/MISO ◀────────────▶  SPI mode 0, 8 MHz
//!   READY ◀─────────────────────  low = idle, high = acknowledged
//!   RESET ─────────────────────▶  active low
//!   GPIO0 ─────────────────────▶  boot mode strap
//! ```

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use log::warn;

/// GPIO lines used by the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    ChipSelect,
    Ready,
    Reset,
    Gpio0,
}

/// A lockable SPI bus with its control lines.
///
/// Read/write failures are reported as `false`; the executor turns them into
/// typed errors.
pub trait Bus {
    /// The bus has been torn down and can no longer carry traffic.
    fn deinited(&self) -> bool {
        false
    }

    /// Take exclusive ownership without blocking.
    fn try_lock(&mut self) -> bool;
    fn unlock(&mut self);
    fn has_lock(&self) -> bool;

    /// Set clock rate and mode. Only valid while locked.
    fn configure(&mut self, baudrate: u32, polarity: u8, phase: u8, bits: u8) -> bool;

    /// Fill `buf` from the bus, clocking out `fill` for every byte.
    fn read(&mut self, buf: &mut [u8], fill: u8) -> bool;
    fn write(&mut self, bytes: &[u8]) -> bool;

    fn write_byte(&mut self, byte: u8) -> bool {
        self.write(&[byte])
    }

    fn gpio_read(&mut self, line: Line) -> bool;
    fn gpio_write(&mut self, line: Line, high: bool);
}

// ---------------------------------------------------------------------------
// embedded-hal adapter
// ---------------------------------------------------------------------------

/// [`Bus`] over an exclusively owned `embedded-hal` SPI bus and pins.
///
/// Chip select is driven manually, so the SPI side must be a raw
/// [`SpiBus`], not an `SpiDevice`.  Clock configuration is fixed by the HAL
/// at construction time; [`Bus::configure`] only records the request.
/// GPIO0 is not wired through this adapter.
pub struct HalBus<SPI, CS, RDY, RST> {
    spi: SPI,
    cs: CS,
    ready: RDY,
    reset: RST,
    locked: bool,
    deinited: bool,
    baudrate: u32,
}

impl<SPI, CS, RDY, RST> HalBus<SPI, CS, RDY, RST>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    RDY: InputPin,
    RST: OutputPin,
{
    pub fn new(spi: SPI, cs: CS, ready: RDY, reset: RST) -> Self {
        Self {
            spi,
            cs,
            ready,
            reset,
            locked: false,
            deinited: false,
            baudrate: 0,
        }
    }

    /// Last clock rate requested through [`Bus::configure`].
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Stop carrying traffic. Subsequent transactions report no responses.
    pub fn deinit(&mut self) {
        self.deinited = true;
    }

    /// Give the drivers back.
    pub fn release(self) -> (SPI, CS, RDY, RST) {
        (self.spi, self.cs, self.ready, self.reset)
    }
}

impl<SPI, CS, RDY, RST> Bus for HalBus<SPI, CS, RDY, RST>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    RDY: InputPin,
    RST: OutputPin,
{
    fn deinited(&self) -> bool {
        self.deinited
    }

    fn try_lock(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    fn unlock(&mut self) {
        self.locked = false;
    }

    fn has_lock(&self) -> bool {
        self.locked
    }

    fn configure(&mut self, baudrate: u32, _polarity: u8, _phase: u8, _bits: u8) -> bool {
        self.baudrate = baudrate;
        true
    }

    fn read(&mut self, buf: &mut [u8], fill: u8) -> bool {
        buf.fill(fill);
        let ok = self.spi.transfer_in_place(buf).is_ok() && self.spi.flush().is_ok();
        if !ok {
            warn!("[link] SPI read of {} bytes failed", buf.len());
        }
        ok
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        let ok = self.spi.write(bytes).is_ok() && self.spi.flush().is_ok();
        if !ok {
            warn!("[link] SPI write of {} bytes failed", bytes.len());
        }
        ok
    }

    fn gpio_read(&mut self, line: Line) -> bool {
        match line {
            Line::Ready => self.ready.is_high().unwrap_or_else(|_| {
                warn!("[link] ready pin read failed");
                false
            }),
            // Output lines read back as idle.
            _ => false,
        }
    }

    fn gpio_write(&mut self, line: Line, high: bool) {
        let result = match (line, high) {
            (Line::ChipSelect, true) => self.cs.set_high().is_ok(),
            (Line::ChipSelect, false) => self.cs.set_low().is_ok(),
            (Line::Reset, true) => self.reset.set_high().is_ok(),
            (Line::Reset, false) => self.reset.set_low().is_ok(),
            (Line::Ready, _) | (Line::Gpio0, _) => true,
        };
        if !result {
            warn!("[link] failed to drive {:?} {}", line, if high { "high" } else { "low" });
        }
    }
}
