/// Link timing and bus parameters.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Timeout for ordinary command/response exchanges.
    pub default_timeout_ms: u32,
    /// How long the co-processor gets to acknowledge chip select.
    pub ack_timeout_ms: u32,
    /// SPI clock.
    pub baudrate: u32,
    pub polarity: u8,
    pub phase: u8,
    pub bits: u8,
    /// Reads spent looking for the start byte of a reply.
    pub start_byte_attempts: u8,
    /// Pause between start-byte reads.
    pub start_byte_retry_ms: u32,
    /// Width of the reset pulse.
    pub reset_pulse_ms: u32,
    /// Time the firmware needs after reset before it answers.
    pub boot_delay_ms: u32,
    /// Interval between connection-status polls while joining a network.
    pub connect_poll_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 1000,
            ack_timeout_ms: 1000,
            baudrate: 8_000_000,
            polarity: 0,
            phase: 0,
            bits: 8,
            start_byte_attempts: 10,
            start_byte_retry_ms: 10,
            reset_pulse_ms: 10,
            boot_delay_ms: 750,
            connect_poll_ms: 200,
        }
    }
}
