//! Time, scheduling and interrupt capability.
//!
//! The link layer busy-waits on GPIO lines and polls the co-processor.  All
//! of that waiting goes through [`Platform`] so the host environment can keep
//! servicing background work, surface a user interrupt (Ctrl-C), and so tests
//! can run against a virtual clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub trait Platform {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    fn delay_ms(&mut self, ms: u32);

    /// Cooperative yield point inside every wait loop.
    fn run_background_tasks(&mut self) {}

    /// A user interrupt is pending.
    fn is_interrupted(&self) -> bool {
        false
    }

    /// `false` once the hosting environment is shutting down.  Teardown
    /// failures are suppressed in that case.
    fn is_running(&self) -> bool {
        true
    }
}

/// [`Platform`] for hosted targets, backed by `std::time` and shared flags.
#[derive(Debug, Clone)]
pub struct StdPlatform {
    origin: Instant,
    interrupted: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl Default for StdPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl StdPlatform {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            interrupted: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag another thread can set to interrupt blocking waits.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Clear a consumed interrupt.
    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Mark the environment as shutting down.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Platform for StdPlatform {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn run_background_tasks(&mut self) {
        thread::yield_now();
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
