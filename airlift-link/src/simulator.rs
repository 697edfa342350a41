//! In-memory co-processor double for deterministic testing.
//!
//! [`SimulatedBus`] implements [`Bus`] with the same handshake the real
//! firmware performs: READY is low while idle, goes high once CS is
//! asserted, and stays high for a while after a request while the
//! co-processor "processes" it.  Requests are parsed when CS is released and
//! handed to a [`Responder`]; the encoded reply is served on the next read
//! transaction.
//!
//! | Fault            | Knob                                             |
//! |------------------|--------------------------------------------------|
//! | Processing delay | `busy_rate` / `max_busy_polls`, seeded jitter    |
//! | Lock contention  | `lock_contention` failed `try_lock` calls        |
//! | Stuck busy       | [`SimulatedBus::set_stuck_busy`]                 |
//! | Missing ack      | [`SimulatedBus::set_no_ack`]                     |
//! | Rejected command | [`Reply::Error`]                                 |
//! | Silence          | [`Reply::Silent`]                                |
//!
//! [`SimulatedPlatform`] is the matching virtual clock.

use std::collections::VecDeque;

use log::{trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bus::{Bus, Line};
use crate::frame::{decode_request, encode_error_reply, encode_reply, Request};
use crate::platform::Platform;

/// What the simulated co-processor answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Responses(Vec<Vec<u8>>),
    /// Reject with the error marker.
    Error,
    /// Never answer; the host sees idle fill bytes.
    Silent,
    /// Exact bytes, for malformed-reply tests.
    Raw(Vec<u8>),
}

impl Reply {
    /// Single one-byte response, the common status reply.
    pub fn byte(value: u8) -> Self {
        Reply::Responses(vec![vec![value]])
    }

    pub fn empty() -> Self {
        Reply::Responses(Vec::new())
    }
}

/// Co-processor behaviour behind the simulated wire.
pub trait Responder {
    fn respond(&mut self, request: &Request) -> Reply;
}

impl<F> Responder for F
where
    F: FnMut(&Request) -> Reply,
{
    fn respond(&mut self, request: &Request) -> Reply {
        self(request)
    }
}

/// Answers requests from a fixed queue, in order.  Silent once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    replies: VecDeque<Reply>,
}

impl ScriptedResponder {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
        }
    }

    pub fn push(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }
}

impl Responder for ScriptedResponder {
    fn respond(&mut self, _request: &Request) -> Reply {
        self.replies.pop_front().unwrap_or(Reply::Silent)
    }
}

/// Requests kept for inspection before the oldest are dropped.
pub const DEFAULT_HISTORY: usize = 1024;

/// Fault model.  All zero by default, i.e. an ideal co-processor.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a request keeps READY high for a while afterwards.
    pub busy_rate: f64,
    /// Upper bound on READY polls spent busy after a request.
    pub max_busy_polls: u32,
    /// Number of `try_lock` calls that fail before the lock is granted.
    pub lock_contention: u32,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            busy_rate: 0.0,
            max_busy_polls: 0,
            lock_contention: 0,
            seed: 0,
        }
    }
}

pub struct SimulatedBus<R> {
    responder: R,
    config: SimulatorConfig,
    rng: StdRng,

    locked: bool,
    deinited: bool,
    cs_low: bool,
    reset_low: bool,
    contention_left: u32,
    busy_polls: u32,
    stuck_busy: bool,
    no_ack: bool,

    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    requests: Vec<Request>,
    history: usize,
    resets: u32,
    transactions: u32,
    configured: Option<(u32, u8, u8, u8)>,
}

impl<R: Responder> SimulatedBus<R> {
    pub fn new(responder: R) -> Self {
        Self::with_config(responder, SimulatorConfig::default())
    }

    pub fn with_config(responder: R, config: SimulatorConfig) -> Self {
        Self {
            responder,
            rng: StdRng::seed_from_u64(config.seed),
            contention_left: config.lock_contention,
            config,
            locked: false,
            deinited: false,
            cs_low: false,
            reset_low: false,
            busy_polls: 0,
            stuck_busy: false,
            no_ack: false,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            requests: Vec::new(),
            history: DEFAULT_HISTORY,
            resets: 0,
            transactions: 0,
            configured: None,
        }
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    pub fn responder_mut(&mut self) -> &mut R {
        &mut self.responder
    }

    /// The most recent decoded requests, oldest first.
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.requests.iter().map(|r| r.opcode).collect()
    }

    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    /// Keep at most `limit` requests; zero disables recording.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history = limit;
        self.trim_history();
    }

    fn trim_history(&mut self) {
        if self.requests.len() > self.history {
            let excess = self.requests.len() - self.history;
            self.requests.drain(..excess);
        }
    }

    /// Completed CS-low/CS-high cycles.
    pub fn transactions(&self) -> u32 {
        self.transactions
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn cs_asserted(&self) -> bool {
        self.cs_low
    }

    pub fn configured(&self) -> Option<(u32, u8, u8, u8)> {
        self.configured
    }

    /// Keep READY high outside transactions, as a hung co-processor would.
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Never raise READY in response to CS.
    pub fn set_no_ack(&mut self, no_ack: bool) {
        self.no_ack = no_ack;
    }

    pub fn set_deinited(&mut self, deinited: bool) {
        self.deinited = deinited;
    }

    fn finish_transaction(&mut self) {
        self.transactions += 1;
        if self.inbox.is_empty() {
            // A read transaction consumes whatever reply was pending.
            self.outbox.clear();
            return;
        }

        let bytes = std::mem::take(&mut self.inbox);
        let reply = match decode_request(&bytes) {
            Ok(request) => {
                trace!("[sim] request {:#04x} with {} params", request.opcode, request.params.len());
                let reply = self.responder.respond(&request);
                let encoded = match reply {
                    Reply::Responses(responses) => encode_reply(request.opcode, &responses),
                    Reply::Error => encode_error_reply(),
                    Reply::Silent => Vec::new(),
                    Reply::Raw(raw) => raw,
                };
                if self.history > 0 {
                    self.requests.push(request);
                    self.trim_history();
                }
                encoded
            }
            Err(err) => {
                warn!("[sim] malformed request: {}", err);
                encode_error_reply()
            }
        };
        self.outbox = reply.into();

        if self.config.max_busy_polls > 0 && self.rng.random_bool(self.config.busy_rate) {
            self.busy_polls = self.rng.random_range(1..=self.config.max_busy_polls);
        }
    }
}

impl<R: Responder> Bus for SimulatedBus<R> {
    fn deinited(&self) -> bool {
        self.deinited
    }

    fn try_lock(&mut self) -> bool {
        if self.contention_left > 0 {
            self.contention_left -= 1;
            return false;
        }
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

    fn configure(&mut self, baudrate: u32, polarity: u8, phase: u8, bits: u8) -> bool {
        self.configured = Some((baudrate, polarity, phase, bits));
        self.locked
    }

    fn read(&mut self, buf: &mut [u8], _fill: u8) -> bool {
        if !self.locked || !self.cs_low {
            return false;
        }
        for byte in buf.iter_mut() {
            *byte = self.outbox.pop_front().unwrap_or(0xFF);
        }
        true
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if !self.locked || !self.cs_low {
            return false;
        }
        self.inbox.extend_from_slice(bytes);
        true
    }

    fn gpio_read(&mut self, line: Line) -> bool {
        match line {
            Line::Ready if self.cs_low => !self.no_ack,
            Line::Ready if self.stuck_busy => true,
            Line::Ready if self.busy_polls > 0 => {
                self.busy_polls -= 1;
                true
            }
            Line::ChipSelect => !self.cs_low,
            Line::Reset => !self.reset_low,
            _ => false,
        }
    }

    fn gpio_write(&mut self, line: Line, high: bool) {
        match line {
            Line::ChipSelect => {
                if !high && !self.cs_low {
                    self.cs_low = true;
                    self.inbox.clear();
                } else if high && self.cs_low {
                    self.cs_low = false;
                    self.finish_transaction();
                }
            }
            Line::Reset => {
                if !high && !self.reset_low {
                    self.resets += 1;
                    self.outbox.clear();
                    self.busy_polls = 0;
                }
                self.reset_low = !high;
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Virtual clock
// ---------------------------------------------------------------------------

/// [`Platform`] with a virtual millisecond clock.
///
/// Delays advance the clock instantly; every scheduler yield costs one
/// millisecond so spin loops terminate.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    now: u64,
    slept_ms: u64,
    yields: u64,
    interrupt_after: Option<u64>,
    interrupted: bool,
    running: bool,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            now: 0,
            slept_ms: 0,
            yields: 0,
            interrupt_after: None,
            interrupted: false,
            running: true,
        }
    }

    /// Total time spent in `delay_ms`.
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }

    pub fn yields(&self) -> u64 {
        self.yields
    }

    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }

    /// Raise an interrupt once `n` more yields have happened.
    pub fn interrupt_after_yields(&mut self, n: u64) {
        self.interrupt_after = Some(self.yields + n);
    }

    pub fn set_interrupted(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
        if !interrupted {
            self.interrupt_after = None;
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }
}

impl Platform for SimulatedPlatform {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += ms as u64;
        self.slept_ms += ms as u64;
    }

    fn run_background_tasks(&mut self) {
        self.now += 1;
        self.yields += 1;
        if self.interrupt_after.is_some_and(|at| self.yields >= at) {
            self.interrupted = true;
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
