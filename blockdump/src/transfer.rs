//! Block transfer engine.
//!
//! Drives a [`LinkChannel`] through the block protocol for a fixed number of
//! blocks and writes every completed block to an output sink.
//!
//! ## Per-block cycle
//!
//! ```text
//!            +-------------+
//!     +----->| Requesting  |  send "printblock:<n>\n"
//!     |      +------+------+
//!     |             v
//!     |      +-------------+  poll pending bytes, append, test predicate
//!     |      | Accumulating|------------------------------+
//!     |      +------+------+                              |
//!     |   deadline  |                          > threshold|
//!     |             v                                     v
//!     |      +-------------+                       +-------------+
//!     +------|  TimedOut   |                       |  Completed  |--> next block / Done
//!   retry    +------+------+                       +-------------+
//!                   | failure budget exhausted
//!                   v
//!               Aborted
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockdump::{BlockTransfer, NativePort, SerialConfig, TransferConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let sink = std::fs::File::create("output.txt")?;
//!
//!     let mut transfer = BlockTransfer::new(link, sink, TransferConfig::default());
//!     let summary = transfer.run_with(|event| println!("{event:?}"))?;
//!     println!("{} blocks, {} bytes", summary.blocks, summary.bytes_written);
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::port::LinkChannel;
use crate::protocol::block::{
    NEWLINE_THRESHOLD, count_newlines, exceeds_newline_threshold, request_command,
    strip_trailing_cr,
};
use log::{debug, error, info, trace, warn};
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

/// Number of blocks held by the device.
pub const DEFAULT_TOTAL_BLOCKS: u32 = 15625;

/// Time allowed for one attempt to complete.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive timed-out attempts that abort the transfer.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Sleep between polls while no input is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Transfer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferConfig {
    /// Number of blocks to retrieve, starting at index 0.
    pub total_blocks: u32,
    /// A response completes once it holds more newlines than this.
    pub newline_threshold: usize,
    /// Deadline of one request/accumulate cycle.
    pub attempt_timeout: Duration,
    /// Consecutive timeouts tolerated before aborting.
    pub max_consecutive_failures: u32,
    /// Sleep between polls of an idle link.
    pub poll_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            newline_threshold: NEWLINE_THRESHOLD,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TransferConfig {
    /// Set the number of blocks to retrieve.
    #[must_use]
    pub fn with_total_blocks(mut self, total_blocks: u32) -> Self {
        self.total_blocks = total_blocks;
        self
    }

    /// Set the per-attempt deadline.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the consecutive failure budget.
    #[must_use]
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the parameters before starting a transfer.
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_failures == 0 {
            return Err(Error::Config(
                "max consecutive failures must be at least 1".into(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::Config("attempt timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Progress notification emitted by [`BlockTransfer::run_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A request for `block` is about to be sent.
    Requesting {
        /// Block index.
        block: u32,
        /// 1-based attempt number for this block.
        attempt: u32,
    },
    /// `block` completed and was written to the sink.
    Completed {
        /// Block index.
        block: u32,
        /// Payload size after stripping.
        bytes: usize,
    },
    /// An attempt for `block` hit its deadline.
    Incomplete {
        /// Block index.
        block: u32,
        /// Bytes accumulated before the deadline.
        received: usize,
        /// Consecutive failures including this one.
        failures: u32,
    },
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Not started.
    Ready,
    /// Requesting and accumulating blocks.
    Running,
    /// Every block was transferred.
    Done,
    /// The failure budget ran out for one block.
    Aborted,
    /// A link or sink fault stopped the transfer.
    Failed,
}

/// Statistics of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferSummary {
    /// Blocks written to the sink.
    pub blocks: u32,
    /// Payload bytes written to the sink.
    pub bytes_written: u64,
    /// Timed-out attempts that were retried.
    pub retries: u32,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Bytes accumulated by one attempt.
///
/// Append-only; the newline count only grows, so once the completion
/// predicate holds it keeps holding.
#[derive(Debug)]
pub struct AttemptBuffer {
    data: Vec<u8>,
    newlines: usize,
    started: Instant,
}

impl AttemptBuffer {
    /// Start a fresh attempt now.
    pub fn start() -> Self {
        Self {
            data: Vec::new(),
            newlines: 0,
            started: Instant::now(),
        }
    }

    /// Append a chunk read from the link.
    pub fn push(&mut self, chunk: &[u8]) {
        self.newlines += count_newlines(chunk);
        self.data
            .extend_from_slice(chunk);
    }

    /// Whether the accumulated response holds more than `threshold` newlines.
    pub fn is_complete(&self, threshold: usize) -> bool {
        exceeds_newline_threshold(self.newlines, threshold)
    }

    /// Newlines seen so far.
    pub fn newlines(&self) -> usize {
        self.newlines
    }

    /// Bytes seen so far.
    pub fn received(&self) -> usize {
        self.data
            .len()
    }

    /// Time since the attempt started.
    pub fn elapsed(&self) -> Duration {
        self.started
            .elapsed()
    }

    /// Finish the attempt, returning the payload without trailing CR bytes.
    pub fn into_block(mut self) -> Vec<u8> {
        let keep = strip_trailing_cr(&self.data).len();
        self.data
            .truncate(keep);
        self.data
    }
}

/// Result of a single attempt.
#[derive(Debug)]
enum AttemptOutcome {
    Complete(Vec<u8>),
    Incomplete { received: usize },
}

/// Block transfer engine.
///
/// Owns the link and the output sink for the whole run. Blocks are
/// requested strictly in order and each completed block is written before
/// the next request is sent.
pub struct BlockTransfer<L: LinkChannel, W: Write> {
    link: L,
    sink: W,
    config: TransferConfig,
    next_block: u32,
    consecutive_failures: u32,
    retries: u32,
    bytes_written: u64,
    phase: TransferPhase,
}

impl<L: LinkChannel, W: Write> BlockTransfer<L, W> {
    /// Create an engine over an open link and an output sink.
    pub fn new(link: L, sink: W, config: TransferConfig) -> Self {
        Self {
            link,
            sink,
            config,
            next_block: 0,
            consecutive_failures: 0,
            retries: 0,
            bytes_written: 0,
            phase: TransferPhase::Ready,
        }
    }

    /// Index of the next block to request (equals the blocks completed).
    pub fn next_block(&self) -> u32 {
        self.next_block
    }

    /// Consecutive timed-out attempts for the current block.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Get a reference to the link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Get a reference to the sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Consume the engine and return the link and the sink.
    pub fn into_parts(self) -> (L, W) {
        (self.link, self.sink)
    }

    /// Run the transfer to completion.
    pub fn run(&mut self) -> Result<TransferSummary> {
        self.run_with(|_| {})
    }

    /// Run the transfer, reporting every state transition to `observer`.
    ///
    /// Returns the summary once all blocks are written,
    /// [`Error::TransferAborted`] when one block times out too many times in
    /// a row, or the first link or sink fault.
    pub fn run_with<F>(&mut self, mut observer: F) -> Result<TransferSummary>
    where
        F: FnMut(&TransferEvent),
    {
        self.config
            .validate()?;

        let start = Instant::now();
        self.phase = TransferPhase::Running;
        info!(
            "Transferring blocks {}..{} from {}",
            self.next_block,
            self.config
                .total_blocks,
            self.link
                .name()
        );

        match self.transfer_blocks(&mut observer) {
            Ok(()) => {
                self.phase = TransferPhase::Done;
                let summary = TransferSummary {
                    blocks: self.next_block,
                    bytes_written: self.bytes_written,
                    retries: self.retries,
                    elapsed: start.elapsed(),
                };
                info!(
                    "Transfer complete: {} blocks, {} bytes, {} retries",
                    summary.blocks, summary.bytes_written, summary.retries
                );
                Ok(summary)
            },
            Err(e) => {
                self.phase = match e {
                    Error::TransferAborted { .. } => TransferPhase::Aborted,
                    _ => TransferPhase::Failed,
                };
                error!("{e}");
                // Keep whatever already reached the sink.
                if let Err(flush_err) = self
                    .sink
                    .flush()
                {
                    debug!("Flushing output after failure: {flush_err}");
                }
                Err(e)
            },
        }
    }

    fn transfer_blocks<F>(&mut self, observer: &mut F) -> Result<()>
    where
        F: FnMut(&TransferEvent),
    {
        while self.next_block
            < self
                .config
                .total_blocks
        {
            let block = self.next_block;
            observer(&TransferEvent::Requesting {
                block,
                attempt: self.consecutive_failures + 1,
            });

            match self.attempt(block)? {
                AttemptOutcome::Complete(payload) => {
                    self.sink
                        .write_all(&payload)
                        .map_err(Error::Sink)?;
                    self.bytes_written += payload.len() as u64;
                    self.consecutive_failures = 0;
                    self.next_block += 1;
                    debug!("Block {block} complete ({} bytes)", payload.len());
                    observer(&TransferEvent::Completed {
                        block,
                        bytes: payload.len(),
                    });
                },
                AttemptOutcome::Incomplete { received } => {
                    self.consecutive_failures += 1;
                    warn!(
                        "Block {block} incomplete ({received} bytes, failure {}/{})",
                        self.consecutive_failures,
                        self.config
                            .max_consecutive_failures
                    );
                    self.link
                        .discard_input_buffer()?;
                    observer(&TransferEvent::Incomplete {
                        block,
                        received,
                        failures: self.consecutive_failures,
                    });

                    if self.consecutive_failures
                        >= self
                            .config
                            .max_consecutive_failures
                    {
                        return Err(Error::TransferAborted {
                            block,
                            completed: self.next_block,
                            attempts: self.consecutive_failures,
                        });
                    }
                    self.retries += 1;
                },
            }
        }

        self.sink
            .flush()
            .map_err(Error::Sink)
    }

    /// One request/accumulate cycle for `block`.
    fn attempt(&mut self, block: u32) -> Result<AttemptOutcome> {
        debug!("Block {block}");
        self.link
            .send(&request_command(block))?;

        let mut state = AttemptBuffer::start();
        while state.elapsed()
            < self
                .config
                .attempt_timeout
        {
            let pending = self
                .link
                .pending_byte_count()?;
            if pending == 0 {
                thread::sleep(
                    self.config
                        .poll_interval,
                );
                continue;
            }

            let chunk = self
                .link
                .read_available(pending)?;
            state.push(&chunk);
            trace!(
                "Block {block}: +{} bytes, {} newlines",
                chunk.len(),
                state.newlines()
            );

            if state.is_complete(
                self.config
                    .newline_threshold,
            ) {
                return Ok(AttemptOutcome::Complete(state.into_block()));
            }
        }

        Ok(AttemptOutcome::Incomplete {
            received: state.received(),
        })
    }
}
