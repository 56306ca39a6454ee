//! # Worker Module
//!
//! The retrying request loop behind one pool slot.
//!
//! ## Attempt cycle
//!
//! ```text
//! begin attempt ──► interpret stream ──► done ──► Stopping? ──► retire
//!      ▲                    │                        │
//!      │                  error                  duration left? ──no──► run completed
//!      │                    │                        │
//!      │                 backoff ◄───────────────────┘ yes
//!      └────────────────────┘
//! ```
//!
//! The worker reads its [`SlotState`] only between attempts, so an in-flight
//! attempt always runs to completion. A backoff wait is not an attempt and is
//! cut short when the slot is told to stop.

pub mod backoff;
pub mod rates;
pub mod sampler;

pub use backoff::Backoff;
pub use rates::{derive_rates, first_output_time, DerivedRates};
pub use sampler::{ByteRateSampler, MAX_SAMPLES};

use crate::client::{TransportError, Usage};
use crate::metrics::{StatsBoard, WorkerStats};
use crate::pool::{PoolEvent, SlotId, SlotState};
use crate::stream::{Interpreter, StreamEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Everything a worker shares with its pool.
pub struct WorkerContext {
    pub interpreter: Interpreter,
    pub backoff: Backoff,
    /// Byte-rate sampler ring size
    pub samples: usize,
    /// Run-wide duration; `None` means one completed attempt per slot
    pub run_duration: Option<Duration>,
    pub run_started: Instant,
    pub board: Arc<StatsBoard>,
    pub events: broadcast::Sender<PoolEvent>,
}

/// Lifecycle notifications sent from a worker to the pool driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// The slot was stopping and has finished its last attempt
    Retired(SlotId),
    /// The run duration is over (or unset) for this slot
    RunCompleted(SlotId),
}

/// Per-attempt state, discarded when the attempt concludes.
#[derive(Debug)]
struct AttemptState {
    request_id: String,
    started: Instant,
    time_to_first_token: Option<Duration>,
    time_to_first_reasoning_token: Option<Duration>,
    content: String,
    reasoning: String,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            request_id: crate::logging::generate_request_id(),
            started: Instant::now(),
            time_to_first_token: None,
            time_to_first_reasoning_token: None,
            content: String::new(),
            reasoning: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    Retire,
    Finish,
    Continue,
}

/// One slot's attempt loop.
pub struct Worker {
    slot: SlotId,
    state: watch::Receiver<SlotState>,
    ctx: Arc<WorkerContext>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    consecutive_errors: u32,
}

impl Worker {
    pub fn new(
        slot: SlotId,
        state: watch::Receiver<SlotState>,
        ctx: Arc<WorkerContext>,
        signals: mpsc::UnboundedSender<WorkerSignal>,
    ) -> Self {
        Self {
            slot,
            state,
            ctx,
            signals,
            consecutive_errors: 0,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Loop attempts until the slot retires or the run completes.
    pub async fn run(mut self) {
        debug!(slot = self.slot, "Worker started");

        loop {
            let retry_in = match self.run_attempt().await {
                Ok(()) => Duration::ZERO,
                Err(e) => self.record_failure(e),
            };

            let mut step = self.next_step();
            if step == NextStep::Continue && !retry_in.is_zero() {
                self.wait_backoff(retry_in).await;
                step = self.next_step();
            }

            match step {
                NextStep::Continue => continue,
                NextStep::Retire => {
                    debug!(slot = self.slot, "Worker retiring");
                    let _ = self.signals.send(WorkerSignal::Retired(self.slot));
                    return;
                }
                NextStep::Finish => {
                    debug!(slot = self.slot, "Worker finished run");
                    let _ = self.signals.send(WorkerSignal::RunCompleted(self.slot));
                    return;
                }
            }
        }
    }

    /// Run one attempt to its end. The sampler ticker lives exactly as long
    /// as this call.
    async fn run_attempt(&mut self) -> Result<(), TransportError> {
        let mut attempt = AttemptState::new();
        self.publish(WorkerStats::begin_attempt);

        let mut sampler = ByteRateSampler::new(self.ctx.samples);
        let period = sampler.period();
        let mut ticker = tokio::time::interval_at(attempt.started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut events = self
            .ctx
            .interpreter
            .interpret(&attempt.request_id, attempt.started);

        let result = loop {
            tokio::select! {
                next = events.next() => match next {
                    Some(Ok(StreamEvent::Done)) => break Ok(()),
                    Some(Ok(event)) => self.apply_event(event, &mut attempt, &mut sampler),
                    Some(Err(e)) => break Err(e),
                    None => {
                        break Err(TransportError::InvalidResponse(
                            "stream ended without completion".to_string(),
                        ))
                    }
                },
                _ = ticker.tick() => {
                    if let Some(rate) = sampler.tick() {
                        self.publish(|s| s.instantaneous_byte_rate = Some(rate));
                    }
                }
            }
        };

        match &result {
            Ok(()) => {
                self.consecutive_errors = 0;
                self.ctx.board.record_completion();
                self.publish(|s| {
                    s.is_done = true;
                    s.instantaneous_byte_rate = None;
                    s.consecutive_errors = 0;
                    s.last_error = None;
                });
                debug!(
                    slot = self.slot,
                    request_id = %attempt.request_id,
                    content_bytes = attempt.content.len(),
                    reasoning_bytes = attempt.reasoning.len(),
                    "Attempt completed"
                );
                let _ = self.ctx.events.send(PoolEvent::AttemptCompleted {
                    slot: self.slot,
                    request_id: attempt.request_id,
                    content: attempt.content,
                    reasoning: attempt.reasoning,
                });
            }
            Err(_) => {
                self.publish(|s| s.instantaneous_byte_rate = None);
            }
        }

        result
    }

    fn apply_event(
        &self,
        event: StreamEvent,
        attempt: &mut AttemptState,
        sampler: &mut ByteRateSampler,
    ) {
        sampler.record(event.byte_len());
        match event {
            StreamEvent::FirstToken(elapsed) => {
                if attempt.time_to_first_token.is_none() {
                    attempt.time_to_first_token = Some(elapsed);
                    self.publish(|s| s.time_to_first_token = Some(elapsed));
                }
            }
            StreamEvent::FirstReasoningToken(elapsed) => {
                if attempt.time_to_first_reasoning_token.is_none() {
                    attempt.time_to_first_reasoning_token = Some(elapsed);
                    self.publish(|s| s.time_to_first_reasoning_token = Some(elapsed));
                }
            }
            StreamEvent::Content { text, .. } => attempt.content.push_str(&text),
            StreamEvent::Reasoning { text, .. } => attempt.reasoning.push_str(&text),
            StreamEvent::Usage(usage) => self.apply_usage(&usage, attempt),
            StreamEvent::Done => {}
        }
    }

    fn apply_usage(&self, usage: &Usage, attempt: &AttemptState) {
        let rates = derive_rates(
            attempt.time_to_first_token,
            attempt.time_to_first_reasoning_token,
            attempt.started.elapsed(),
            usage,
        );
        self.ctx.board.record_usage(usage);

        let ttft = attempt.time_to_first_token;
        let ttfr = attempt.time_to_first_reasoning_token;
        self.publish(|s| {
            s.prompt_tokens = Some(usage.prompt_tokens);
            s.completion_tokens = Some(usage.completion_tokens);
            s.prefill_tokens_per_second = rates.prefill_tokens_per_second;
            s.decode_tokens_per_second = rates.decode_tokens_per_second;
            s.time_to_first_token = ttft;
            s.time_to_first_reasoning_token = ttfr;
        });
    }

    /// Count the failure and return the delay before the next attempt.
    fn record_failure(&mut self, error: TransportError) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let retry_in = self.ctx.backoff.delay_for(self.consecutive_errors);
        let message = format!(
            "{} (retrying in {}s)",
            error,
            retry_in.as_secs_f64().round() as u64
        );

        warn!(
            slot = self.slot,
            consecutive_errors = self.consecutive_errors,
            retry_in_ms = retry_in.as_millis() as u64,
            error = %error,
            "Attempt failed"
        );

        self.ctx.board.record_failure();
        let consecutive_errors = self.consecutive_errors;
        let last_error = message.clone();
        self.publish(move |s| {
            s.consecutive_errors = consecutive_errors;
            s.last_error = Some(last_error);
        });
        let _ = self.ctx.events.send(PoolEvent::AttemptFailed {
            slot: self.slot,
            message,
            retry_in,
        });

        retry_in
    }

    fn next_step(&self) -> NextStep {
        if *self.state.borrow() == SlotState::Stopping {
            return NextStep::Retire;
        }
        match self.ctx.run_duration {
            Some(duration) if self.ctx.run_started.elapsed() <= duration => NextStep::Continue,
            _ => NextStep::Finish,
        }
    }

    /// Sleep for `delay`, returning early if the slot is told to stop.
    async fn wait_backoff(&mut self, delay: Duration) {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            if *self.state.borrow_and_update() == SlotState::Stopping {
                return;
            }
            tokio::select! {
                _ = &mut sleep => return,
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Update this slot's stats entry and broadcast the new snapshot.
    fn publish<F>(&self, f: F)
    where
        F: FnOnce(&mut WorkerStats),
    {
        let stats = self.ctx.board.update(self.slot, f);
        let _ = self.ctx.events.send(PoolEvent::StatsUpdated {
            slot: self.slot,
            stats,
        });
    }
}
