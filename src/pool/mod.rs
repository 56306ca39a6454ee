//! # Worker Pool Module
//!
//! Keeps the live set of workers in line with a target concurrency that can
//! change at any moment.
//!
//! ## Architecture
//!
//! ```text
//! PoolHandle ──PoolCommand──► WorkerPool (driver task)
//!                                 │  reconcile(slots, target)
//!                                 │  watch<SlotState> per slot
//!                                 ▼
//!                              Worker × N ──WorkerSignal──► driver
//!                                 │
//!                                 └── StatsBoard (one entry per slot)
//!
//! driver + workers ──PoolEvent──► broadcast subscribers (UI)
//! ```
//!
//! Lowering the target never aborts a request: stopping slots finish their
//! in-flight attempt, then retire and are removed. A slot that signals run
//! completion leaves the live slot list too, but keeps its share of the
//! target, so it is neither replaced nor stopped. The run ends when no live
//! slot is left after at least one completion, or when the target is zero and
//! no slots remain.

pub mod slot;

pub use slot::{reconcile, running_count, Reconciliation, SlotId, SlotIdAllocator, SlotState, WorkerSlot};

use crate::metrics::{StatsBoard, WorkerStats};
use crate::stream::Interpreter;
use crate::worker::{Backoff, Worker, WorkerContext, WorkerSignal};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the pool event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors returned by the pool control surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The driver has already finished; the command was not delivered.
    #[error("Worker pool is no longer running")]
    Closed,
}

/// Settings shared by every worker of a run.
#[derive(Clone)]
pub struct PoolSettings {
    pub interpreter: Interpreter,
    pub backoff: Backoff,
    /// Byte-rate sampler ring size
    pub samples: usize,
    /// `None` runs exactly one completed attempt per slot
    pub run_duration: Option<Duration>,
}

impl PoolSettings {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            backoff: Backoff::default(),
            samples: 10,
            run_duration: None,
        }
    }
}

/// Control messages accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCommand {
    SetTarget(usize),
    /// Relative change, saturating at zero
    Adjust(i64),
}

/// Notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    TargetChanged {
        target: usize,
    },
    SlotSpawned(SlotId),
    SlotStopping(SlotId),
    SlotRevived(SlotId),
    /// New stats snapshot for one slot
    StatsUpdated {
        slot: SlotId,
        stats: WorkerStats,
    },
    AttemptCompleted {
        slot: SlotId,
        request_id: String,
        content: String,
        reasoning: String,
    },
    AttemptFailed {
        slot: SlotId,
        /// Error text annotated with the retry delay
        message: String,
        retry_in: Duration,
    },
    /// Run-completion pulse from one slot
    RunCompleted(SlotId),
    SlotRetired(SlotId),
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every slot signalled run completion
    Completed { completions: usize },
    /// Target driven to zero and every slot retired
    Drained,
    /// Cancelled from outside; workers were aborted
    Cancelled,
}

/// Point-in-time view of the slot set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub target: usize,
    pub running: usize,
    pub stopping: usize,
    pub completions: usize,
}

/// Cloneable control surface for a running pool.
#[derive(Clone)]
pub struct PoolHandle {
    commands: mpsc::UnboundedSender<PoolCommand>,
    events: broadcast::Sender<PoolEvent>,
    status: watch::Receiver<PoolStatus>,
    board: Arc<StatsBoard>,
}

impl PoolHandle {
    pub fn set_target_concurrency(&self, target: usize) -> Result<(), PoolError> {
        self.send(PoolCommand::SetTarget(target))
    }

    pub fn adjust_target(&self, delta: i64) -> Result<(), PoolError> {
        self.send(PoolCommand::Adjust(delta))
    }

    pub fn increment(&self) -> Result<(), PoolError> {
        self.adjust_target(1)
    }

    pub fn decrement(&self) -> Result<(), PoolError> {
        self.adjust_target(-1)
    }

    /// Subscribe to pool events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.borrow()
    }

    pub fn board(&self) -> &Arc<StatsBoard> {
        &self.board
    }

    fn send(&self, command: PoolCommand) -> Result<(), PoolError> {
        self.commands.send(command).map_err(|_| PoolError::Closed)
    }
}

/// Driver owning the slot list and every worker task.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    commands: mpsc::UnboundedReceiver<PoolCommand>,
    signals_tx: mpsc::UnboundedSender<WorkerSignal>,
    signals: mpsc::UnboundedReceiver<WorkerSignal>,
    status: watch::Sender<PoolStatus>,
    /// Live slots only; completed slots are counted by `completions`
    slots: Vec<WorkerSlot>,
    states: HashMap<SlotId, watch::Sender<SlotState>>,
    tasks: HashMap<SlotId, JoinHandle<()>>,
    ids: SlotIdAllocator,
    target: usize,
    completions: usize,
}

impl WorkerPool {
    /// Build a pool and its control handle. The run clock starts now.
    pub fn new(settings: PoolSettings, initial_target: usize) -> (Self, PoolHandle) {
        let started = Instant::now();
        let board = Arc::new(StatsBoard::new(started));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(PoolStatus {
            target: initial_target,
            ..PoolStatus::default()
        });

        let ctx = Arc::new(WorkerContext {
            interpreter: settings.interpreter,
            backoff: settings.backoff,
            samples: settings.samples,
            run_duration: settings.run_duration,
            run_started: started,
            board: Arc::clone(&board),
            events: events.clone(),
        });

        let handle = PoolHandle {
            commands: commands_tx,
            events,
            status: status_rx,
            board,
        };

        let pool = Self {
            ctx,
            commands,
            signals_tx,
            signals,
            status,
            slots: Vec::new(),
            states: HashMap::new(),
            tasks: HashMap::new(),
            ids: SlotIdAllocator::new(),
            target: initial_target,
            completions: 0,
        };

        (pool, handle)
    }

    /// Drive the pool until the run ends or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> RunOutcome {
        info!(
            target_concurrency = self.target,
            model = self.ctx.interpreter.model(),
            "Worker pool starting"
        );
        self.apply_target();

        let outcome = loop {
            if let Some(outcome) = self.finished() {
                break outcome;
            }

            tokio::select! {
                _ = cancel.cancelled() => break RunOutcome::Cancelled,
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(signal) = self.signals.recv() => self.handle_signal(signal),
            }
        };

        self.shutdown();
        info!(?outcome, completions = self.completions, "Worker pool finished");
        outcome
    }

    fn handle_command(&mut self, command: PoolCommand) {
        let target = match command {
            PoolCommand::SetTarget(target) => target,
            PoolCommand::Adjust(delta) => {
                let magnitude = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
                if delta >= 0 {
                    self.target.saturating_add(magnitude)
                } else {
                    self.target.saturating_sub(magnitude)
                }
            }
        };

        if target != self.target {
            info!(from = self.target, to = target, "Target concurrency changed");
            self.target = target;
            let _ = self.ctx.events.send(PoolEvent::TargetChanged { target });
        }
        self.apply_target();
    }

    fn handle_signal(&mut self, signal: WorkerSignal) {
        match signal {
            WorkerSignal::Retired(id) => {
                self.slots.retain(|s| s.id != id);
                self.states.remove(&id);
                self.tasks.remove(&id);
                self.ctx.board.remove(id);
                debug!(slot = id, "Slot retired");
                let _ = self.ctx.events.send(PoolEvent::SlotRetired(id));
                // a revival may have raced with this retirement
                self.apply_target();
            }
            WorkerSignal::RunCompleted(id) => {
                self.completions += 1;
                self.slots.retain(|s| s.id != id);
                self.states.remove(&id);
                self.tasks.remove(&id);
                debug!(slot = id, completions = self.completions, "Slot completed run");
                let _ = self.ctx.events.send(PoolEvent::RunCompleted(id));
                self.publish_status();
            }
        }
    }

    /// Reconcile the slot list against the current target and act on the result.
    fn apply_target(&mut self) {
        // completed slots still hold their share of the target
        let live_target = self.target.saturating_sub(self.completions);
        let result = reconcile(&self.slots, live_target, &mut self.ids);
        self.slots = result.slots;

        for id in result.stopping {
            self.set_slot_state(id, SlotState::Stopping);
            debug!(slot = id, "Slot stopping");
            let _ = self.ctx.events.send(PoolEvent::SlotStopping(id));
        }
        for id in result.revived {
            self.set_slot_state(id, SlotState::Running);
            debug!(slot = id, "Slot revived");
            let _ = self.ctx.events.send(PoolEvent::SlotRevived(id));
        }
        for id in result.spawned {
            self.spawn_worker(id);
        }

        self.publish_status();
    }

    fn set_slot_state(&self, id: SlotId, state: SlotState) {
        if let Some(sender) = self.states.get(&id) {
            sender.send_replace(state);
        }
    }

    fn spawn_worker(&mut self, id: SlotId) {
        let (state_tx, state_rx) = watch::channel(SlotState::Running);
        let worker = Worker::new(id, state_rx, Arc::clone(&self.ctx), self.signals_tx.clone());
        self.states.insert(id, state_tx);
        self.tasks.insert(id, tokio::spawn(worker.run()));
        debug!(slot = id, "Slot spawned");
        let _ = self.ctx.events.send(PoolEvent::SlotSpawned(id));
    }

    fn finished(&self) -> Option<RunOutcome> {
        if self.completions > 0 && self.slots.is_empty() {
            return Some(RunOutcome::Completed {
                completions: self.completions,
            });
        }
        if self.target == 0 && self.slots.is_empty() {
            return Some(RunOutcome::Drained);
        }
        None
    }

    fn publish_status(&self) {
        let running = running_count(&self.slots);
        let status = PoolStatus {
            target: self.target,
            running,
            stopping: self.slots.len() - running,
            completions: self.completions,
        };
        metrics::gauge!("loadllm_workers_running").set(running as f64);
        metrics::gauge!("loadllm_target_concurrency").set(self.target as f64);
        self.status.send_replace(status);
    }

    /// Abort whatever is still running. Normal outcomes leave no live tasks.
    fn shutdown(&mut self) {
        for (id, task) in self.tasks.drain() {
            if !task.is_finished() {
                debug!(slot = id, "Aborting worker");
                task.abort();
            }
        }
        self.states.clear();
    }
}
