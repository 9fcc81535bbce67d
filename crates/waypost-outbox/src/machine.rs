//! The drain state machine.
//!
//! [`DrainMachine`] holds every piece of controller state and decides what
//! happens next. It performs no I/O: each call to [`DrainMachine::handle`]
//! consumes one [`Input`] and returns the [`Effect`]s the controller task must
//! carry out. Results of those effects come back later as further inputs.
//!
//! # Drain loop
//!
//! ```text
//! Stopped ──start──▶ Reading ──empty──▶ Waiting ──wake──▶ Reading
//!                       │
//!                       ├──orphan──▶ Deleting ──ok──▶ Reading
//!                       ├──match───▶ Sending ──ok──▶ Deleting
//!                       └──error───▶ RetryPending ──timer/online──▶ Reading
//! ```
//!
//! Sending and Deleting also fall back to RetryPending on failure.
//!
//! # Invariants
//!
//! - At most one drain operation (read, send, delete) is outstanding.
//! - Drain effects carry the epoch they were issued in. `stop` bumps the
//!   epoch, so completions from before a stop never change state.
//! - Arrivals are persisted (or sent directly) one at a time, in order.

use crate::report::StatusEvent;
use std::collections::VecDeque;
use waypost_database::{LocationFix, StoredFix};

/// Where the drain loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Not started, or stopped.
    Stopped,
    /// Queue found empty; dormant until woken.
    Waiting,
    /// Oldest record requested.
    Reading,
    /// Record `id` handed to the transport.
    Sending { id: i64 },
    /// Record `id` being removed from the queue.
    Deleting { id: i64 },
    /// A drain step failed; waiting for the retry timer or reachability.
    RetryPending,
}

/// Settings the machine needs from the controller configuration.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Persist fixes before sending them.
    pub buffer: bool,
    /// Queued records with a different origin tag are orphans.
    pub device_id: String,
    /// Dispatch a side-channel copy of each persisted fix.
    pub side_channel: bool,
}

/// Outcome of an operation, with the error already rendered for reporting.
pub type OpResult<T> = Result<T, String>;

/// Everything the machine reacts to.
#[derive(Debug, Clone)]
pub enum Input {
    Start { reachable: bool },
    Stop,
    FixArrived(LocationFix),
    Persisted(OpResult<i64>),
    DirectSent {
        fix: LocationFix,
        result: OpResult<()>,
    },
    ReadCompleted {
        epoch: u64,
        result: OpResult<Option<StoredFix>>,
    },
    SendCompleted {
        epoch: u64,
        id: i64,
        result: OpResult<()>,
    },
    DeleteCompleted {
        epoch: u64,
        id: i64,
        result: OpResult<()>,
    },
    RetryTimerFired,
    ReachabilityChanged(bool),
}

/// Work the controller must perform on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Read { epoch: u64 },
    Send { epoch: u64, record: StoredFix },
    Delete { epoch: u64, id: i64 },
    ScheduleRetry,
    CancelRetry,
    Persist(LocationFix),
    SendDirect(LocationFix),
    NotifySideChannel(LocationFix),
    Report(StatusEvent),
}

/// Snapshot of controller state for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub state: DrainState,
    pub reachable: bool,
    /// The loop found the queue empty and is waiting to be woken.
    pub idle: bool,
    pub started: bool,
    /// Arrivals not yet persisted (or sent, when unbuffered).
    pub pending_arrivals: usize,
}

/// Pure delivery state machine.
#[derive(Debug)]
pub struct DrainMachine {
    config: MachineConfig,
    state: DrainState,
    reachable: bool,
    epoch: u64,
    /// A drain operation is outstanding, possibly from an older epoch.
    op_in_flight: bool,
    /// A read is owed once the outstanding stale operation completes.
    read_deferred: bool,
    retry_armed: bool,
    arrivals: VecDeque<LocationFix>,
    arrival_in_flight: bool,
    /// A fix was persisted while the current read was outstanding.
    persisted_during_read: bool,
}

impl DrainMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            state: DrainState::Stopped,
            reachable: false,
            epoch: 0,
            op_in_flight: false,
            read_deferred: false,
            retry_armed: false,
            arrivals: VecDeque::new(),
            arrival_in_flight: false,
            persisted_during_read: false,
        }
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DrainState::Waiting
    }

    pub fn is_started(&self) -> bool {
        self.state != DrainState::Stopped
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            reachable: self.reachable,
            idle: self.is_idle(),
            started: self.is_started(),
            pending_arrivals: self.arrivals.len() + usize::from(self.arrival_in_flight),
        }
    }

    /// Apply one input and return the effects to execute, in order.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Start { reachable } => self.on_start(reachable),
            Input::Stop => self.on_stop(),
            Input::FixArrived(fix) => self.on_fix_arrived(fix),
            Input::Persisted(result) => self.on_persisted(result),
            Input::DirectSent { fix, result } => self.on_direct_sent(fix, result),
            Input::ReadCompleted { epoch, result } => self.on_read_completed(epoch, result),
            Input::SendCompleted { epoch, id, result } => {
                self.on_send_completed(epoch, id, result)
            }
            Input::DeleteCompleted { epoch, id, result } => {
                self.on_delete_completed(epoch, id, result)
            }
            Input::RetryTimerFired => self.on_retry_timer(),
            Input::ReachabilityChanged(reachable) => self.on_reachability(reachable),
        }
    }

    fn on_start(&mut self, reachable: bool) -> Vec<Effect> {
        if self.is_started() {
            return Vec::new();
        }

        self.reachable = reachable;
        let mut effects = vec![Effect::Report(StatusEvent::Started)];
        if self.config.buffer && reachable {
            effects.extend(self.begin_read());
        } else {
            self.state = DrainState::Waiting;
        }
        effects
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        if !self.is_started() {
            return Vec::new();
        }

        self.state = DrainState::Stopped;
        self.epoch += 1;
        self.read_deferred = false;
        self.persisted_during_read = false;

        let mut effects = Vec::new();
        if self.retry_armed {
            self.retry_armed = false;
            effects.push(Effect::CancelRetry);
        }
        effects.push(Effect::Report(StatusEvent::Stopped));
        effects
    }

    fn on_fix_arrived(&mut self, fix: LocationFix) -> Vec<Effect> {
        let mut effects = vec![Effect::Report(StatusEvent::FixReceived {
            device_id: fix.device_id.clone(),
            captured_at: fix.captured_at,
        })];
        self.arrivals.push_back(fix);
        effects.extend(self.pump_arrivals());
        effects
    }

    fn on_persisted(&mut self, result: OpResult<i64>) -> Vec<Effect> {
        self.arrival_in_flight = false;

        let mut effects = Vec::new();
        match result {
            Ok(id) => {
                effects.push(Effect::Report(StatusEvent::FixQueued { id }));
                match self.state {
                    DrainState::Reading => self.persisted_during_read = true,
                    DrainState::Waiting if self.reachable && self.config.buffer => {
                        effects.extend(self.begin_read());
                    }
                    _ => {}
                }
            }
            Err(error) => effects.push(Effect::Report(StatusEvent::PersistFailed { error })),
        }
        effects.extend(self.pump_arrivals());
        effects
    }

    fn on_direct_sent(&mut self, fix: LocationFix, result: OpResult<()>) -> Vec<Effect> {
        self.arrival_in_flight = false;

        let event = match result {
            Ok(()) => StatusEvent::DirectSent {
                captured_at: fix.captured_at,
            },
            Err(error) => StatusEvent::DirectSendFailed {
                captured_at: fix.captured_at,
                error,
            },
        };
        let mut effects = vec![Effect::Report(event)];
        effects.extend(self.pump_arrivals());
        effects
    }

    fn on_read_completed(
        &mut self,
        epoch: u64,
        result: OpResult<Option<StoredFix>>,
    ) -> Vec<Effect> {
        self.op_in_flight = false;
        if epoch != self.epoch || self.state != DrainState::Reading {
            return self.resume_deferred_read();
        }

        match result {
            Ok(None) => {
                if std::mem::take(&mut self.persisted_during_read) {
                    return self.begin_read();
                }
                self.state = DrainState::Waiting;
                vec![Effect::Report(StatusEvent::QueueDrained)]
            }
            Ok(Some(record)) if record.fix.device_id != self.config.device_id => {
                let id = record.id;
                self.state = DrainState::Deleting { id };
                self.op_in_flight = true;
                vec![
                    Effect::Report(StatusEvent::OrphanDiscarded {
                        id,
                        device_id: record.fix.device_id,
                    }),
                    Effect::Delete {
                        epoch: self.epoch,
                        id,
                    },
                ]
            }
            Ok(Some(record)) => {
                self.state = DrainState::Sending { id: record.id };
                self.op_in_flight = true;
                vec![Effect::Send {
                    epoch: self.epoch,
                    record,
                }]
            }
            Err(error) => {
                let mut effects = vec![Effect::Report(StatusEvent::ReadFailed { error })];
                effects.extend(self.enter_retry());
                effects
            }
        }
    }

    fn on_send_completed(&mut self, epoch: u64, id: i64, result: OpResult<()>) -> Vec<Effect> {
        self.op_in_flight = false;
        if epoch != self.epoch || self.state != (DrainState::Sending { id }) {
            return self.resume_deferred_read();
        }

        match result {
            Ok(()) => {
                self.state = DrainState::Deleting { id };
                self.op_in_flight = true;
                vec![
                    Effect::Report(StatusEvent::Sent { id }),
                    Effect::Delete {
                        epoch: self.epoch,
                        id,
                    },
                ]
            }
            Err(error) => {
                let mut effects = vec![Effect::Report(StatusEvent::SendFailed { id, error })];
                effects.extend(self.enter_retry());
                effects
            }
        }
    }

    fn on_delete_completed(&mut self, epoch: u64, id: i64, result: OpResult<()>) -> Vec<Effect> {
        self.op_in_flight = false;
        if epoch != self.epoch || self.state != (DrainState::Deleting { id }) {
            return self.resume_deferred_read();
        }

        match result {
            Ok(()) => self.begin_read(),
            Err(error) => {
                let mut effects = vec![Effect::Report(StatusEvent::DeleteFailed { id, error })];
                effects.extend(self.enter_retry());
                effects
            }
        }
    }

    fn on_retry_timer(&mut self) -> Vec<Effect> {
        self.retry_armed = false;
        if self.state != DrainState::RetryPending || !self.reachable {
            // Offline: stay dormant until the next online transition.
            return Vec::new();
        }
        self.begin_read()
    }

    fn on_reachability(&mut self, reachable: bool) -> Vec<Effect> {
        if reachable == self.reachable {
            return Vec::new();
        }
        self.reachable = reachable;

        let mut effects = vec![Effect::Report(StatusEvent::ReachabilityChanged { reachable })];
        if reachable
            && self.config.buffer
            && matches!(self.state, DrainState::Waiting | DrainState::RetryPending)
        {
            if self.retry_armed {
                self.retry_armed = false;
                effects.push(Effect::CancelRetry);
            }
            effects.extend(self.begin_read());
        }
        effects
    }

    fn begin_read(&mut self) -> Vec<Effect> {
        self.state = DrainState::Reading;
        self.persisted_during_read = false;
        if self.op_in_flight {
            // An operation from before the last stop is still running.
            self.read_deferred = true;
            return Vec::new();
        }
        self.op_in_flight = true;
        vec![Effect::Read { epoch: self.epoch }]
    }

    fn resume_deferred_read(&mut self) -> Vec<Effect> {
        if self.read_deferred && self.state == DrainState::Reading {
            self.read_deferred = false;
            self.op_in_flight = true;
            return vec![Effect::Read { epoch: self.epoch }];
        }
        Vec::new()
    }

    fn enter_retry(&mut self) -> Vec<Effect> {
        self.state = DrainState::RetryPending;
        self.retry_armed = true;
        vec![
            Effect::ScheduleRetry,
            Effect::Report(StatusEvent::RetryScheduled),
        ]
    }

    fn pump_arrivals(&mut self) -> Vec<Effect> {
        if self.arrival_in_flight {
            return Vec::new();
        }
        let Some(fix) = self.arrivals.pop_front() else {
            return Vec::new();
        };
        self.arrival_in_flight = true;

        if !self.config.buffer {
            return vec![Effect::SendDirect(fix)];
        }
        if self.config.side_channel {
            vec![Effect::Persist(fix.clone()), Effect::NotifySideChannel(fix)]
        } else {
            vec![Effect::Persist(fix)]
        }
    }
}
