//! The delivery controller task.
//!
//! One task owns the [`DrainMachine`] and processes commands one at a time
//! from an unbounded channel: lifecycle requests, new fixes, reachability
//! transitions and the completions of queue and transport operations. Those
//! operations run as spawned tasks that post their outcome back into the same
//! channel, so no state is ever touched from two places.
//!
//! ```text
//! FixSource ──on_fix──────────┐
//! Reachability ──on_change────┼──▶ [ channel ] ──▶ DrainMachine ──▶ effects
//! spawned ops ──completion────┘                                      │
//!        ▲                                                            │
//!        └──────────── FixQueue / Transport / SideChannel ◀───────────┘
//! ```

use crate::machine::{ControllerStatus, DrainMachine, Effect, Input, MachineConfig, OpResult};
use crate::queue::FixQueue;
use crate::reachability::ReachabilityMonitor;
use crate::report::{StatusEvent, StatusReporter};
use crate::sender::Transport;
use crate::side_channel::SideChannelNotifier;
use crate::source::FixSource;
use crate::{AcquisitionError, OutboxError, OutboxResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use waypost_core::Config;
use waypost_database::LocationFix;

/// Controller settings, fixed for the controller's lifetime.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub endpoint: Url,
    /// Persist fixes before sending them.
    pub buffer: bool,
    /// Origin tag this controller delivers for.
    pub device_id: String,
    /// Side-channel destination. `None` disables the side channel.
    pub side_channel_destination: Option<String>,
    /// Delay before retrying a failed drain step.
    pub retry_delay: Duration,
}

impl ControllerConfig {
    /// Take a snapshot of the relevant parts of `config`.
    pub fn from_config(config: &Config) -> OutboxResult<Self> {
        config.validate()?;
        let side_channel_destination = if config.side_channel_enabled {
            config.side_channel_destination.clone()
        } else {
            None
        };

        Ok(Self {
            endpoint: config.endpoint_url()?,
            buffer: config.buffer,
            device_id: config.device_id.clone(),
            side_channel_destination,
            retry_delay: config.retry_delay(),
        })
    }
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn FixQueue>,
    pub transport: Arc<dyn Transport>,
    pub reachability: Arc<dyn ReachabilityMonitor>,
    pub source: Arc<dyn FixSource>,
    pub notifier: Option<Arc<dyn SideChannelNotifier>>,
    pub reporter: Arc<dyn StatusReporter>,
}

enum Command {
    Start,
    Stop,
    Shutdown(oneshot::Sender<()>),
    Status(oneshot::Sender<ControllerStatus>),
    Fix(LocationFix),
    AcquisitionFailed(AcquisitionError),
    Reachability(bool),
    Completed(Input),
}

/// Cloneable handle to a running controller.
///
/// Every method only enqueues a command; none of them wait for the
/// controller to act, except [`status`](Self::status) and
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    fn send(&self, command: Command) -> OutboxResult<()> {
        self.tx
            .send(command)
            .map_err(|_| OutboxError::ControllerClosed)
    }

    /// Start delivery, acquisition and reachability monitoring.
    pub fn start(&self) -> OutboxResult<()> {
        self.send(Command::Start)
    }

    /// Stop acquisition and monitoring and cancel any pending retry.
    /// Queued fixes stay queued.
    pub fn stop(&self) -> OutboxResult<()> {
        self.send(Command::Stop)
    }

    /// Stop and wait for the controller task to exit.
    pub async fn shutdown(&self) -> OutboxResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| OutboxError::ControllerClosed)
    }

    pub async fn status(&self) -> OutboxResult<ControllerStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx))?;
        rx.await.map_err(|_| OutboxError::ControllerClosed)
    }

    /// Hand a newly acquired fix to the controller.
    pub fn on_fix(&self, fix: LocationFix) -> OutboxResult<()> {
        self.send(Command::Fix(fix))
    }

    pub fn on_acquisition_error(&self, error: AcquisitionError) -> OutboxResult<()> {
        self.send(Command::AcquisitionFailed(error))
    }

    pub fn on_reachability_change(&self, reachable: bool) -> OutboxResult<()> {
        self.send(Command::Reachability(reachable))
    }
}

/// Store-and-forward delivery controller.
pub struct DeliveryController {
    config: ControllerConfig,
    machine: DrainMachine,
    collaborators: Collaborators,
    /// Weak so that dropping every handle ends the task.
    tx: mpsc::WeakUnboundedSender<Command>,
    retry_deadline: Option<Instant>,
}

impl DeliveryController {
    /// Spawn the controller task. It stays stopped until
    /// [`ControllerHandle::start`] is called.
    pub fn spawn(
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let side_channel =
            config.side_channel_destination.is_some() && collaborators.notifier.is_some();
        let machine = DrainMachine::new(MachineConfig {
            buffer: config.buffer,
            device_id: config.device_id.clone(),
            side_channel,
        });

        let controller = Self {
            config,
            machine,
            collaborators,
            tx: tx.downgrade(),
            retry_deadline: None,
        };
        let task = tokio::spawn(controller.run(rx));

        (ControllerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!(
            endpoint = %self.config.endpoint,
            device_id = %self.config.device_id,
            buffer = self.config.buffer,
            side_channel = self.config.side_channel_destination.is_some(),
            retry_delay_secs = self.config.retry_delay.as_secs(),
            "Delivery controller ready"
        );

        loop {
            let command = tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                _ = retry_timer(self.retry_deadline) => {
                    self.retry_deadline = None;
                    Command::Completed(Input::RetryTimerFired)
                }
            };

            match command {
                Command::Start => self.start(),
                Command::Stop => self.stop(),
                Command::Shutdown(done) => {
                    self.stop();
                    let _ = done.send(());
                    break;
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.machine.status());
                }
                Command::Fix(fix) => self.dispatch(Input::FixArrived(fix)),
                Command::AcquisitionFailed(error) => {
                    self.collaborators
                        .reporter
                        .report(&StatusEvent::AcquisitionFailed {
                            error: error.to_string(),
                        });
                }
                Command::Reachability(reachable) => {
                    self.dispatch(Input::ReachabilityChanged(reachable))
                }
                Command::Completed(input) => self.dispatch(input),
            }
        }

        // Nothing keeps running on our behalf once the task is gone.
        self.collaborators.source.stop_updates();
        self.collaborators.reachability.stop();
        debug!("Delivery controller task exited");
    }

    fn start(&mut self) {
        if self.machine.is_started() {
            debug!("Start requested while already running");
            return;
        }
        let Some(handle) = self.handle() else {
            return;
        };

        let reachable = self.collaborators.reachability.is_reachable();
        self.dispatch(Input::Start { reachable });

        self.collaborators.reachability.start(handle.clone());
        if let Err(error) = self.collaborators.source.start_updates(handle) {
            warn!(error = %error, "Fix source failed to start");
            self.collaborators
                .reporter
                .report(&StatusEvent::AcquisitionFailed {
                    error: error.to_string(),
                });
        }
    }

    fn stop(&mut self) {
        if !self.machine.is_started() {
            return;
        }
        self.collaborators.source.stop_updates();
        self.collaborators.reachability.stop();
        self.dispatch(Input::Stop);
    }

    fn dispatch(&mut self, input: Input) {
        for effect in self.machine.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Read { epoch } => {
                let queue = self.collaborators.queue.clone();
                self.spawn_op(async move {
                    let result = queue.select_oldest().await.map_err(render);
                    Input::ReadCompleted { epoch, result }
                });
            }
            Effect::Send { epoch, record } => {
                let transport = self.collaborators.transport.clone();
                let endpoint = self.config.endpoint.clone();
                let id = record.id;
                self.spawn_op(async move {
                    let result = deliver(transport.as_ref(), &endpoint, &record.fix).await;
                    Input::SendCompleted { epoch, id, result }
                });
            }
            Effect::Delete { epoch, id } => {
                let queue = self.collaborators.queue.clone();
                self.spawn_op(async move {
                    let result = queue.delete_by_id(id).await.map_err(render);
                    Input::DeleteCompleted { epoch, id, result }
                });
            }
            Effect::ScheduleRetry => {
                debug!(delay_secs = self.config.retry_delay.as_secs(), "Retry timer armed");
                self.retry_deadline = Some(Instant::now() + self.config.retry_delay);
            }
            Effect::CancelRetry => {
                debug!("Retry timer cancelled");
                self.retry_deadline = None;
            }
            Effect::Persist(fix) => {
                let queue = self.collaborators.queue.clone();
                self.spawn_op(async move {
                    Input::Persisted(queue.insert(&fix).await.map_err(render))
                });
            }
            Effect::SendDirect(fix) => {
                let transport = self.collaborators.transport.clone();
                let endpoint = self.config.endpoint.clone();
                self.spawn_op(async move {
                    let result = deliver(transport.as_ref(), &endpoint, &fix).await;
                    Input::DirectSent { fix, result }
                });
            }
            Effect::NotifySideChannel(fix) => self.notify_side_channel(fix),
            Effect::Report(event) => self.collaborators.reporter.report(&event),
        }
    }

    /// Run `op` in its own task and feed its result back as an input.
    fn spawn_op<F>(&self, op: F)
    where
        F: Future<Output = Input> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let input = op.await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Completed(input));
            }
        });
    }

    fn notify_side_channel(&self, fix: LocationFix) {
        let (Some(notifier), Some(destination)) = (
            self.collaborators.notifier.clone(),
            self.config.side_channel_destination.clone(),
        ) else {
            return;
        };
        let reporter = self.collaborators.reporter.clone();

        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&fix, &destination).await {
                reporter.report(&StatusEvent::SideChannelFailed {
                    error: e.to_string(),
                });
            }
        });
    }

    fn handle(&self) -> Option<ControllerHandle> {
        self.tx.upgrade().map(|tx| ControllerHandle { tx })
    }
}

async fn deliver(transport: &dyn Transport, endpoint: &Url, fix: &LocationFix) -> OpResult<()> {
    let request = transport.format_request(endpoint, fix).map_err(render)?;
    transport.send_request(request).await.map_err(render)
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn render(e: OutboxError) -> String {
    e.to_string()
}
