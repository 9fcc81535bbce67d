//! Test harness for delivery controller tests.
//!
//! Provides:
//! - FakeQueue: in-memory FixQueue with failure injection and a read gate
//! - FakeTransport: records deliveries, fails on demand
//! - FakeSource / FakeNotifier: record lifecycle calls and notifications
//! - DrainTracker: shared counter that catches overlapping drain operations
//! - Harness: a controller wired to all of the above

use crate::{
    AcquisitionError, Collaborators, ControllerConfig, ControllerHandle, ControllerStatus,
    DeliveryController, DeliveryRequest, FixQueue, FixSource, ManualReachability, OutboxError,
    OutboxResult, RecordingReporter, SideChannelNotifier, StatusEvent, Transport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;
use waypost_database::{LocationFix, StoredFix};

pub const DEVICE: &str = "device-b";
pub const OTHER_DEVICE: &str = "device-a";
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

pub fn fix(latitude: f64) -> LocationFix {
    fix_for(DEVICE, latitude)
}

pub fn fix_for(device_id: &str, latitude: f64) -> LocationFix {
    LocationFix {
        device_id: device_id.to_string(),
        captured_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + latitude as i64, 0).unwrap(),
        latitude,
        longitude: 13.405,
        accuracy: 5.0,
        battery: 80.0,
        charging: false,
        mock: false,
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        endpoint: Url::parse("http://collector.test:5055/").unwrap(),
        buffer: true,
        device_id: DEVICE.to_string(),
        side_channel_destination: None,
        retry_delay: RETRY_DELAY,
    }
}

/// Counts drain operations in progress and remembers the highest overlap.
#[derive(Default)]
pub struct DrainTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl DrainTracker {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of drain operations ever outstanding at once.
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Operation observed by the fake queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    Insert(i64),
    Select(Option<i64>),
    Delete(i64),
}

/// In-memory queue with the same ordering rules as the SQLite outbox.
pub struct FakeQueue {
    records: Mutex<VecDeque<StoredFix>>,
    next_id: AtomicI64,
    ops: Mutex<Vec<QueueOp>>,
    fail_reads: AtomicUsize,
    fail_deletes: AtomicUsize,
    fail_inserts: AtomicUsize,
    read_gate: watch::Sender<bool>,
    tracker: Arc<DrainTracker>,
}

impl FakeQueue {
    pub fn new(tracker: Arc<DrainTracker>) -> Self {
        let (read_gate, _) = watch::channel(true);
        Self {
            records: Mutex::new(VecDeque::new()),
            next_id: AtomicI64::new(1),
            ops: Mutex::new(Vec::new()),
            fail_reads: AtomicUsize::new(0),
            fail_deletes: AtomicUsize::new(0),
            fail_inserts: AtomicUsize::new(0),
            read_gate,
            tracker,
        }
    }

    /// Put a record in the queue directly, as a previous run would have.
    pub fn seed(&self, fix: LocationFix) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push_back(StoredFix {
            id,
            fix,
            queued_at: Utc::now(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn ops(&self) -> Vec<QueueOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, QueueOp::Select(_)))
            .count()
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_inserts(&self, n: usize) {
        self.fail_inserts.store(n, Ordering::SeqCst);
    }

    /// Make reads block until [`open_reads`](Self::open_reads).
    pub fn hold_reads(&self) {
        self.read_gate.send_replace(false);
    }

    pub fn open_reads(&self) {
        self.read_gate.send_replace(true);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl FixQueue for FakeQueue {
    async fn insert(&self, fix: &LocationFix) -> OutboxResult<i64> {
        tokio::task::yield_now().await;
        if Self::take_failure(&self.fail_inserts) {
            return Err(OutboxError::Send("disk full".to_string()));
        }
        let id = self.seed(fix.clone());
        self.ops.lock().unwrap().push(QueueOp::Insert(id));
        Ok(id)
    }

    async fn select_oldest(&self) -> OutboxResult<Option<StoredFix>> {
        self.tracker.enter();
        let mut gate = self.read_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        tokio::task::yield_now().await;

        let result = if Self::take_failure(&self.fail_reads) {
            Err(OutboxError::Send("database is locked".to_string()))
        } else {
            let head = self.records.lock().unwrap().front().cloned();
            self.ops
                .lock()
                .unwrap()
                .push(QueueOp::Select(head.as_ref().map(|r| r.id)));
            Ok(head)
        };
        self.tracker.exit();
        result
    }

    async fn delete_by_id(&self, id: i64) -> OutboxResult<()> {
        self.tracker.enter();
        tokio::task::yield_now().await;

        let result = if Self::take_failure(&self.fail_deletes) {
            Err(OutboxError::Send("database is locked".to_string()))
        } else {
            self.records.lock().unwrap().retain(|r| r.id != id);
            self.ops.lock().unwrap().push(QueueOp::Delete(id));
            Ok(())
        };
        self.tracker.exit();
        result
    }
}

/// Transport that records what it delivered.
pub struct FakeTransport {
    delivered: Mutex<Vec<LocationFix>>,
    attempts: Mutex<Vec<Instant>>,
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    tracker: Arc<DrainTracker>,
}

impl FakeTransport {
    pub fn new(tracker: Arc<DrainTracker>) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            fail_all: AtomicBool::new(false),
            tracker,
        }
    }

    /// Fixes the collector accepted, in order.
    pub fn delivered(&self) -> Vec<LocationFix> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_latitudes(&self) -> Vec<f64> {
        self.delivered().iter().map(|f| f.latitude).collect()
    }

    /// When each send attempt started, successful or not.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn format_request(&self, endpoint: &Url, fix: &LocationFix) -> OutboxResult<DeliveryRequest> {
        Ok(DeliveryRequest {
            url: endpoint.clone(),
            fix: fix.clone(),
        })
    }

    async fn send_request(&self, request: DeliveryRequest) -> OutboxResult<()> {
        self.tracker.enter();
        self.attempts.lock().unwrap().push(Instant::now());
        tokio::task::yield_now().await;

        let failing = self.fail_all.load(Ordering::SeqCst)
            || FakeQueue::take_failure(&self.fail_next);
        let result = if failing {
            Err(OutboxError::Send("HTTP 503 Service Unavailable".to_string()))
        } else {
            self.delivered.lock().unwrap().push(request.fix);
            Ok(())
        };
        self.tracker.exit();
        result
    }
}

/// Fix source that only records lifecycle calls. Tests push fixes through
/// the controller handle.
#[derive(Default)]
pub struct FakeSource {
    starts: AtomicUsize,
    stops: AtomicUsize,
    start_error: Mutex<Option<AcquisitionError>>,
}

impl FakeSource {
    pub fn fail_start_with(&self, error: AcquisitionError) {
        *self.start_error.lock().unwrap() = Some(error);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl FixSource for FakeSource {
    fn start_updates(&self, _handle: ControllerHandle) -> Result<(), AcquisitionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.start_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn stop_updates(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    notified: Mutex<Vec<(LocationFix, String)>>,
    failing: AtomicBool,
}

impl FakeNotifier {
    pub fn notified(&self) -> Vec<(LocationFix, String)> {
        self.notified.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SideChannelNotifier for FakeNotifier {
    async fn notify(&self, fix: &LocationFix, destination: &str) -> OutboxResult<()> {
        self.notified
            .lock()
            .unwrap()
            .push((fix.clone(), destination.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(OutboxError::Send("webhook rejected".to_string()));
        }
        Ok(())
    }
}

/// A controller wired to fakes.
pub struct Harness {
    pub handle: ControllerHandle,
    pub task: JoinHandle<()>,
    pub queue: Arc<FakeQueue>,
    pub transport: Arc<FakeTransport>,
    pub reachability: Arc<ManualReachability>,
    pub source: Arc<FakeSource>,
    pub notifier: Arc<FakeNotifier>,
    pub reporter: Arc<RecordingReporter>,
    pub tracker: Arc<DrainTracker>,
}

impl Harness {
    /// Buffered controller with the default test config. Not started.
    pub fn new(online: bool) -> Self {
        Self::with_config(test_config(), online)
    }

    pub fn with_config(config: ControllerConfig, online: bool) -> Self {
        let tracker = Arc::new(DrainTracker::default());
        let queue = Arc::new(FakeQueue::new(tracker.clone()));
        let transport = Arc::new(FakeTransport::new(tracker.clone()));
        let reachability = Arc::new(ManualReachability::new(online));
        let source = Arc::new(FakeSource::default());
        let notifier = Arc::new(FakeNotifier::default());
        let reporter = Arc::new(RecordingReporter::new());

        let collaborators = Collaborators {
            queue: queue.clone(),
            transport: transport.clone(),
            reachability: reachability.clone(),
            source: source.clone(),
            notifier: Some(notifier.clone()),
            reporter: reporter.clone(),
        };
        let (handle, task) = DeliveryController::spawn(config, collaborators);

        Self {
            handle,
            task,
            queue,
            transport,
            reachability,
            source,
            notifier,
            reporter,
            tracker,
        }
    }

    pub fn start(&self) {
        self.handle.start().unwrap();
    }

    pub fn push(&self, fix: LocationFix) {
        self.handle.on_fix(fix).unwrap();
    }

    pub fn set_online(&self, online: bool) {
        self.reachability.set_reachable(online);
    }

    pub async fn status(&self) -> ControllerStatus {
        self.handle.status().await.unwrap()
    }

    pub fn count_events(&self, predicate: impl Fn(&StatusEvent) -> bool) -> usize {
        self.reporter.count(predicate)
    }

    /// Poll until `condition` holds, failing the test after a while.
    pub async fn wait_until(&self, what: &str, condition: impl Fn(&Self) -> bool) {
        for _ in 0..500 {
            if condition(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("timed out waiting for: {}", what);
    }

    /// Wait until the loop is idle with nothing left to persist.
    pub async fn wait_idle(&self) {
        for _ in 0..500 {
            let status = self.status().await;
            if status.idle && status.pending_arrivals == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("controller never went idle: {:?}", self.status().await);
    }

    /// Give spawned operations a chance to run without moving time far.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
    }
}
