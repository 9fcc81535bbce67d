//! Network reachability monitors.

use crate::controller::ControllerHandle;
use crate::{OutboxError, OutboxResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Reports whether the collector can currently be reached.
pub trait ReachabilityMonitor: Send + Sync {
    /// Last known state.
    fn is_reachable(&self) -> bool;

    /// Begin delivering transitions to `handle`.
    fn start(&self, handle: ControllerHandle);

    /// Stop delivering transitions.
    fn stop(&self);
}

/// Reachability driven from outside, e.g. by a platform network callback.
pub struct ManualReachability {
    reachable: AtomicBool,
    handle: Mutex<Option<ControllerHandle>>,
}

impl ManualReachability {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            handle: Mutex::new(None),
        }
    }

    /// Record the new state and forward it to the controller when started.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().as_ref() {
            if handle.on_reachability_change(reachable).is_err() {
                debug!("Controller gone, reachability change not delivered");
            }
        }
    }
}

impl ReachabilityMonitor for ManualReachability {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn start(&self, handle: ControllerHandle) {
        *self.handle.lock() = Some(handle);
    }

    fn stop(&self) {
        self.handle.lock().take();
    }
}

/// Probes the collector with a TCP connect at a fixed interval and reports
/// changes only.
///
/// Starts out unreachable until the first probe (or [`refresh`](Self::refresh))
/// succeeds, and goes back to unreachable on [`stop`](ReachabilityMonitor::stop)
/// so a restarted controller never begins from a stale result.
pub struct TcpProbeMonitor {
    target: String,
    interval: Duration,
    connect_timeout: Duration,
    reachable: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpProbeMonitor {
    /// Probe `host:port` of `endpoint`, using the scheme's default port when
    /// none is given.
    pub fn for_endpoint(endpoint: &Url, interval: Duration) -> OutboxResult<Self> {
        let host = endpoint.host_str().ok_or_else(|| {
            OutboxError::InvalidRequest(format!("endpoint has no host: {}", endpoint))
        })?;
        let port = endpoint.port_or_known_default().ok_or_else(|| {
            OutboxError::InvalidRequest(format!("endpoint has no port: {}", endpoint))
        })?;

        Ok(Self {
            target: format!("{}:{}", host, port),
            interval,
            connect_timeout: Duration::from_secs(5),
            reachable: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        })
    }

    /// Override the per-probe connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Probe once and store the result without notifying anyone.
    pub async fn refresh(&self) -> bool {
        let reachable = probe(&self.target, self.connect_timeout).await;
        self.reachable.store(reachable, Ordering::SeqCst);
        reachable
    }
}

impl ReachabilityMonitor for TcpProbeMonitor {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn start(&self, handle: ControllerHandle) {
        let target = self.target.clone();
        let interval = self.interval;
        let connect_timeout = self.connect_timeout;
        let reachable = self.reachable.clone();

        info!(addr = %target, interval_secs = interval.as_secs(), "Starting reachability probe");

        let task = tokio::spawn(async move {
            loop {
                let now = probe(&target, connect_timeout).await;
                let before = reachable.swap(now, Ordering::SeqCst);
                if now != before {
                    info!(addr = %target, reachable = now, "Collector reachability changed");
                    if handle.on_reachability_change(now).is_err() {
                        break;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(addr = %self.target, "Reachability probe stopped");
        }
        self.reachable.store(false, Ordering::SeqCst);
    }
}

async fn probe(target: &str, connect_timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(connect_timeout, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}
