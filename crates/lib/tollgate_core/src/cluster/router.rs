//! Cluster router: background probing plus primary / standby selection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::{ClusterSnapshot, RoleTracker};
use super::{ClusterError, DbNode, NodeRole};

/// Interval between probe rounds.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on a single node probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum time to wait for a primary at start-up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive primary observations required before promotion.
pub const DEFAULT_CONFIRM_PROBES: u32 = 2;

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub check_interval: Duration,
    pub probe_timeout: Duration,
    pub startup_timeout: Duration,
    pub confirm_probes: u32,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            confirm_probes: DEFAULT_CONFIRM_PROBES,
        }
    }
}

/// Owns the node set and the latest probe snapshot.
///
/// The probe task is the only writer of the snapshot; readers clone the
/// current `Arc` and never see a half-updated view. Selection calls never
/// block: when no suitable node exists they fail immediately.
pub struct ClusterRouter<N: DbNode> {
    nodes: Arc<[Arc<N>]>,
    snapshot: watch::Receiver<Arc<ClusterSnapshot>>,
    cursor: AtomicUsize,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<N: DbNode> ClusterRouter<N> {
    /// Start probing and wait until a primary is confirmed.
    ///
    /// Fails with [`ClusterError::Unavailable`] if none is confirmed within
    /// `options.startup_timeout`; every node is closed in that case.
    pub async fn connect(nodes: Vec<N>, options: RouterOptions) -> Result<Self, ClusterError> {
        let startup_timeout = options.startup_timeout;
        let router = Self::start(nodes, options)?;

        match router.wait_for_primary(startup_timeout).await {
            Ok(primary) => {
                info!(address = primary.address(), "cluster router ready");
                Ok(router)
            }
            Err(e) => {
                warn!(timeout = ?startup_timeout, "no primary confirmed at start-up");
                router.close().await;
                Err(e)
            }
        }
    }

    /// Start the probe task without waiting for a primary.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(nodes: Vec<N>, options: RouterOptions) -> Result<Self, ClusterError> {
        if nodes.is_empty() {
            return Err(ClusterError::NoNodeAvailable);
        }

        let nodes: Arc<[Arc<N>]> = nodes.into_iter().map(Arc::new).collect();
        let addresses: Vec<String> = nodes.iter().map(|n| n.address().to_string()).collect();
        let tracker = RoleTracker::new(&addresses, options.confirm_probes);
        let (tx, rx) = watch::channel(Arc::new(tracker.snapshot().clone()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_probe_loop(
            Arc::clone(&nodes),
            tracker,
            tx,
            options.check_interval.max(Duration::from_millis(1)),
            options.probe_timeout,
            cancel.clone(),
        ));

        info!(nodes = ?addresses, interval = ?options.check_interval, "cluster probing started");

        Ok(Self {
            nodes,
            snapshot: rx,
            cursor: AtomicUsize::new(0),
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Wait up to `timeout` for a confirmed primary.
    pub async fn wait_for_primary(&self, timeout: Duration) -> Result<Arc<N>, ClusterError> {
        let mut rx = self.snapshot.clone();
        let confirmed = tokio::time::timeout(timeout, rx.wait_for(|s| s.primary.is_some()))
            .await
            .map(|seen| seen.is_ok())
            .unwrap_or(false);

        if !confirmed {
            return Err(ClusterError::Unavailable(timeout));
        }
        self.primary()
    }

    /// Latest probe snapshot.
    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// The confirmed primary, or [`ClusterError::NoPrimary`].
    pub fn primary(&self) -> Result<Arc<N>, ClusterError> {
        self.snapshot()
            .primary
            .map(|i| Arc::clone(&self.nodes[i]))
            .ok_or(ClusterError::NoPrimary)
    }

    /// A healthy standby (round-robin), else the primary, else any node that
    /// answered its last probe.
    pub fn standby_preferred(&self) -> Result<Arc<N>, ClusterError> {
        let snapshot = self.snapshot();

        if !snapshot.standbys.is_empty() {
            let turn = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.standbys.len();
            return Ok(Arc::clone(&self.nodes[snapshot.standbys[turn]]));
        }

        snapshot
            .primary
            .or_else(|| snapshot.healthy().next())
            .map(|i| Arc::clone(&self.nodes[i]))
            .ok_or(ClusterError::NoNodeAvailable)
    }

    /// Stop probing and close every node. Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();

        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        if let Err(e) = task.await {
            warn!(error = %e, "cluster probe task ended abnormally");
        }

        for node in self.nodes.iter() {
            node.close().await;
        }
        info!("cluster router closed");
    }
}

impl<N: DbNode> Drop for ClusterRouter<N> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_probe_loop<N: DbNode>(
    nodes: Arc<[Arc<N>]>,
    mut tracker: RoleTracker,
    tx: watch::Sender<Arc<ClusterSnapshot>>,
    interval: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let observed = tokio::select! {
            _ = cancel.cancelled() => break,
            observed = probe_all(&nodes, probe_timeout) => observed,
        };

        tx.send_replace(Arc::new(tracker.observe(&observed)));
    }

    debug!("cluster probe task stopped");
}

async fn probe_all<N: DbNode>(nodes: &[Arc<N>], timeout: Duration) -> Vec<Option<NodeRole>> {
    join_all(nodes.iter().map(|node| async move {
        match tokio::time::timeout(timeout, node.check_role()).await {
            Ok(Ok(role)) => Some(role),
            Ok(Err(e)) => {
                debug!(address = node.address(), error = %e, "node probe failed");
                None
            }
            Err(_) => {
                debug!(address = node.address(), ?timeout, "node probe timed out");
                None
            }
        }
    }))
    .await
}
