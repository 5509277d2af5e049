//! Connectivity monitoring.
//!
//! A [`NetworkMonitor`] answers point-in-time status queries and broadcasts
//! connectivity changes. Notifications may repeat the current state;
//! consumers must treat them idempotently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 32;

/// Point-in-time connectivity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_connected: bool,
    /// Connection kind as reported by the platform ("wifi", "cellular", "none", ...).
    #[serde(rename = "type")]
    pub connection_type: String,
}

impl NetworkStatus {
    pub fn connected(connection_type: impl Into<String>) -> Self {
        Self {
            is_connected: true,
            connection_type: connection_type.into(),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: "none".to_string(),
        }
    }
}

/// Source of connectivity information.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Current connectivity.
    async fn status(&self) -> NetworkStatus;

    /// Receiver for connectivity notifications.
    ///
    /// Every genuine transition is delivered at least once; redundant
    /// notifications for an unchanged state are allowed.
    fn watch(&self) -> broadcast::Receiver<NetworkStatus>;
}

/// Handle for a callback registered with [`subscribe`].
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering notifications.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    /// Whether the delivery task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Invoke `callback` for every notification from `monitor`.
///
/// Must be called from within a tokio runtime.
pub fn subscribe<F>(monitor: &dyn NetworkMonitor, callback: F) -> Subscription
where
    F: Fn(NetworkStatus) + Send + Sync + 'static,
{
    let mut rx = monitor.watch();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(status) => callback(status),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Connectivity subscriber lagged, skipped {} notifications", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Connectivity channel closed");
                    break;
                }
            }
        }
    });
    Subscription { task: Some(task) }
}

/// Monitor whose state is set explicitly.
///
/// Used in tests and by hosts that receive connectivity from the platform.
pub struct ManualMonitor {
    status: RwLock<NetworkStatus>,
    tx: broadcast::Sender<NetworkStatus>,
}

impl ManualMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            status: RwLock::new(initial),
            tx,
        }
    }

    /// A monitor that starts connected.
    pub fn online() -> Self {
        Self::new(NetworkStatus::connected("wifi"))
    }

    /// A monitor that starts disconnected.
    pub fn offline() -> Self {
        Self::new(NetworkStatus::offline())
    }

    /// Replace the current state and notify subscribers, even if unchanged.
    pub fn set_status(&self, status: NetworkStatus) {
        match self.status.write() {
            Ok(mut current) => *current = status.clone(),
            Err(poisoned) => *poisoned.into_inner() = status.clone(),
        }
        // No receivers is fine
        let _ = self.tx.send(status);
    }

    pub fn set_connected(&self, connected: bool) {
        if connected {
            self.set_status(NetworkStatus::connected("wifi"));
        } else {
            self.set_status(NetworkStatus::offline());
        }
    }

    fn current(&self) -> NetworkStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NetworkMonitor for ManualMonitor {
    async fn status(&self) -> NetworkStatus {
        self.current()
    }

    fn watch(&self) -> broadcast::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

/// Settings for [`ProbeMonitor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// `host:port` to open a TCP connection to.
    pub address: String,
    /// Time between probes.
    pub interval: Duration,
    /// Per-probe connect timeout.
    pub connect_timeout: Duration,
}

impl ProbeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Monitor that infers connectivity by periodically opening a TCP
/// connection to a known endpoint.
///
/// Only state changes are broadcast.
pub struct ProbeMonitor {
    inner: Arc<ManualMonitor>,
    task: JoinHandle<()>,
}

impl ProbeMonitor {
    /// Probe once, then keep probing in the background.
    pub async fn start(config: ProbeConfig) -> Self {
        let initial = probe(&config.address, config.connect_timeout).await;
        info!(
            "Connectivity probe to {} starts {}",
            config.address,
            if initial.is_connected { "online" } else { "offline" }
        );
        let inner = Arc::new(ManualMonitor::new(initial));

        let monitor = inner.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
            loop {
                ticker.tick().await;
                let observed = probe(&config.address, config.connect_timeout).await;
                if observed.is_connected != monitor.current().is_connected {
                    info!(
                        "Connectivity changed: {}",
                        if observed.is_connected { "online" } else { "offline" }
                    );
                    monitor.set_status(observed);
                }
            }
        });

        Self { inner, task }
    }
}

impl Drop for ProbeMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl NetworkMonitor for ProbeMonitor {
    async fn status(&self) -> NetworkStatus {
        self.inner.current()
    }

    fn watch(&self) -> broadcast::Receiver<NetworkStatus> {
        self.inner.watch()
    }
}

async fn probe(address: &str, connect_timeout: Duration) -> NetworkStatus {
    match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(_)) => NetworkStatus::connected("unknown"),
        Ok(Err(e)) => {
            debug!("Probe to {} failed: {}", address, e);
            NetworkStatus::offline()
        }
        Err(_) => {
            debug!("Probe to {} timed out", address);
            NetworkStatus::offline()
        }
    }
}
