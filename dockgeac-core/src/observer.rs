//! Background runtime observer.
//!
//! Periodically polls the runtime's container inventory, diffs it against
//! the previous snapshot, and publishes events over a broadcast channel.
//! The observer is a read-only side channel: it never mutates engine
//! state, and a poll failure is an event, not an exception.

use crate::runtime::{ContainerState, ContainerStatus, RuntimeAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Maximum number of events buffered per subscriber.
const EVENT_BUFFER_SIZE: usize = 256;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Events emitted by the observer.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    ContainerCreated(ContainerStatus),
    ContainerRemoved(String),
    StateChanged { name: String, old_state: ContainerState, new_state: ContainerState },
    /// Full snapshot, once per successful poll.
    StatusUpdate(Vec<ContainerStatus>),
    PollError(String),
}

/// Periodic poller over a runtime adapter.
pub struct Observer {
    adapter: Arc<dyn RuntimeAdapter>,
    interval: Duration,
    sender: broadcast::Sender<ObserverEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Observer {
    pub fn new(adapter: Arc<dyn RuntimeAdapter>, interval: Duration) -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { adapter, interval, sender, task: Mutex::new(None) }
    }

    /// Subscribe to observer events.
    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.sender.subscribe()
    }

    /// Start polling. Performs one poll immediately; calling `start` while
    /// already running is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Observer already running");
            return;
        }

        let adapter = self.adapter.clone();
        let sender = self.sender.clone();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut previous: Option<HashMap<String, ContainerStatus>> = None;
            loop {
                // One poll in flight at a time; a slow runtime delays the
                // next tick instead of overlapping it.
                previous = poll_once(adapter.as_ref(), &sender, previous).await;
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Cancel the scheduled tick. Stopping a stopped observer is a no-op.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.try_lock().map(|t| t.as_ref().is_some_and(|t| !t.is_finished())).unwrap_or(true)
    }
}

/// One poll: list, diff against the previous snapshot, publish events.
/// Returns the snapshot to diff against next time (unchanged on failure).
async fn poll_once(
    adapter: &dyn RuntimeAdapter,
    sender: &broadcast::Sender<ObserverEvent>,
    previous: Option<HashMap<String, ContainerStatus>>,
) -> Option<HashMap<String, ContainerStatus>> {
    let containers = match adapter.list_containers(true).await {
        Ok(containers) => containers,
        Err(e) => {
            warn!(error = %e, "Observer poll failed");
            let _ = sender.send(ObserverEvent::PollError(e.to_string()));
            return previous;
        }
    };

    let current: HashMap<String, ContainerStatus> =
        containers.iter().map(|c| (c.name.clone(), c.clone())).collect();

    if let Some(previous) = &previous {
        for (name, status) in &current {
            match previous.get(name) {
                None => {
                    let _ = sender.send(ObserverEvent::ContainerCreated(status.clone()));
                }
                Some(old) if old.state != status.state => {
                    let _ = sender.send(ObserverEvent::StateChanged {
                        name: name.clone(),
                        old_state: old.state,
                        new_state: status.state,
                    });
                }
                Some(_) => {}
            }
        }
        for name in previous.keys() {
            if !current.contains_key(name) {
                let _ = sender.send(ObserverEvent::ContainerRemoved(name.clone()));
            }
        }
    }

    let _ = sender.send(ObserverEvent::StatusUpdate(containers));
    Some(current)
}
