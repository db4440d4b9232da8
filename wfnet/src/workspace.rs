mod config;
mod worker;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use config::{WorkspaceConfig, WorkspaceConfigBuilder, WorkspaceConfigBuilderError};

use crate::error::{PetriError, Result};
use crate::firing::FireOutcome;
use crate::history::UndoHistory;
use crate::net::{CheckState, ElementId, Net, NetChangeEvent, NetStatus};
use crate::validate::{ValidationReport, Validator};
use worker::ValidationWorker;

#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash, Debug)]
pub struct NetId(pub u64);

impl Display for NetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug)]
pub enum WorkspaceEvent {
    /// Changes applied to an open net, in order.
    Changed(NetId, NetChangeEvent),
    /// Validation finished for the current revision of an open net.
    Validated(NetId, Arc<ValidationReport>),
    Closed(NetId),
}

struct NetSlot {
    net: Net,
    history: UndoHistory,
}

#[derive(Clone)]
struct NetEntry {
    slot: Arc<RwLock<NetSlot>>,
    status: Arc<NetStatus>,
    cancel_token: CancellationToken,
}

#[derive(Default)]
struct WorkspaceData {
    nets: HashMap<NetId, NetEntry>,
    next_id: u64,
}

/// All open nets plus the background task validating them.
///
/// Edits and simulation steps on one net are serialized by the net's lock. Every edit that
/// changes the structure queues a validation request. The worker validates a copy, so editing
/// never waits for a validation to finish.
pub struct Workspace {
    config: WorkspaceConfig,
    shared: Arc<RwLock<WorkspaceData>>,
    tx_request: mpsc::Sender<NetId>,
    tx_events: broadcast::Sender<WorkspaceEvent>,
    cancel_token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Workspace {
    /// Create the workspace and spawn its validation worker on the current tokio runtime.
    pub fn start(config: WorkspaceConfig, cancel_token: CancellationToken) -> Self {
        let shared = Arc::new(RwLock::new(WorkspaceData::default()));
        let (tx_request, rx_request) = mpsc::channel(config.request_capacity);
        let (tx_events, _) = broadcast::channel(config.event_capacity);
        let worker = ValidationWorker {
            shared: Arc::clone(&shared),
            rx_request,
            tx_events: tx_events.clone(),
            validator: Validator::new(config.firing_cap_factor),
            cancel_token: cancel_token.clone(),
        };
        let worker = tokio::spawn(worker.run());
        Workspace { config, shared, tx_request, tx_events, cancel_token, worker: Some(worker) }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.tx_events.subscribe()
    }

    /// Take ownership of a net. Changes still pending on it are published right away.
    pub async fn open(&self, mut net: Net) -> Result<NetId> {
        let changes = net.take_changes();
        let status = net.status();
        let entry = NetEntry {
            slot: Arc::new(RwLock::new(NetSlot {
                net,
                history: UndoHistory::new(self.config.history_depth),
            })),
            status: Arc::clone(&status),
            cancel_token: self.cancel_token.child_token(),
        };
        let net_id = {
            let mut data = self.shared.write().await;
            data.next_id += 1;
            let net_id = NetId(data.next_id);
            data.nets.insert(net_id, entry);
            net_id
        };
        info!(net = net_id.0, "Opened net.");
        self._publish(net_id, changes);
        if !status.is_checked() {
            self._schedule(net_id).await?;
        }
        Ok(net_id)
    }

    /// Close a net. A validation running for it is abandoned and its result dropped.
    pub async fn close(&self, net_id: NetId) -> Result<Net> {
        let entry = {
            let mut data = self.shared.write().await;
            let entry = data.nets.remove(&net_id).ok_or(PetriError::UnknownNet(net_id))?;
            entry.cancel_token.cancel();
            // sent while holding the lock, no validation result can follow it
            let _ = self.tx_events.send(WorkspaceEvent::Closed(net_id));
            entry
        };
        info!(net = net_id.0, "Closed net.");
        let slot = entry.slot.read().await;
        Ok(slot.net.clone())
    }

    pub async fn net_ids(&self) -> Vec<NetId> {
        let mut ids: Vec<NetId> = self.shared.read().await.nets.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn state(&self, net_id: NetId) -> Result<CheckState> {
        Ok(self._entry(net_id).await?.status.state())
    }

    /// Copy of the current net.
    pub async fn snapshot(&self, net_id: NetId) -> Result<Net> {
        let entry = self._entry(net_id).await?;
        let slot = entry.slot.read().await;
        Ok(slot.net.clone())
    }

    /// Apply an edit to a net.
    ///
    /// The state before the edit is kept for undo if the edit succeeded and changed anything.
    /// An edit that fails is rolled back as a whole, even if some of its steps succeeded, and
    /// none of its changes are published.
    pub async fn edit<R>(&self, net_id: NetId, f: impl FnOnce(&mut Net) -> Result<R>) -> Result<R> {
        let entry = self._entry(net_id).await?;
        let mut slot = entry.slot.write().await;
        let snapshot = slot.net.clone();
        let revision = slot.net.revision();
        let res = f(&mut slot.net);
        let mut changes = slot.net.take_changes();
        if !changes.is_empty() {
            if res.is_ok() {
                slot.history.record(snapshot);
            } else {
                debug!(net = net_id.0, changes = changes.changes.len(), "Rolled back failed edit.");
                slot.net.replace_with(snapshot);
                // subscribers never saw the partial edit
                changes = NetChangeEvent::new(slot.net.take_changes().revision);
            }
        }
        let structural = slot.net.revision() != revision;
        drop(slot);

        self._publish(net_id, changes);
        if structural {
            self._schedule(net_id).await?;
        }
        res
    }

    /// Fire a transition of the live net if it is enabled.
    ///
    /// Returns `None` if the transition is not enabled. Afterwards all transitions are checked
    /// again so the published changes reflect the new marking.
    pub async fn fire(&self, net_id: NetId, transition: &str) -> Result<Option<FireOutcome>> {
        let entry = self._entry(net_id).await?;
        let mut slot = entry.slot.write().await;
        let res = match slot.net.check_enabled(transition) {
            Ok(true) => slot.net.fire(transition).map(Some),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };
        if matches!(res, Ok(Some(_))) {
            slot.net.refresh_transitions();
        }
        let changes = slot.net.take_changes();
        drop(slot);
        self._publish(net_id, changes);
        res
    }

    /// Recheck all transitions of the live net and return the enabled ones.
    pub async fn refresh(&self, net_id: NetId) -> Result<Vec<ElementId>> {
        let entry = self._entry(net_id).await?;
        let mut slot = entry.slot.write().await;
        let enabled = slot.net.refresh_transitions();
        let changes = slot.net.take_changes();
        drop(slot);
        self._publish(net_id, changes);
        Ok(enabled)
    }

    pub async fn undo(&self, net_id: NetId) -> Result<bool> {
        self._restore(net_id, true).await
    }

    pub async fn redo(&self, net_id: NetId) -> Result<bool> {
        self._restore(net_id, false).await
    }

    /// Queue a validation of the net even if nothing changed.
    pub async fn request_validation(&self, net_id: NetId) -> Result<()> {
        let entry = self._entry(net_id).await?;
        entry.status.invalidate();
        self._schedule(net_id).await
    }

    /// Stop the validation worker and wait for it.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!("Validation worker ended with: {}", err);
            }
        }
        debug!("Workspace shut down.");
    }

    async fn _restore(&self, net_id: NetId, undo: bool) -> Result<bool> {
        let entry = self._entry(net_id).await?;
        let mut slot = entry.slot.write().await;
        let NetSlot { net, history } = &mut *slot;
        let restored = if undo { history.undo(net) } else { history.redo(net) };
        let changes = slot.net.take_changes();
        drop(slot);
        self._publish(net_id, changes);
        if restored {
            self._schedule(net_id).await?;
        }
        Ok(restored)
    }

    async fn _entry(&self, net_id: NetId) -> Result<NetEntry> {
        self.shared.read().await.nets.get(&net_id).cloned().ok_or(PetriError::UnknownNet(net_id))
    }

    async fn _schedule(&self, net_id: NetId) -> Result<()> {
        self.tx_request.send(net_id).await.map_err(|_| {
            warn!(net = net_id.0, "Validation worker is gone, request dropped.");
            PetriError::Cancelled()
        })
    }

    fn _publish(&self, net_id: NetId, changes: NetChangeEvent) {
        if changes.is_empty() {
            return;
        }
        debug!(net = net_id.0, "Change: {}", changes);
        // Note: an error only means that nobody is subscribed right now.
        let _ = self.tx_events.send(WorkspaceEvent::Changed(net_id, changes));
    }
}
