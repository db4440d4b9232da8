use std::sync::Arc;

use tokio::select;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::{NetEntry, NetId, WorkspaceData, WorkspaceEvent};
use crate::error::{PetriError, Result};
use crate::validate::Validator;

pub(super) struct ValidationWorker {
    pub shared: Arc<RwLock<WorkspaceData>>,
    pub rx_request: mpsc::Receiver<NetId>,
    pub tx_events: broadcast::Sender<WorkspaceEvent>,
    pub validator: Validator,
    pub cancel_token: CancellationToken,
}

impl ValidationWorker {
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn run(mut self) {
        loop {
            select! {
                request = self.rx_request.recv() => {
                    let Some(net_id) = request else {
                        trace!("Validation request channel closed");
                        break;
                    };
                    match self._validate(net_id).await {
                        Ok(()) | Err(PetriError::Cancelled()) => {}
                        Err(err) => error!(net = net_id.0, "Validation failed with error: {}", err),
                    }
                },
                _ = self.cancel_token.cancelled() => break,
            }
        }
        debug!("Validation worker stopped.");
    }

    #[tracing::instrument(level = "debug", skip(self), fields(net = net_id.0))]
    async fn _validate(&self, net_id: NetId) -> Result<()> {
        let Some(entry) = self._entry(net_id).await else {
            trace!("Net closed before validation.");
            return Ok(());
        };
        let (snapshot, revision) = {
            let slot = entry.slot.read().await;
            if entry.status.is_checked() {
                trace!("Net already checked.");
                return Ok(());
            }
            entry.status.begin_check();
            (slot.net.clone(), slot.net.revision())
        };

        let validator = self.validator.clone();
        let task = tokio::task::spawn_blocking(move || validator.validate(&snapshot));
        let report = select! {
            res = task => match res {
                Ok(report) => report,
                Err(err) => {
                    entry.status.abort_check();
                    return Err(PetriError::LogicError(format!("Validation task failed: {}", err)));
                }
            },
            _ = entry.cancel_token.cancelled() => {
                entry.status.abort_check();
                debug!("Validation abandoned.");
                return Err(PetriError::Cancelled());
            }
        };

        // Holding the workspace lock orders the result before a concurrent close.
        let data = self.shared.read().await;
        if !data.nets.contains_key(&net_id) {
            entry.status.abort_check();
            debug!("Net closed during validation, result discarded.");
            return Ok(());
        }
        {
            let slot = entry.slot.read().await;
            if slot.net.revision() != revision {
                entry.status.abort_check();
                debug!(
                    revision = revision.0,
                    current = slot.net.revision().0,
                    "Discarded stale validation result."
                );
                return Ok(());
            }
            entry.status.finish_check(report.is_valid());
        }
        info!(
            valid = report.is_valid(),
            diagnostics = report.diagnostics.len(),
            revision = revision.0,
            "Validated net."
        );
        let _ = self.tx_events.send(WorkspaceEvent::Validated(net_id, Arc::new(report)));
        drop(data);
        Ok(())
    }

    async fn _entry(&self, net_id: NetId) -> Option<NetEntry> {
        self.shared.read().await.nets.get(&net_id).cloned()
    }
}
