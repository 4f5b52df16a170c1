use std::sync::Arc;

use memlink_provenance::LedgerConfirmation;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{LinkerError, LinkerResult};
use crate::linker::{now, Linker};

/// Running linker: owns the background task that drains ledger
/// confirmations and sweeps expired links.
///
/// Dropping the handle stops the task as well; [`LinkerHandle::shutdown`]
/// additionally waits for it to finish.
pub struct LinkerHandle {
    linker: Arc<Linker>,
    confirmations: mpsc::Sender<LedgerConfirmation>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Linker {
    /// Start the confirmation inbox and the timeout sweep.
    pub fn spawn(self: Arc<Self>) -> LinkerHandle {
        let (confirmations, inbox) =
            mpsc::channel(self.config().channels.confirmation_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(self.clone(), inbox, shutdown_rx));

        LinkerHandle {
            linker: self,
            confirmations,
            shutdown,
            task,
        }
    }
}

impl LinkerHandle {
    pub fn linker(&self) -> &Arc<Linker> {
        &self.linker
    }

    /// Sender for the ledger client. The inbox stays open while any clone
    /// or the handle itself is alive.
    pub fn confirmations(&self) -> mpsc::Sender<LedgerConfirmation> {
        self.confirmations.clone()
    }

    /// Queue a confirmation for the background task.
    pub async fn confirm(&self, event: LedgerConfirmation) -> LinkerResult<()> {
        self.confirmations
            .send(event)
            .await
            .map_err(|_| LinkerError::ChannelClosed)
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Linker task failed");
        }
    }
}

async fn run(
    linker: Arc<Linker>,
    mut inbox: mpsc::Receiver<LedgerConfirmation>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sweep = interval(linker.config().link.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        timeout_secs = linker.config().link.timeout_secs,
        sweep_interval_ms = linker.config().link.sweep_interval_ms,
        "Linker started"
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = inbox.recv() => {
                let Some(event) = received else { break };
                if let Err(e) = linker.handle_confirmation(event).await {
                    warn!(error = %e, "Confirmation handling failed");
                }
            }
            _ = sweep.tick() => {
                linker.expire_pending(now()).await;
            }
        }
    }

    let pending = linker.pending_count().await;
    info!(pending, "Linker stopped");
}
