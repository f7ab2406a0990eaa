//! Trailing-edge debounced saving.
//!
//! A worker task holds at most one pending snapshot. Each new snapshot
//! replaces it and restarts the timer; when the timer runs out the pending
//! snapshot is written. A burst of changes therefore costs one write, and
//! that write carries the last state of the burst.

use super::PersistenceGateway;
use crate::error::LensError;
use crate::events::ObserverHandle;
use crate::model::Presentation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

enum SaveCommand {
    Schedule(Box<Presentation>),
    Flush(oneshot::Sender<Result<(), LensError>>),
}

/// Handle to a save worker. Dropping it writes whatever is pending.
pub struct DebouncedSaver {
    commands: mpsc::UnboundedSender<SaveCommand>,
    saving: watch::Receiver<bool>,
}

impl DebouncedSaver {
    /// Start a worker writing to `gateway`. Must be called inside a Tokio runtime.
    pub fn spawn(
        gateway: Arc<dyn PersistenceGateway>,
        delay: Duration,
        observer: ObserverHandle,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (saving_tx, saving) = watch::channel(false);
        let worker = SaveWorker {
            gateway,
            delay,
            observer,
            saving: saving_tx,
        };
        tokio::spawn(worker.run(rx));
        Self { commands, saving }
    }

    /// Replace the pending snapshot and restart the timer.
    pub fn schedule(&self, snapshot: Presentation) {
        if self
            .commands
            .send(SaveCommand::Schedule(Box::new(snapshot)))
            .is_err()
        {
            warn!("Save worker has stopped; snapshot dropped");
        }
    }

    /// Write the pending snapshot now. Resolves once the write finished.
    pub async fn flush(&self) -> Result<(), LensError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(SaveCommand::Flush(ack))
            .map_err(|_| LensError::SessionClosed)?;
        done.await.map_err(|_| LensError::SessionClosed)?
    }

    /// Whether a snapshot is pending or being written.
    pub fn is_saving(&self) -> bool {
        *self.saving.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.saving.clone()
    }
}

struct SaveWorker {
    gateway: Arc<dyn PersistenceGateway>,
    delay: Duration,
    observer: ObserverHandle,
    saving: watch::Sender<bool>,
}

impl SaveWorker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<SaveCommand>) {
        let mut pending: Option<Box<Presentation>> = None;
        let timer = tokio::time::sleep(self.delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SaveCommand::Schedule(snapshot)) => {
                        pending = Some(snapshot);
                        timer.as_mut().reset(Instant::now() + self.delay);
                        self.set_saving(true);
                    }
                    Some(SaveCommand::Flush(ack)) => {
                        let result = self.write(pending.take()).await;
                        let _ = ack.send(result);
                    }
                    None => {
                        let _ = self.write(pending.take()).await;
                        break;
                    }
                },
                () = &mut timer, if pending.is_some() => {
                    let _ = self.write(pending.take()).await;
                }
            }
        }
        debug!("Save worker stopped");
    }

    async fn write(&self, snapshot: Option<Box<Presentation>>) -> Result<(), LensError> {
        let Some(snapshot) = snapshot else {
            return Ok(());
        };
        self.set_saving(true);
        let result = self.gateway.save(&snapshot).await;
        match &result {
            Ok(()) => debug!(
                "Saved presentation {} ({} slides)",
                snapshot.id, snapshot.slide_count
            ),
            Err(e) => {
                warn!("Saving presentation {} failed: {}", snapshot.id, e);
                self.observer.on_save_failed(&e.to_string());
            }
        }
        self.set_saving(false);
        result
    }

    fn set_saving(&self, value: bool) {
        let changed = self.saving.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
        if changed {
            self.observer.on_saving_changed(value);
        }
    }
}
