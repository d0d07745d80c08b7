use std::sync::RwLock;
use std::time::Duration;

use lorekeep_core::PersistenceError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Decides when the manager should run a sync pass.
#[async_trait::async_trait]
pub trait Trigger: Send + Sync {
    async fn should_trigger(&self, cancel: &CancellationToken) -> Result<bool, PersistenceError>;
    async fn reset(&self, cancel: &CancellationToken) -> Result<(), PersistenceError>;
    fn name(&self) -> String;
}

/// Fires on its first check, then once per `interval` after each reset.
#[derive(Debug)]
pub struct IntervalTrigger {
    interval: Duration,
    last_fired: RwLock<Option<Instant>>,
}

impl IntervalTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: RwLock::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn lock_poisoned() -> PersistenceError {
    PersistenceError::Store("interval trigger lock poisoned".to_string())
}

#[async_trait::async_trait]
impl Trigger for IntervalTrigger {
    async fn should_trigger(&self, _cancel: &CancellationToken) -> Result<bool, PersistenceError> {
        let last_fired = *self.last_fired.read().map_err(|_| lock_poisoned())?;
        Ok(match last_fired {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        })
    }

    async fn reset(&self, _cancel: &CancellationToken) -> Result<(), PersistenceError> {
        *self.last_fired.write().map_err(|_| lock_poisoned())? = Some(Instant::now());
        Ok(())
    }

    fn name(&self) -> String {
        format!("IntervalTrigger(interval={:?})", self.interval)
    }
}

/// Fires once per signal. Signals raised while one is pending are coalesced.
#[derive(Debug)]
pub struct ManualTrigger {
    sender: mpsc::Sender<()>,
    receiver: Mutex<mpsc::Receiver<()>>,
}

impl Default for ManualTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTrigger {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(1);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Raises a signal. Never blocks.
    pub fn trigger(&self) {
        let _ = self.sender.try_send(());
    }

    pub fn handle(&self) -> TriggerHandle {
        TriggerHandle {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Trigger for ManualTrigger {
    async fn should_trigger(&self, cancel: &CancellationToken) -> Result<bool, PersistenceError> {
        if cancel.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.try_recv().is_ok())
    }

    async fn reset(&self, _cancel: &CancellationToken) -> Result<(), PersistenceError> {
        let mut receiver = self.receiver.lock().await;
        while receiver.try_recv().is_ok() {}
        Ok(())
    }

    fn name(&self) -> String {
        "ManualTrigger".to_string()
    }
}

/// Cloneable signalling side of a [`ManualTrigger`], for request handlers.
#[derive(Clone, Debug)]
pub struct TriggerHandle {
    sender: mpsc::Sender<()>,
}

impl TriggerHandle {
    pub fn trigger(&self) {
        let _ = self.sender.try_send(());
    }
}
