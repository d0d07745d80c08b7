use std::sync::Arc;
use std::time::Duration;

use lorekeep_core::{MessageReader, MessageWriter, PersistenceError, SessionReader, SessionWriter};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::events::{SyncEvent, SyncEventSink, SyncStage, TracingEventSink};
use crate::paging::transfer_messages;
use crate::trigger::Trigger;

/// Outcome of one sync pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Sessions whose record and messages both went through.
    pub sessions_processed: usize,
    pub messages_processed: usize,
    pub sessions_failed: Vec<String>,
    pub elapsed: Duration,
    /// False when the pass only counted what it would have copied.
    pub durable: bool,
}

impl SyncSummary {
    pub fn is_complete(&self) -> bool {
        self.sessions_failed.is_empty()
    }
}

/// Write side of the durable store.
#[derive(Clone)]
pub struct DurableWriters {
    pub sessions: Arc<dyn SessionWriter>,
    pub messages: Arc<dyn MessageWriter>,
}

pub struct PersistenceManagerBuilder {
    trigger: Arc<dyn Trigger>,
    sessions: Arc<dyn SessionReader>,
    messages: Arc<dyn MessageReader>,
    durable: Option<DurableWriters>,
    events: Arc<dyn SyncEventSink>,
    config: SyncConfig,
}

impl PersistenceManagerBuilder {
    pub fn durable(
        mut self,
        sessions: Arc<dyn SessionWriter>,
        messages: Arc<dyn MessageWriter>,
    ) -> Self {
        self.durable = Some(DurableWriters { sessions, messages });
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn SyncEventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<PersistenceManager, PersistenceError> {
        self.config.validate()?;
        Ok(PersistenceManager {
            trigger: self.trigger,
            sessions: self.sessions,
            messages: self.messages,
            durable: self.durable,
            events: self.events,
            config: self.config,
        })
    }
}

/// Runs sync passes from the fast store into the durable store, either when
/// its trigger fires or on demand.
pub struct PersistenceManager {
    trigger: Arc<dyn Trigger>,
    sessions: Arc<dyn SessionReader>,
    messages: Arc<dyn MessageReader>,
    durable: Option<DurableWriters>,
    events: Arc<dyn SyncEventSink>,
    config: SyncConfig,
}

impl PersistenceManager {
    pub fn builder(
        trigger: Arc<dyn Trigger>,
        sessions: Arc<dyn SessionReader>,
        messages: Arc<dyn MessageReader>,
    ) -> PersistenceManagerBuilder {
        PersistenceManagerBuilder {
            trigger,
            sessions,
            messages,
            durable: None,
            events: Arc::new(TracingEventSink),
            config: SyncConfig::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    pub fn trigger_name(&self) -> String {
        self.trigger.name()
    }

    /// Polls the trigger until `cancel` fires. A pass already running when
    /// the token is cancelled is allowed to finish.
    pub async fn start(&self, cancel: CancellationToken) {
        let trigger = self.trigger.name();
        self.events.emit(SyncEvent::ManagerStarted {
            trigger: trigger.clone(),
            poll_interval_ms: self.config.poll_interval.as_millis() as u64,
        });

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once(&trigger, &cancel).await,
            }
        }

        self.events.emit(SyncEvent::ManagerStopped);
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.start(cancel).await })
    }

    /// Runs one pass right now, independent of the poll schedule.
    ///
    /// Returns [`PersistenceError::SyncIncomplete`] naming every session that
    /// failed. The pass still visits all sessions before reporting.
    pub async fn trigger(&self, cancel: &CancellationToken) -> Result<SyncSummary, PersistenceError> {
        let trigger = self.trigger.name();
        self.events.emit(SyncEvent::TriggerFired {
            trigger: trigger.clone(),
            manual: true,
        });

        let outcome = self.run_pass(cancel).await;
        self.reset_trigger(&trigger, cancel).await;
        let summary = outcome?;

        if summary.is_complete() {
            Ok(summary)
        } else {
            Err(PersistenceError::SyncIncomplete {
                failed_sessions: summary.sessions_failed,
            })
        }
    }

    async fn poll_once(&self, trigger: &str, cancel: &CancellationToken) {
        match self.trigger.should_trigger(cancel).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(PersistenceError::Cancelled) => return,
            Err(error) => {
                self.events.emit(SyncEvent::TriggerCheckFailed {
                    trigger: trigger.to_string(),
                    error: error.to_string(),
                });
                return;
            }
        }

        self.events.emit(SyncEvent::TriggerFired {
            trigger: trigger.to_string(),
            manual: false,
        });

        // Background passes run to completion even if the loop is cancelled.
        let pass_token = CancellationToken::new();
        let _ = self.run_pass(&pass_token).await;
        self.reset_trigger(trigger, &pass_token).await;
    }

    async fn reset_trigger(&self, trigger: &str, cancel: &CancellationToken) {
        if let Err(error) = self.trigger.reset(cancel).await {
            self.events.emit(SyncEvent::TriggerResetFailed {
                trigger: trigger.to_string(),
                error: error.to_string(),
            });
        }
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> Result<SyncSummary, PersistenceError> {
        let started = Instant::now();
        let durable = self.durable.as_ref();
        self.events.emit(SyncEvent::PassStarted {
            durable: durable.is_some(),
        });

        let sessions = match self.sessions.list().await {
            Ok(sessions) => sessions,
            Err(error) => {
                self.events.emit(SyncEvent::PassFailed {
                    error: error.to_string(),
                });
                return Err(error);
            }
        };

        let mut summary = SyncSummary {
            durable: durable.is_some(),
            ..SyncSummary::default()
        };

        for session in &sessions {
            if cancel.is_cancelled() {
                return Err(PersistenceError::Cancelled);
            }

            if let Some(durable) = durable {
                if let Err(error) = durable.sessions.create(session).await {
                    self.session_failed(&mut summary, &session.id, SyncStage::Session, &error);
                    continue;
                }
            }

            let writer: Option<&dyn MessageWriter> = match durable {
                Some(durable) => Some(&*durable.messages),
                None => None,
            };
            match transfer_messages(
                &*self.messages,
                writer,
                &session.id,
                self.config.page_size,
                cancel,
            )
            .await
            {
                Ok(count) => {
                    summary.sessions_processed += 1;
                    summary.messages_processed += count;
                }
                Err(PersistenceError::Cancelled) => return Err(PersistenceError::Cancelled),
                Err(error) => {
                    self.session_failed(&mut summary, &session.id, SyncStage::Messages, &error)
                }
            }
        }

        summary.elapsed = started.elapsed();
        self.events.emit(SyncEvent::PassCompleted {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    fn session_failed(
        &self,
        summary: &mut SyncSummary,
        session_id: &str,
        stage: SyncStage,
        error: &PersistenceError,
    ) {
        summary.sessions_failed.push(session_id.to_string());
        self.events.emit(SyncEvent::SessionFailed {
            session_id: session_id.to_string(),
            stage,
            error: error.to_string(),
        });
    }
}
