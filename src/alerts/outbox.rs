use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::models::Decision;

use super::notifier::Notifier;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundAlert {
    /// Sequence number of the reading the alert was raised for.
    pub sequence: usize,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl OutboundAlert {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            sequence: decision.reading_ref.sequence,
            timestamp: decision.reading_ref.timestamp,
            text: decision.alert_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DeliveryStatus {
    Delivered,
    Failed { code: Option<u16>, body: String },
    /// Dropped because an earlier alert was delivered within the cooldown.
    RateLimited,
    /// Still queued or in flight when the drain timeout expired. Whether an
    /// in-flight send reached the endpoint is unknown.
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub sequence: usize,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Sequences handed to the dispatcher but not yet settled, plus the
/// outcomes of those that were.
#[derive(Debug, Default)]
struct DeliveryLedger {
    pending: VecDeque<usize>,
    outcomes: Vec<DeliveryOutcome>,
}

impl DeliveryLedger {
    fn record(&mut self, sequence: usize, status: DeliveryStatus) {
        if self.pending.front() == Some(&sequence) {
            self.pending.pop_front();
        } else {
            self.pending.retain(|pending| *pending != sequence);
        }
        self.outcomes.push(DeliveryOutcome { sequence, status });
    }

    fn abandon_pending(&mut self) -> usize {
        let abandoned = self.pending.len();
        while let Some(sequence) = self.pending.pop_front() {
            self.outcomes.push(DeliveryOutcome {
                sequence,
                status: DeliveryStatus::Abandoned,
            });
        }
        abandoned
    }
}

fn lock_ledger(ledger: &Mutex<DeliveryLedger>) -> MutexGuard<'_, DeliveryLedger> {
    // The guard is never held across a send, so a poisoned ledger is still consistent.
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue between the monitor loop and the notifier. The loop enqueues and
/// moves on; a background task delivers in order, one at a time.
pub struct AlertOutbox {
    tx: Option<mpsc::UnboundedSender<OutboundAlert>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    ledger: Arc<Mutex<DeliveryLedger>>,
    /// Sequences only grow, so anything at or below this was already handed over.
    last_queued: Option<usize>,
}

impl AlertOutbox {
    /// Spawns the dispatcher. Must be called from within a tokio runtime.
    pub fn start(notifier: Arc<dyn Notifier>, destination: String, cooldown: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let ledger = Arc::new(Mutex::new(DeliveryLedger::default()));

        let handle = tokio::spawn(dispatch_loop(
            rx,
            notifier,
            destination,
            cooldown,
            cancel_token.clone(),
            Arc::clone(&ledger),
        ));

        Self {
            tx: Some(tx),
            handle: Some(handle),
            cancel_token,
            ledger,
            last_queued: None,
        }
    }

    /// Returns false when the alert was already queued or the outbox is closed.
    pub fn enqueue(&mut self, alert: OutboundAlert) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let sequence = alert.sequence;
        if let Some(last) = self.last_queued.filter(|last| sequence <= *last) {
            log_warn!("alert for reading #{sequence} already queued (last #{last}), ignoring");
            return false;
        }

        lock_ledger(&self.ledger).pending.push_back(sequence);
        if tx.send(alert).is_err() {
            lock_ledger(&self.ledger).pending.pop_back();
            log_error!("alert dispatcher gone, alert for reading #{} not queued", sequence);
            return false;
        }
        self.last_queued = Some(sequence);
        true
    }

    /// Closes the queue and waits up to `drain_timeout` for pending alerts.
    /// After that the dispatcher is stopped and every alert not yet settled
    /// is reported as [`DeliveryStatus::Abandoned`]. Once this returns no
    /// further sends are started.
    pub async fn shutdown(mut self, drain_timeout: Duration) -> Vec<DeliveryOutcome> {
        drop(self.tx.take());

        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(drain_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log_error!("alert dispatcher failed to join: {err:?}"),
                Err(_) => {
                    log_warn!(
                        "alert dispatcher still busy after {}s, stopping it",
                        drain_timeout.as_secs_f64()
                    );
                    self.cancel_token.cancel();
                    handle.abort();
                    match handle.await {
                        Err(err) if !err.is_cancelled() => {
                            log_error!("alert dispatcher failed while stopping: {err:?}")
                        }
                        _ => {}
                    }
                }
            }
        }

        let mut ledger = lock_ledger(&self.ledger);
        let abandoned = ledger.abandon_pending();
        if abandoned > 0 {
            log_warn!("{abandoned} alert(s) abandoned without a delivery result");
        }
        std::mem::take(&mut ledger.outcomes)
    }
}

impl Drop for AlertOutbox {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundAlert>,
    notifier: Arc<dyn Notifier>,
    destination: String,
    cooldown: Duration,
    cancel_token: CancellationToken,
    ledger: Arc<Mutex<DeliveryLedger>>,
) {
    let mut last_delivered: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("alert dispatcher shutting down");
                break;
            }
            maybe_alert = rx.recv() => {
                let Some(alert) = maybe_alert else {
                    break;
                };
                if cancel_token.is_cancelled() {
                    break;
                }
                let status = deliver(&alert, &notifier, &destination, cooldown, &mut last_delivered).await;
                lock_ledger(&ledger).record(alert.sequence, status);
            }
        }
    }
}

async fn deliver(
    alert: &OutboundAlert,
    notifier: &Arc<dyn Notifier>,
    destination: &str,
    cooldown: Duration,
    last_delivered: &mut Option<Instant>,
) -> DeliveryStatus {
    if let Some(last) = last_delivered {
        if !cooldown.is_zero() && last.elapsed() < cooldown {
            log_warn!(
                "alert for reading #{} ({}) rate limited, last delivery {}ms ago",
                alert.sequence,
                alert.timestamp,
                last.elapsed().as_millis()
            );
            return DeliveryStatus::RateLimited;
        }
    }

    let report = tokio::task::spawn_blocking({
        let notifier = Arc::clone(notifier);
        let destination = destination.to_string();
        let text = alert.text.clone();
        move || notifier.send(&destination, &text)
    })
    .await;

    match report {
        Ok(report) if report.success => {
            *last_delivered = Some(Instant::now());
            log_info!("alert for reading #{} delivered", alert.sequence);
            DeliveryStatus::Delivered
        }
        Ok(report) => {
            log_error!(
                "alert for reading #{} not delivered: status={:?} body={}",
                alert.sequence,
                report.status,
                report.body
            );
            DeliveryStatus::Failed {
                code: report.status,
                body: report.body,
            }
        }
        Err(err) => {
            log_error!("notifier worker for reading #{} failed: {err:?}", alert.sequence);
            DeliveryStatus::Failed {
                code: None,
                body: err.to_string(),
            }
        }
    }
}
