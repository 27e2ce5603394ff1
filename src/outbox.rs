//! Post-commit mirroring of payment records into the standalone ledger.
//!
//! The primary commit never waits on the ledger. Each committed payment
//! leaves a [`MirrorTask`] behind; the task is attempted right away and
//! stays queued until a later attempt succeeds.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clock::SafeClock;
use crate::error::LedgerError;
use crate::ledger::{LedgerEntry, SharedLedgerStore};
use crate::primitives::*;
use crate::store::SharedLoanStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorTask {
    pub loan_id: LoanId,
    pub payment_id: PaymentId,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    Synced {
        payment_id: PaymentId,
        created: bool,
        chain_total: Option<Money>,
    },
    Deferred {
        payment_id: PaymentId,
        error: String,
    },
}

impl MirrorOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, MirrorOutcome::Synced { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub synced: usize,
    pub deferred: usize,
}

/// Pending mirror tasks, at most one per payment
#[derive(Debug, Default, Clone)]
pub struct Outbox {
    tasks: Arc<Mutex<Vec<MirrorTask>>>,
}

impl Outbox {
    pub fn enqueue(&self, loan_id: LoanId, payment_id: PaymentId, now: DateTime<Utc>) {
        let mut tasks = self.tasks.lock();
        if tasks.iter().any(|t| t.payment_id == payment_id) {
            return;
        }
        tasks.push(MirrorTask {
            loan_id,
            payment_id,
            enqueued_at: now,
            attempts: 0,
            last_error: None,
        });
    }

    pub fn pending(&self) -> Vec<MirrorTask> {
        self.tasks.lock().clone()
    }

    fn find(&self, payment_id: PaymentId) -> Option<MirrorTask> {
        self.tasks
            .lock()
            .iter()
            .find(|t| t.payment_id == payment_id)
            .cloned()
    }

    fn complete(&self, payment_id: PaymentId) {
        self.tasks.lock().retain(|t| t.payment_id != payment_id);
    }

    fn fail(&self, payment_id: PaymentId, error: &LedgerError) {
        if let Some(task) = self
            .tasks
            .lock()
            .iter_mut()
            .find(|t| t.payment_id == payment_id)
        {
            task.attempts += 1;
            task.last_error = Some(error.to_string());
        }
    }
}

#[derive(Clone)]
pub struct LedgerMirror {
    loans: SharedLoanStore,
    ledger: SharedLedgerStore,
    outbox: Outbox,
    clock: SafeClock,
}

impl LedgerMirror {
    pub fn new(loans: SharedLoanStore, ledger: SharedLedgerStore, clock: SafeClock) -> Self {
        Self {
            loans,
            ledger,
            outbox: Outbox::default(),
            clock,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// The loan's payments as the standalone ledger currently holds them
    pub async fn entries_for_loan(&self, loan_id: LoanId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.ledger.entries_for_loan(loan_id).await
    }

    /// Queue and immediately attempt mirroring of freshly committed payments
    pub async fn publish(
        &self,
        loan_id: LoanId,
        payment_ids: impl IntoIterator<Item = PaymentId>,
    ) -> Vec<MirrorOutcome> {
        let now = self.clock.now();
        let ids: Vec<PaymentId> = payment_ids.into_iter().collect();
        for id in &ids {
            self.outbox.enqueue(loan_id, *id, now);
        }
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.outbox.find(id) {
                outcomes.push(self.attempt(task).await);
            }
        }
        outcomes
    }

    /// Retry every queued task
    #[instrument(name = "emi.outbox.reconcile", skip(self))]
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for task in self.outbox.pending() {
            if self.attempt(task).await.is_synced() {
                report.synced += 1;
            } else {
                report.deferred += 1;
            }
        }
        info!(synced = report.synced, deferred = report.deferred, "ledger reconciled");
        report
    }

    async fn attempt(&self, task: MirrorTask) -> MirrorOutcome {
        match self.mirror(&task).await {
            Ok(outcome) => {
                self.outbox.complete(task.payment_id);
                outcome
            }
            Err(e) => {
                warn!(
                    payment_id = %task.payment_id,
                    loan_id = %task.loan_id,
                    attempts = task.attempts + 1,
                    error = %e,
                    "ledger mirror failed, task kept for retry"
                );
                self.outbox.fail(task.payment_id, &e);
                MirrorOutcome::Deferred {
                    payment_id: task.payment_id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Rebuild the ledger entry from the loan's current embedded record
    async fn mirror(&self, task: &MirrorTask) -> Result<MirrorOutcome, LedgerError> {
        let loan = self
            .loans
            .find_loan(task.loan_id)
            .await?
            .ok_or(LedgerError::LoanMissing(task.loan_id))?;
        let record = loan
            .payment(task.payment_id)
            .ok_or(LedgerError::PaymentMissing(task.payment_id))?;
        let now = self.clock.now();

        let (entry, created) = match self.ledger.find_entry(record.id).await? {
            Some(mut existing) => {
                existing.sync_from(record, now);
                (existing, false)
            }
            None => (LedgerEntry::from_record(&loan, record, now), true),
        };
        self.ledger.upsert_entry(entry).await?;

        let chain_total = match record.chain_id {
            Some(chain_id) => Some(self.ledger.recompute_chain_totals(chain_id).await?),
            None => None,
        };

        Ok(MirrorOutcome::Synced {
            payment_id: record.id,
            created,
            chain_total,
        })
    }
}
