use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::advance::AdvanceSpan;
use crate::aggregation::CustomerAggregate;
use crate::allocation::{self, LoanRequest, LoanRequestKind, RequestStatus};
use crate::audit::AuditEntry;
use crate::clock::SafeClock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result, StoreError};
use crate::ledger::{LedgerEntry, SharedLedgerStore};
use crate::loan::{Loan, LoanParameters, NewLoan, PaymentRecord};
use crate::outbox::{LedgerMirror, MirrorOutcome, MirrorTask, ReconcileReport};
use crate::primitives::*;
use crate::recorder::{self, PaymentIntent, PaymentRecorder};
use crate::schedule::{self, ScheduleTable};
use crate::store::{self, SharedLoanStore, UnitOfWork};
use crate::sync::{EditPayment, LedgerSynchronizer};

/// Outcome of recording a payment
#[derive(Debug, Clone)]
pub struct RecordResult {
    pub loan: Loan,
    pub records: Vec<PaymentRecord>,
    pub ledger: Vec<MirrorOutcome>,
}

/// Outcome of editing a payment
#[derive(Debug, Clone)]
pub struct EditResult {
    pub loan: Loan,
    pub record: PaymentRecord,
    pub amount_difference: Money,
    pub customer: CustomerAggregate,
    pub audit: AuditEntry,
    pub ledger: MirrorOutcome,
}

/// Entry point for installment scheduling and payment reconciliation
#[derive(Clone)]
pub struct PaymentEngine {
    config: EngineConfig,
    clock: SafeClock,
    loans: SharedLoanStore,
    recorder: PaymentRecorder,
    synchronizer: LedgerSynchronizer,
    mirror: LedgerMirror,
}

impl PaymentEngine {
    pub fn new(config: EngineConfig, loans: SharedLoanStore, ledger: SharedLedgerStore) -> Self {
        let clock = SafeClock::new(config.clock.clone());
        Self::with_clock(config, clock, loans, ledger)
    }

    pub fn with_clock(
        config: EngineConfig,
        clock: SafeClock,
        loans: SharedLoanStore,
        ledger: SharedLedgerStore,
    ) -> Self {
        Self {
            recorder: PaymentRecorder::new(loans.clone(), clock.clone(), config.partial_weight),
            synchronizer: LedgerSynchronizer::new(
                loans.clone(),
                clock.clone(),
                config.partial_weight,
            ),
            mirror: LedgerMirror::new(loans.clone(), ledger, clock.clone()),
            config,
            clock,
            loans,
        }
    }

    pub fn clock(&self) -> &SafeClock {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether a failed unit of work should run again
    async fn retry_or_fail(&self, err: EngineError, attempt: &mut u32, op: &str) -> Result<()> {
        match err {
            EngineError::Store(StoreError::VersionConflict {
                loan_id,
                expected,
                found,
            }) => {
                if *attempt < self.config.conflict_retries {
                    *attempt += 1;
                    warn!(%loan_id, attempt = *attempt, op, "loan changed underneath, retrying");
                    tokio::task::yield_now().await;
                    Ok(())
                } else {
                    Err(EngineError::Conflict(format!(
                        "{op}: loan {loan_id} moved from v{expected} to v{found}"
                    )))
                }
            }
            other => Err(other),
        }
    }

    pub async fn loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.loans
            .find_loan(loan_id)
            .await?
            .ok_or(EngineError::LoanNotFound(loan_id))
    }

    pub fn compute_schedule(&self, params: &LoanParameters) -> Result<ScheduleTable> {
        schedule::compute_schedule(params)
    }

    pub async fn compute_advance_span(
        &self,
        loan_id: LoanId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AdvanceSpan> {
        let loan = self.loan(loan_id).await?;
        recorder::plan_advance(&loan, from, to)
    }

    #[instrument(name = "emi.engine.record_payment", skip(self, intent), err)]
    pub async fn record_payment(
        &self,
        loan_id: LoanId,
        intent: PaymentIntent,
    ) -> Result<RecordResult> {
        let mut attempt = 0;
        let recorded = loop {
            match self.recorder.record(loan_id, &intent).await {
                Ok(recorded) => break recorded,
                Err(e) => self.retry_or_fail(e, &mut attempt, "record_payment").await?,
            }
        };
        let ledger = self
            .mirror
            .publish(loan_id, recorded.records.iter().map(|r| r.id))
            .await;
        Ok(RecordResult {
            loan: recorded.loan,
            records: recorded.records,
            ledger,
        })
    }

    #[instrument(name = "emi.engine.edit_payment", skip(self, edit), err)]
    pub async fn edit_payment(&self, edit: EditPayment) -> Result<EditResult> {
        let mut attempt = 0;
        let committed = loop {
            match self.synchronizer.edit(&edit).await {
                Ok(committed) => break committed,
                Err(e) => self.retry_or_fail(e, &mut attempt, "edit_payment").await?,
            }
        };
        let ledger = self
            .mirror
            .publish(committed.loan.id, [committed.record.id])
            .await
            .into_iter()
            .next()
            .unwrap_or(MirrorOutcome::Deferred {
                payment_id: committed.record.id,
                error: "mirror task was not queued".to_string(),
            });
        Ok(EditResult {
            loan: committed.loan,
            record: committed.record,
            amount_difference: committed.amount_difference,
            customer: committed.customer,
            audit: committed.audit,
            ledger,
        })
    }

    /// Retry every ledger mirror task still queued
    pub async fn reconcile_ledger(&self) -> ReconcileReport {
        self.mirror.reconcile().await
    }

    pub fn pending_mirror_tasks(&self) -> Vec<MirrorTask> {
        self.mirror.outbox().pending()
    }

    pub async fn ledger_entries(&self, loan_id: LoanId) -> Result<Vec<LedgerEntry>> {
        Ok(self.mirror.entries_for_loan(loan_id).await?)
    }

    pub async fn customer_summary(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerAggregate>> {
        Ok(self.loans.customer_aggregate(customer_id).await?)
    }

    pub async fn audit_trail(&self, payment_id: PaymentId) -> Result<Vec<AuditEntry>> {
        Ok(self.loans.audit_trail(payment_id).await?)
    }

    pub async fn available_loan_numbers(&self, customer_id: CustomerId) -> Result<Vec<LoanNumber>> {
        let loans = self.loans.loans_for_customer(customer_id).await?;
        let requests = self.loans.loan_requests(customer_id).await?;
        Ok(allocation::available_numbers(
            self.config.loan_number_pool,
            &loans,
            &requests,
        ))
    }

    fn check_number_free(
        &self,
        number: LoanNumber,
        loans: &[Loan],
        requests: &[LoanRequest],
    ) -> Result<()> {
        if number.value() > self.config.loan_number_pool {
            return Err(EngineError::validation(format!(
                "loan number {number} is outside the pool of {}",
                self.config.loan_number_pool
            )));
        }
        if allocation::is_taken(number, loans, requests) {
            return Err(EngineError::validation(format!(
                "loan number {number} is held by an active loan or a pending request"
            )));
        }
        Ok(())
    }

    #[instrument(name = "emi.engine.submit_loan_request", skip(self), err)]
    pub async fn submit_loan_request(
        &self,
        customer_id: CustomerId,
        kind: LoanRequestKind,
        loan_number: LoanNumber,
    ) -> Result<LoanRequest> {
        let loans = self.loans.loans_for_customer(customer_id).await?;
        let requests = self.loans.loan_requests(customer_id).await?;
        allocation::validate_request(
            self.config.loan_number_pool,
            kind,
            loan_number,
            &loans,
            &requests,
        )?;
        let request = LoanRequest {
            id: LoanRequestId::new(),
            customer_id,
            kind,
            loan_number,
            status: RequestStatus::Pending,
            submitted_at: self.clock.now(),
            resolved_at: None,
        };
        // the store re-checks pending uniqueness under its own lock
        match self.loans.insert_loan_request(request).await {
            Ok(request) => Ok(request),
            Err(StoreError::PendingRequestExists(id)) => {
                Err(EngineError::PendingRequestExists(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn resolve_loan_request(
        &self,
        request_id: LoanRequestId,
        approved: bool,
    ) -> Result<LoanRequest> {
        let status = if approved {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        self.loans
            .resolve_loan_request(request_id, status, self.clock.now())
            .await?
            .ok_or_else(|| EngineError::validation(format!("no loan request {request_id}")))
    }

    #[instrument(name = "emi.engine.originate_loan", skip(self, new_loan), err)]
    pub async fn originate_loan(&self, new_loan: NewLoan) -> Result<Loan> {
        let mut attempt = 0;
        let loan = loop {
            match self.try_originate(new_loan.clone()).await {
                Ok(loan) => break loan,
                Err(e) => self.retry_or_fail(e, &mut attempt, "originate_loan").await?,
            }
        };
        info!(loan_id = %loan.id, loan_number = %loan.loan_number, "loan originated");
        Ok(loan)
    }

    async fn try_originate(&self, new_loan: NewLoan) -> Result<Loan> {
        let now = self.clock.now();
        let customer_id = new_loan.customer_id;
        let loans = self.loans.loans_for_customer(customer_id).await?;
        let requests = self.loans.loan_requests(customer_id).await?;
        self.check_number_free(new_loan.loan_number, &loans, &requests)?;

        let loan = Loan::originate(new_loan, now)?;
        let rollup = store::rollup_customer(
            self.loans.as_ref(),
            customer_id,
            std::slice::from_ref(&loan),
            now,
        )
        .await?;
        self.loans
            .commit(UnitOfWork::for_loan(loan).with_customer(rollup))
            .await
            .map_err(number_taken)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::validation("loan was not stored"))
    }

    /// Supersede `old_loan_id` with a new loan on a different number
    #[instrument(name = "emi.engine.renew_loan", skip(self, new_loan), err)]
    pub async fn renew_loan(&self, old_loan_id: LoanId, new_loan: NewLoan) -> Result<Loan> {
        let mut attempt = 0;
        let loan = loop {
            match self.try_renew(old_loan_id, new_loan.clone()).await {
                Ok(loan) => break loan,
                Err(e) => self.retry_or_fail(e, &mut attempt, "renew_loan").await?,
            }
        };
        info!(old_loan_id = %old_loan_id, loan_id = %loan.id, "loan renewed");
        Ok(loan)
    }

    async fn try_renew(&self, old_loan_id: LoanId, new_loan: NewLoan) -> Result<Loan> {
        let now = self.clock.now();
        let mut old = self.loan(old_loan_id).await?;
        if old.customer_id != new_loan.customer_id {
            return Err(EngineError::validation(
                "renewal must stay with the same customer",
            ));
        }
        match old.status {
            LoanStatus::Active | LoanStatus::Completed => {}
            status @ (LoanStatus::Defaulted | LoanStatus::Renewed) => {
                return Err(EngineError::validation(format!(
                    "a {status:?} loan cannot be renewed"
                )));
            }
        }
        if old.loan_number == new_loan.loan_number {
            return Err(EngineError::validation(format!(
                "renewal must use a number other than {}",
                old.loan_number
            )));
        }
        let loans = self.loans.loans_for_customer(old.customer_id).await?;
        let requests = self.loans.loan_requests(old.customer_id).await?;
        self.check_number_free(new_loan.loan_number, &loans, &requests)?;

        let mut renewed = Loan::originate(new_loan, now)?;
        renewed.renewed_from = Some(old.id);
        old.status = LoanStatus::Renewed;

        let customer_id = old.customer_id;
        let updated = [old, renewed];
        let rollup =
            store::rollup_customer(self.loans.as_ref(), customer_id, &updated, now).await?;
        self.loans
            .commit(UnitOfWork {
                loans: updated.to_vec(),
                customer: Some(rollup),
                audit: Vec::new(),
            })
            .await
            .map_err(number_taken)?
            .into_iter()
            .find(|l| l.renewed_from == Some(old_loan_id))
            .ok_or_else(|| EngineError::validation("renewed loan was not stored"))
    }
}

/// A number claimed between the availability check and the commit
fn number_taken(err: StoreError) -> EngineError {
    match err {
        StoreError::LoanNumberTaken { loan_number, .. } => {
            EngineError::validation(format!("loan number {loan_number} is not available"))
        }
        other => other.into(),
    }
}
