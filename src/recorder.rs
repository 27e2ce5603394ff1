use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::advance::{self, AdvanceSpan};
use crate::audit::AuditEntry;
use crate::clock::SafeClock;
use crate::error::{EngineError, Result};
use crate::loan::{AdvanceDetails, Loan, PaymentRecord};
use crate::primitives::*;
use crate::schedule;
use crate::store::{self, SharedLoanStore, UnitOfWork};

/// A payment against the next outstanding installment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePayment {
    /// Required for `Partial`. For `Paid` defaults to what is still
    /// outstanding on the installment.
    pub amount: Option<Money>,
    pub status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
    pub collector: String,
    pub notes: Option<String>,
}

/// A prepayment covering every installment due within a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancePayment {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub collector: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentIntent {
    Single(SinglePayment),
    Advance(AdvancePayment),
}

impl PaymentIntent {
    pub fn paid(collector: impl Into<String>) -> Self {
        PaymentIntent::Single(SinglePayment {
            amount: None,
            status: PaymentStatus::Paid,
            payment_date: None,
            collector: collector.into(),
            notes: None,
        })
    }

    pub fn partial(amount: Money, collector: impl Into<String>) -> Self {
        PaymentIntent::Single(SinglePayment {
            amount: Some(amount),
            status: PaymentStatus::Partial,
            payment_date: None,
            collector: collector.into(),
            notes: None,
        })
    }

    pub fn advance(from_date: NaiveDate, to_date: NaiveDate, collector: impl Into<String>) -> Self {
        PaymentIntent::Advance(AdvancePayment {
            from_date,
            to_date,
            payment_date: None,
            collector: collector.into(),
            notes: None,
        })
    }

    fn collector(&self) -> &str {
        match self {
            PaymentIntent::Single(p) => &p.collector,
            PaymentIntent::Advance(p) => &p.collector,
        }
    }
}

/// Validate an intent against the loan's current history and build the
/// records it would append. Does not touch the loan.
pub fn prepare_records(
    loan: &Loan,
    intent: &PaymentIntent,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<PaymentRecord>> {
    if !loan.is_active() {
        return Err(EngineError::validation(format!(
            "loan {} is {:?} and cannot take payments",
            loan.loan_number, loan.status
        )));
    }
    if intent.collector().trim().is_empty() {
        return Err(EngineError::validation("collector is required"));
    }
    let next = schedule::next_installment_index(&loan.params, &loan.history);
    if next > loan.params.total_installments {
        return Err(EngineError::validation(format!(
            "loan {} has no outstanding installments",
            loan.loan_number
        )));
    }

    match intent {
        PaymentIntent::Single(payment) => {
            prepare_single(loan, payment, next, today, now).map(|r| vec![r])
        }
        PaymentIntent::Advance(payment) => prepare_advance(loan, payment, next, today, now),
    }
}

fn open_chain(loan: &Loan, index: u32) -> Option<PartialChainId> {
    loan.records_for_installment(index).find_map(|r| r.chain_id)
}

fn prepare_single(
    loan: &Loan,
    payment: &SinglePayment,
    index: u32,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<PaymentRecord> {
    let due = schedule::due_amount_for_installment(&loan.params, index);
    let outstanding = schedule::outstanding_on_installment(&loan.params, &loan.history, index);

    let (amount, chain_id) = match payment.status {
        PaymentStatus::Partial => {
            let amount = payment
                .amount
                .ok_or_else(|| EngineError::validation("partial payment requires an amount"))?;
            if amount <= Decimal::ZERO {
                return Err(EngineError::validation("payment amount must be positive"));
            }
            if amount >= due || amount >= outstanding {
                return Err(EngineError::validation(format!(
                    "partial {amount} must be below the {outstanding} owed on installment {index}"
                )));
            }
            (
                amount,
                Some(open_chain(loan, index).unwrap_or_else(PartialChainId::new)),
            )
        }
        PaymentStatus::Paid => {
            let amount = payment.amount.unwrap_or(outstanding);
            if amount <= Decimal::ZERO {
                return Err(EngineError::validation("payment amount must be positive"));
            }
            // anything short of what is owed is a partial payment
            if amount < outstanding {
                return Err(EngineError::validation(format!(
                    "paid amount {amount} is below the {outstanding} owed on installment {index}"
                )));
            }
            (amount, open_chain(loan, index))
        }
        status @ (PaymentStatus::Advance | PaymentStatus::Due | PaymentStatus::Overdue) => {
            return Err(EngineError::validation(format!(
                "a single payment must be Paid or Partial, not {status}"
            )));
        }
    };

    Ok(PaymentRecord {
        id: PaymentId::new(),
        amount,
        status: payment.status,
        payment_date: payment.payment_date.unwrap_or(today),
        installment_index: index,
        collector: payment.collector.clone(),
        notes: payment.notes.clone(),
        advance: None,
        chain_id,
        recorded_at: now,
        edited: None,
    })
}

/// Validate an advance range and compute the installments it settles
pub fn plan_advance(loan: &Loan, from: NaiveDate, to: NaiveDate) -> Result<AdvanceSpan> {
    if from < loan.params.emi_start_date {
        return Err(EngineError::validation(format!(
            "advance cannot start before the schedule begins on {}",
            loan.params.emi_start_date
        )));
    }
    if to < from {
        return Err(EngineError::validation("advance range ends before it starts"));
    }
    let span = advance::compute_advance_span(&loan.params, &loan.history, from, to);
    if span.is_empty() {
        return Err(EngineError::validation(
            "advance range covers no outstanding installments",
        ));
    }
    Ok(span)
}

fn prepare_advance(
    loan: &Loan,
    payment: &AdvancePayment,
    next: u32,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<PaymentRecord>> {
    if open_chain(loan, next).is_some() {
        return Err(EngineError::validation(format!(
            "installment {next} has partial payments; settle it before paying in advance"
        )));
    }
    let span = plan_advance(loan, payment.from_date, payment.to_date)?;
    let details = AdvanceDetails {
        group_id: AdvanceGroupId::new(),
        from_date: span.from_date,
        to_date: span.to_date,
        installments_covered: span.installments.len() as u32,
        total_amount: span.total_amount,
    };
    Ok(span
        .installments
        .iter()
        .map(|installment| PaymentRecord {
            id: PaymentId::new(),
            amount: installment.amount,
            status: PaymentStatus::Advance,
            payment_date: payment.payment_date.unwrap_or(today),
            installment_index: installment.index,
            collector: payment.collector.clone(),
            notes: payment.notes.clone(),
            advance: Some(details.clone()),
            chain_id: None,
            recorded_at: now,
            edited: None,
        })
        .collect())
}

/// Result of one committed recording
#[derive(Debug, Clone)]
pub struct RecordedPayment {
    pub loan: Loan,
    pub records: Vec<PaymentRecord>,
}

#[derive(Clone)]
pub struct PaymentRecorder {
    loans: SharedLoanStore,
    clock: SafeClock,
    partial_weight: Decimal,
}

impl PaymentRecorder {
    pub fn new(loans: SharedLoanStore, clock: SafeClock, partial_weight: Decimal) -> Self {
        Self {
            loans,
            clock,
            partial_weight,
        }
    }

    /// One attempt at the record unit of work: read, validate, append,
    /// recompute and commit loan + customer aggregate + audit together.
    #[instrument(name = "emi.recorder.record", skip(self, intent), err)]
    pub async fn record(&self, loan_id: LoanId, intent: &PaymentIntent) -> Result<RecordedPayment> {
        let mut loan = self
            .loans
            .find_loan(loan_id)
            .await?
            .ok_or(EngineError::LoanNotFound(loan_id))?;
        let now = self.clock.now();
        let records = prepare_records(&loan, intent, self.clock.today(), now)?;

        loan.history.extend(records.iter().cloned());
        let rollup = loan.refresh_rollup(self.partial_weight);

        let customer = store::rollup_customer(
            self.loans.as_ref(),
            loan.customer_id,
            std::slice::from_ref(&loan),
            now,
        )
        .await?;
        let audit: Vec<AuditEntry> = records
            .iter()
            .map(|r| AuditEntry::recorded(loan.id, loan.customer_id, r, now))
            .collect();

        let work = UnitOfWork::for_loan(loan)
            .with_customer(customer)
            .with_audit(audit);
        let loan = self
            .loans
            .commit(work)
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::LoanNotFound(loan_id))?;

        info!(
            loan_id = %loan.id,
            records = records.len(),
            paid_count = %rollup.paid_count,
            remaining = %rollup.remaining_balance,
            "payment recorded"
        );
        Ok(RecordedPayment { loan, records })
    }
}
