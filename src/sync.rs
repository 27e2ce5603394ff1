//! Edits to an existing payment.
//!
//! The embedded record is the source of truth: it is changed in place, the
//! loan and customer rollups are rebuilt from scratch and the change is
//! audited, all in a single commit. The standalone ledger is brought in line
//! afterwards by [`LedgerMirror`](crate::outbox::LedgerMirror).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::aggregation::CustomerAggregate;
use crate::audit::{AuditEntry, PaymentSnapshot};
use crate::clock::SafeClock;
use crate::error::{EngineError, Result};
use crate::loan::{EditStamp, Loan, PaymentRecord};
use crate::primitives::*;
use crate::schedule;
use crate::store::{self, SharedLoanStore, UnitOfWork};

/// Correction to a previously recorded payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPayment {
    pub payment_id: PaymentId,
    pub loan_number: LoanNumber,
    pub customer_id: CustomerId,
    pub new_amount: Money,
    pub new_status: PaymentStatus,
    pub notes: Option<String>,
    pub edited_by: String,
}

impl EditPayment {
    fn validate(&self) -> Result<()> {
        if self.new_amount <= Decimal::ZERO {
            return Err(EngineError::validation("payment amount must be positive"));
        }
        if !self.new_status.is_payment() {
            return Err(EngineError::validation(format!(
                "{} is not a payment status",
                self.new_status
            )));
        }
        if self.edited_by.trim().is_empty() {
            return Err(EngineError::validation("editor is required"));
        }
        Ok(())
    }
}

/// Primary state after a committed edit
#[derive(Debug, Clone)]
pub struct CommittedEdit {
    pub loan: Loan,
    pub record: PaymentRecord,
    pub amount_difference: Money,
    pub customer: CustomerAggregate,
    pub audit: AuditEntry,
}

#[derive(Clone)]
pub struct LedgerSynchronizer {
    loans: SharedLoanStore,
    clock: SafeClock,
    partial_weight: Decimal,
}

impl LedgerSynchronizer {
    pub fn new(loans: SharedLoanStore, clock: SafeClock, partial_weight: Decimal) -> Self {
        Self {
            loans,
            clock,
            partial_weight,
        }
    }

    async fn locate(&self, edit: &EditPayment) -> Result<Loan> {
        match self.loans.find_loan_by_payment(edit.payment_id).await? {
            Some(loan)
                if loan.customer_id == edit.customer_id
                    && loan.loan_number == edit.loan_number =>
            {
                Ok(loan)
            }
            _ => {
                let has_loan = self
                    .loans
                    .loans_for_customer(edit.customer_id)
                    .await?
                    .iter()
                    .any(|l| l.loan_number == edit.loan_number);
                if has_loan {
                    Err(EngineError::PaymentNotFound(edit.payment_id))
                } else {
                    Err(EngineError::LoanNumberNotFound {
                        customer_id: edit.customer_id,
                        loan_number: edit.loan_number,
                    })
                }
            }
        }
    }

    /// One attempt at the edit unit of work. Nothing is persisted unless
    /// every step succeeds.
    #[instrument(
        name = "emi.sync.edit",
        skip(self, edit),
        fields(payment_id = %edit.payment_id, loan_number = %edit.loan_number),
        err
    )]
    pub async fn edit(&self, edit: &EditPayment) -> Result<CommittedEdit> {
        edit.validate()?;
        let mut loan = self.locate(edit).await?;
        let now = self.clock.now();

        let existing = loan
            .payment(edit.payment_id)
            .ok_or(EngineError::PaymentNotFound(edit.payment_id))?;
        let index = existing.installment_index;
        let old = PaymentSnapshot::from(existing);

        if edit.new_status == PaymentStatus::Partial {
            let due = schedule::due_amount_for_installment(&loan.params, index);
            if edit.new_amount >= due {
                return Err(EngineError::validation(format!(
                    "partial amount {} must be below the {due} due on installment {index}",
                    edit.new_amount
                )));
            }
        }
        let chain_id = match edit.new_status {
            PaymentStatus::Partial => Some(
                loan.records_for_installment(index)
                    .find_map(|r| r.chain_id)
                    .unwrap_or_else(PartialChainId::new),
            ),
            PaymentStatus::Paid
            | PaymentStatus::Advance
            | PaymentStatus::Due
            | PaymentStatus::Overdue => existing.chain_id,
        };

        let record = loan
            .payment_mut(edit.payment_id)
            .ok_or(EngineError::PaymentNotFound(edit.payment_id))?;
        record.amount = edit.new_amount;
        record.status = edit.new_status;
        record.chain_id = chain_id;
        record.edited = Some(EditStamp {
            edited_at: now,
            edited_by: edit.edited_by.clone(),
        });
        if let Some(notes) = &edit.notes {
            record.append_notes(notes);
        }
        let record = record.clone();
        loan.refresh_rollup(self.partial_weight);

        let rollup = store::rollup_customer(
            self.loans.as_ref(),
            loan.customer_id,
            std::slice::from_ref(&loan),
            now,
        )
        .await?;
        let audit = AuditEntry::edited(
            loan.id,
            loan.customer_id,
            record.id,
            old,
            PaymentSnapshot::from(&record),
            edit.edited_by.clone(),
            now,
        );

        let work = UnitOfWork::for_loan(loan)
            .with_customer(rollup.clone())
            .with_audit([audit.clone()]);
        let loan = self
            .loans
            .commit(work)
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::PaymentNotFound(edit.payment_id))?;

        info!(
            loan_id = %loan.id,
            amount_difference = %audit.amount_difference,
            cumulative_paid = %loan.cumulative_paid,
            "payment edited"
        );
        Ok(CommittedEdit {
            amount_difference: audit.amount_difference,
            loan,
            record,
            customer: rollup.aggregate,
            audit,
        })
    }
}
