use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::primitives::*;

/// Repayment schedule parameters fixed at origination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanParameters {
    pub principal: Money,
    pub cadence: Cadence,
    pub total_installments: u32,
    pub per_installment_amount: Money,
    pub mode: InstallmentMode,
    /// due date of installment 1
    pub emi_start_date: NaiveDate,
}

impl LoanParameters {
    pub fn validate(&self) -> Result<()> {
        if self.total_installments == 0 {
            return Err(EngineError::validation(
                "total installments must be greater than zero",
            ));
        }
        if self.per_installment_amount <= Decimal::ZERO {
            return Err(EngineError::validation(
                "per-installment amount must be positive",
            ));
        }
        if self.principal <= Decimal::ZERO {
            return Err(EngineError::validation("principal must be positive"));
        }
        if let Some(final_amount) = self.final_override() {
            if final_amount <= Decimal::ZERO {
                return Err(EngineError::validation(
                    "final installment amount must be positive",
                ));
            }
        }
        Ok(())
    }

    /// The override for the last installment, if one applies.
    /// Daily loans never carry one even when configured as custom.
    pub fn final_override(&self) -> Option<Money> {
        match (self.mode, self.cadence) {
            (_, Cadence::Daily) => None,
            (InstallmentMode::Fixed, _) => None,
            (InstallmentMode::Custom { final_amount }, _) => Some(final_amount),
        }
    }
}

/// Request to originate a loan
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub customer_id: CustomerId,
    pub loan_number: LoanNumber,
    pub params: LoanParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub customer_id: CustomerId,
    pub loan_number: LoanNumber,
    pub params: LoanParameters,

    pub paid_count: Decimal,
    pub cumulative_paid: Money,
    pub remaining_balance: Money,
    pub next_due_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    pub status: LoanStatus,

    pub history: Vec<PaymentRecord>,

    pub renewed_from: Option<LoanId>,
    pub created_at: DateTime<Utc>,
    /// bumped by the store on every committed write
    pub version: u64,
}

impl Loan {
    pub fn originate(new_loan: NewLoan, now: DateTime<Utc>) -> Result<Self> {
        new_loan.params.validate()?;
        Ok(Self {
            id: LoanId::new(),
            customer_id: new_loan.customer_id,
            loan_number: new_loan.loan_number,
            paid_count: Decimal::ZERO,
            cumulative_paid: Decimal::ZERO,
            remaining_balance: new_loan.params.principal,
            next_due_date: Some(new_loan.params.emi_start_date),
            last_payment_date: None,
            status: LoanStatus::Active,
            history: Vec::new(),
            renewed_from: None,
            created_at: now,
            version: 0,
            params: new_loan.params,
        })
    }

    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRecord> {
        self.history.iter().find(|p| p.id == id)
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Option<&mut PaymentRecord> {
        self.history.iter_mut().find(|p| p.id == id)
    }

    /// Records that target the given installment, in history order
    pub fn records_for_installment(&self, index: u32) -> impl Iterator<Item = &PaymentRecord> {
        self.history
            .iter()
            .filter(move |p| p.installment_index == index)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// A single payment in a loan's embedded history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_date: NaiveDate,
    pub installment_index: u32,
    pub collector: String,
    pub notes: Option<String>,
    pub advance: Option<AdvanceDetails>,
    pub chain_id: Option<PartialChainId>,
    pub recorded_at: DateTime<Utc>,
    pub edited: Option<EditStamp>,
}

impl PaymentRecord {
    /// Append rather than replace, keeping earlier remarks
    pub fn append_notes(&mut self, notes: &str) {
        let notes = notes.trim();
        if notes.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{notes}"),
            _ => notes.to_string(),
        });
    }
}

/// Originating details for a record settled as part of an advance payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceDetails {
    pub group_id: AdvanceGroupId,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub installments_covered: u32,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditStamp {
    pub edited_at: DateTime<Utc>,
    pub edited_by: String,
}
