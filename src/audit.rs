use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loan::PaymentRecord;
use crate::primitives::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PaymentRecorded,
    PaymentEdited,
}

/// amount and status of a payment at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub amount: Money,
    pub status: PaymentStatus,
}

impl From<&PaymentRecord> for PaymentSnapshot {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            amount: record.amount,
            status: record.status,
        }
    }
}

/// Immutable record of a change to a loan's payment history.
/// Entries are only ever appended as part of the unit of work that made the
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub action: AuditAction,
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub payment_id: PaymentId,
    pub old: Option<PaymentSnapshot>,
    pub new: PaymentSnapshot,
    pub amount_difference: Money,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn recorded(
        loan_id: LoanId,
        customer_id: CustomerId,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            action: AuditAction::PaymentRecorded,
            loan_id,
            customer_id,
            payment_id: record.id,
            old: None,
            new: record.into(),
            amount_difference: record.amount,
            actor: record.collector.clone(),
            recorded_at: now,
        }
    }

    pub fn edited(
        loan_id: LoanId,
        customer_id: CustomerId,
        payment_id: PaymentId,
        old: PaymentSnapshot,
        new: PaymentSnapshot,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            action: AuditAction::PaymentEdited,
            loan_id,
            customer_id,
            payment_id,
            amount_difference: new.amount - old.amount,
            old: Some(old),
            new,
            actor: actor.into(),
            recorded_at: now,
        }
    }
}
