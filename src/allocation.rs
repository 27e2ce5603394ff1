//! Loan-number pool and the one-pending-request rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::loan::Loan;
use crate::primitives::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanRequestKind {
    Addition,
    Renewal { renewing: LoanId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A customer's request for a new or renewed loan awaiting a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub id: LoanRequestId,
    pub customer_id: CustomerId,
    pub kind: LoanRequestKind,
    pub loan_number: LoanNumber,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl LoanRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Numbers held by an active loan or reserved by a pending request
pub(crate) fn is_taken(number: LoanNumber, loans: &[Loan], requests: &[LoanRequest]) -> bool {
    loans
        .iter()
        .any(|l| l.loan_number == number && l.is_active())
        || requests
            .iter()
            .any(|r| r.loan_number == number && r.is_pending())
}

pub fn available_numbers(
    pool_size: u8,
    loans: &[Loan],
    requests: &[LoanRequest],
) -> Vec<LoanNumber> {
    LoanNumber::pool(pool_size)
        .filter(|n| !is_taken(*n, loans, requests))
        .collect()
}

/// Checks a request against the customer's current loans and requests
pub fn validate_request(
    pool_size: u8,
    kind: LoanRequestKind,
    number: LoanNumber,
    loans: &[Loan],
    requests: &[LoanRequest],
) -> Result<()> {
    if number.value() > pool_size {
        return Err(EngineError::validation(format!(
            "loan number {number} is outside the pool of {pool_size}"
        )));
    }
    if let Some(customer_id) = requests.iter().find(|r| r.is_pending()).map(|r| r.customer_id) {
        return Err(EngineError::PendingRequestExists(customer_id));
    }
    if let LoanRequestKind::Renewal { renewing } = kind {
        let renewed = loans
            .iter()
            .find(|l| l.id == renewing)
            .ok_or(EngineError::LoanNotFound(renewing))?;
        if renewed.loan_number == number {
            return Err(EngineError::validation(format!(
                "renewal must use a number other than {number}"
            )));
        }
    }
    if is_taken(number, loans, requests) {
        return Err(EngineError::validation(format!(
            "loan number {number} is not available"
        )));
    }
    Ok(())
}
