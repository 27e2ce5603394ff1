use thiserror::Error;

use crate::primitives::{CustomerId, LoanId, LoanNumber, PaymentId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("EngineError - Validation: {0}")]
    Validation(String),
    #[error("EngineError - LoanNotFound: {0}")]
    LoanNotFound(LoanId),
    #[error("EngineError - LoanNumberNotFound: {customer_id} {loan_number}")]
    LoanNumberNotFound {
        customer_id: CustomerId,
        loan_number: LoanNumber,
    },
    #[error("EngineError - PaymentNotFound: {0}")]
    PaymentNotFound(PaymentId),
    #[error("EngineError - Conflict: {0}")]
    Conflict(String),
    #[error("EngineError - PendingRequestExists: {0}")]
    PendingRequestExists(CustomerId),
    #[error("EngineError - Store: {0}")]
    Store(#[from] StoreError),
    #[error("EngineError - Ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::LoanNotFound(_)
                | EngineError::LoanNumberNotFound { .. }
                | EngineError::PaymentNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict(_) | EngineError::PendingRequestExists(_)
        )
    }
}

/// Errors raised by the primary document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("StoreError - VersionConflict: loan {loan_id} expected v{expected}, found v{found}")]
    VersionConflict {
        loan_id: LoanId,
        expected: u64,
        found: u64,
    },
    #[error("StoreError - LoanNumberTaken: {customer_id} {loan_number}")]
    LoanNumberTaken {
        customer_id: CustomerId,
        loan_number: LoanNumber,
    },
    #[error("StoreError - PendingRequestExists: {0}")]
    PendingRequestExists(CustomerId),
    #[error("StoreError - Unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the standalone payment ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("LedgerError - Unavailable: {0}")]
    Unavailable(String),
    #[error("LedgerError - LoanMissing: {0}")]
    LoanMissing(LoanId),
    #[error("LedgerError - PaymentMissing: {0}")]
    PaymentMissing(PaymentId),
    #[error("LedgerError - Store: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
