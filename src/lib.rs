//! # emi-ledger
//!
//! Installment (EMI) scheduling and payment reconciliation for a lending back
//! office.
//!
//! ## Features
//!
//! - **Schedules** - uniform installments or a distinct final installment,
//!   on a daily, weekly or monthly cadence
//! - **Payments** - full, partial and multi-installment advance payments
//! - **Edits** - corrections applied to the loan's embedded history and
//!   mirrored into a standalone ledger
//! - **Rollups** - loan and customer balances always recomputed from source
//! - **Testable time** - every timestamp comes from an injectable clock
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use emi_ledger::{
//!     Cadence, ClockSource, CustomerId, EngineConfig, InstallmentMode, LoanNumber,
//!     LoanParameters, MemoryLedger, MemoryStore, NewLoan, PaymentEngine, PaymentIntent,
//! };
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), emi_ledger::EngineError> {
//!     let config = EngineConfig::default()
//!         .with_clock(ClockSource::Test("2024-01-01T09:00:00Z".parse().unwrap()));
//!     let engine = PaymentEngine::new(
//!         config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryLedger::new()),
//!     );
//!
//!     let loan = engine
//!         .originate_loan(NewLoan {
//!             customer_id: CustomerId::new(),
//!             loan_number: LoanNumber::new(1, 15).unwrap(),
//!             params: LoanParameters {
//!                 principal: dec!(10000),
//!                 cadence: Cadence::Weekly,
//!                 total_installments: 10,
//!                 per_installment_amount: dec!(1000),
//!                 mode: InstallmentMode::Custom { final_amount: dec!(1500) },
//!                 emi_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!             },
//!         })
//!         .await?;
//!
//!     let result = engine
//!         .record_payment(loan.id, PaymentIntent::partial(dec!(600), "asha"))
//!         .await?;
//!     assert_eq!(result.loan.remaining_balance, dec!(9400));
//!     Ok(())
//! }
//! ```

pub mod advance;
pub mod aggregation;
pub mod allocation;
pub mod audit;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod loan;
pub mod outbox;
pub mod primitives;
pub mod recorder;
pub mod schedule;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use advance::{AdvanceInstallment, AdvanceSpan};
pub use aggregation::{CustomerAggregate, LoanRollup};
pub use allocation::{LoanRequest, LoanRequestKind, RequestStatus};
pub use audit::{AuditAction, AuditEntry, PaymentSnapshot};
pub use clock::{Clock, ClockControl, SafeClock, SharedClock, SystemClock, TestClock};
pub use config::{ClockSource, EngineConfig};
pub use engine::{EditResult, PaymentEngine, RecordResult};
pub use error::{EngineError, LedgerError, StoreError};
pub use ledger::{LedgerEntry, LedgerStore, MemoryLedger, SharedLedgerStore};
pub use loan::{AdvanceDetails, EditStamp, Loan, LoanParameters, NewLoan, PaymentRecord};
pub use outbox::{MirrorOutcome, MirrorTask, ReconcileReport};
pub use primitives::*;
pub use recorder::{AdvancePayment, PaymentIntent, SinglePayment};
pub use schedule::{ScheduleTable, ScheduledInstallment};
pub use store::{CustomerRollup, LoanStore, MemoryStore, SharedLoanStore, UnitOfWork};
pub use sync::EditPayment;
