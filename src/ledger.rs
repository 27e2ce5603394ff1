//! Standalone payment ledger: a queryable projection of every loan's
//! embedded history, keyed by the same payment id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::loan::{AdvanceDetails, Loan, PaymentRecord};
use crate::primitives::*;

/// Type alias for a shared ledger store
pub type SharedLedgerStore = Arc<dyn LedgerStore>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: PaymentId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_date: NaiveDate,
    pub installment_index: u32,

    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub loan_number: LoanNumber,
    pub collector: String,
    pub notes: Option<String>,
    pub advance: Option<AdvanceDetails>,
    pub chain_id: Option<PartialChainId>,
    /// sum of every entry sharing `chain_id`
    pub chain_total: Option<Money>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_record(loan: &Loan, record: &PaymentRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            status: record.status,
            payment_date: record.payment_date,
            installment_index: record.installment_index,
            loan_id: loan.id,
            customer_id: loan.customer_id,
            loan_number: loan.loan_number,
            collector: record.collector.clone(),
            notes: record.notes.clone(),
            advance: record.advance.clone(),
            chain_id: record.chain_id,
            chain_total: None,
            updated_at: now,
        }
    }

    /// Bring an existing entry in line with its source record
    pub fn sync_from(&mut self, record: &PaymentRecord, now: DateTime<Utc>) {
        self.amount = record.amount;
        self.status = record.status;
        self.payment_date = record.payment_date;
        self.installment_index = record.installment_index;
        self.notes = record.notes.clone();
        self.advance = record.advance.clone();
        self.chain_id = record.chain_id;
        self.updated_at = now;
    }

    /// Field-for-field comparison of the shared identity and money fields
    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.id == record.id
            && self.amount == record.amount
            && self.status == record.status
            && self.payment_date == record.payment_date
            && self.installment_index == record.installment_index
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_entry(&self, id: PaymentId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Insert or replace by payment id
    async fn upsert_entry(&self, entry: LedgerEntry) -> Result<(), LedgerError>;

    async fn entries_for_loan(&self, loan_id: LoanId) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn entries_for_chain(
        &self,
        chain_id: PartialChainId,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Recompute and store the chain-wide total on every member entry
    async fn recompute_chain_totals(&self, chain_id: PartialChainId)
    -> Result<Money, LedgerError>;
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<RwLock<HashMap<PaymentId, LedgerEntry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop an entry out from under the projection
    pub fn remove_entry(&self, id: PaymentId) -> Option<LedgerEntry> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn find_entry(&self, id: PaymentId) -> Result<Option<LedgerEntry>, LedgerError> {
        self.check()?;
        Ok(self.entries.read().get(&id).cloned())
    }

    async fn upsert_entry(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.check()?;
        self.entries.write().insert(entry.id, entry);
        Ok(())
    }

    async fn entries_for_loan(&self, loan_id: LoanId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.check()?;
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.loan_id == loan_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.installment_index, e.payment_date));
        Ok(entries)
    }

    async fn entries_for_chain(
        &self,
        chain_id: PartialChainId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.check()?;
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.chain_id == Some(chain_id))
            .cloned()
            .collect())
    }

    async fn recompute_chain_totals(
        &self,
        chain_id: PartialChainId,
    ) -> Result<Money, LedgerError> {
        self.check()?;
        let mut entries = self.entries.write();
        let total = entries
            .values()
            .filter(|e| e.chain_id == Some(chain_id))
            .fold(Decimal::ZERO, |acc, e| acc + e.amount);
        for entry in entries.values_mut().filter(|e| e.chain_id == Some(chain_id)) {
            entry.chain_total = Some(total);
        }
        Ok(total)
    }
}
