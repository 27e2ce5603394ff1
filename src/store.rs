//! Primary document store: loans with their embedded history, customer
//! aggregates, the audit trail and loan requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::aggregation::{self, CustomerAggregate};
use crate::allocation::{LoanRequest, RequestStatus};
use crate::audit::AuditEntry;
use crate::error::StoreError;
use crate::loan::Loan;
use crate::primitives::*;

/// Type alias for a shared loan store
pub type SharedLoanStore = Arc<dyn LoanStore>;

/// Customer totals together with the loan versions they were summed from
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRollup {
    pub aggregate: CustomerAggregate,
    pub basis: Vec<(LoanId, u64)>,
}

impl CustomerRollup {
    fn version_of(&self, loan_id: LoanId) -> Option<u64> {
        self.basis
            .iter()
            .find(|(id, _)| *id == loan_id)
            .map(|(_, version)| *version)
    }
}

/// Writes that must land together or not at all.
///
/// Each loan carries the version it was read at; the commit fails with
/// [`StoreError::VersionConflict`] if any of them moved in the meantime.
/// The same holds for every sibling loan the customer rollup was summed
/// from, so the aggregate never overwrites a newer one.
/// A loan at version 0 that the store has never seen is inserted, provided
/// its number is not held or reserved for the customer.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    pub loans: Vec<Loan>,
    pub customer: Option<CustomerRollup>,
    pub audit: Vec<AuditEntry>,
}

impl UnitOfWork {
    pub fn for_loan(loan: Loan) -> Self {
        Self {
            loans: vec![loan],
            ..Default::default()
        }
    }

    pub fn with_customer(mut self, rollup: CustomerRollup) -> Self {
        self.customer = Some(rollup);
        self
    }

    pub fn with_audit(mut self, entries: impl IntoIterator<Item = AuditEntry>) -> Self {
        self.audit.extend(entries);
        self
    }
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError>;

    async fn find_loan_by_payment(&self, payment_id: PaymentId)
    -> Result<Option<Loan>, StoreError>;

    async fn loans_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>, StoreError>;

    async fn customer_aggregate(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerAggregate>, StoreError>;

    async fn audit_trail(&self, payment_id: PaymentId) -> Result<Vec<AuditEntry>, StoreError>;

    /// Atomically apply a unit of work, returning the loans as stored
    async fn commit(&self, work: UnitOfWork) -> Result<Vec<Loan>, StoreError>;

    /// Insert a request, failing if the customer already has one pending
    async fn insert_loan_request(&self, request: LoanRequest) -> Result<LoanRequest, StoreError>;

    async fn resolve_loan_request(
        &self,
        id: LoanRequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<LoanRequest>, StoreError>;

    async fn loan_requests(&self, customer_id: CustomerId)
    -> Result<Vec<LoanRequest>, StoreError>;
}

/// Customer totals after `updated` loans replace their stored versions
pub(crate) async fn rollup_customer(
    store: &dyn LoanStore,
    customer_id: CustomerId,
    updated: &[Loan],
    now: DateTime<Utc>,
) -> Result<CustomerRollup, StoreError> {
    let stored = store.loans_for_customer(customer_id).await?;
    // updated loans are pinned at the version they were read at
    let basis = stored
        .iter()
        .map(|l| {
            let version = updated
                .iter()
                .find(|u| u.id == l.id)
                .map_or(l.version, |u| u.version);
            (l.id, version)
        })
        .collect();
    let untouched = stored
        .iter()
        .filter(|l| !updated.iter().any(|u| u.id == l.id));
    Ok(CustomerRollup {
        aggregate: aggregation::customer_aggregate(
            customer_id,
            untouched.chain(updated.iter()),
            now,
        ),
        basis,
    })
}

#[derive(Debug, Default)]
struct MemoryState {
    loans: HashMap<LoanId, Loan>,
    customers: HashMap<CustomerId, CustomerAggregate>,
    audit: Vec<AuditEntry>,
    requests: Vec<LoanRequest>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    failing_commits: usize,
    conflicting_commits: usize,
}

/// In-process store; one write lock makes every commit atomic
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail before writing anything
    pub fn fail_next_commits(&self, n: usize) {
        self.state.write().faults.failing_commits = n;
    }

    /// Make the next `n` commits report a version conflict
    pub fn conflict_next_commits(&self, n: usize) {
        self.state.write().faults.conflicting_commits = n;
    }

    pub fn audit_len(&self) -> usize {
        self.state.read().audit.len()
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        Ok(self.state.read().loans.get(&id).cloned())
    }

    async fn find_loan_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Loan>, StoreError> {
        Ok(self
            .state
            .read()
            .loans
            .values()
            .find(|l| l.payment(payment_id).is_some())
            .cloned())
    }

    async fn loans_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>, StoreError> {
        let mut loans: Vec<Loan> = self
            .state
            .read()
            .loans
            .values()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.created_at);
        Ok(loans)
    }

    async fn customer_aggregate(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerAggregate>, StoreError> {
        Ok(self.state.read().customers.get(&customer_id).cloned())
    }

    async fn audit_trail(&self, payment_id: PaymentId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .state
            .read()
            .audit
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, work: UnitOfWork) -> Result<Vec<Loan>, StoreError> {
        let mut state = self.state.write();

        if state.faults.failing_commits > 0 {
            state.faults.failing_commits -= 1;
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        // validate every loan before touching anything
        for loan in &work.loans {
            match state.loans.get(&loan.id) {
                Some(stored) if stored.version != loan.version => {
                    return Err(StoreError::VersionConflict {
                        loan_id: loan.id,
                        expected: loan.version,
                        found: stored.version,
                    });
                }
                None if loan.version != 0 => {
                    return Err(StoreError::Unavailable(format!(
                        "loan {} vanished during unit of work",
                        loan.id
                    )));
                }
                _ => {}
            }
        }
        for loan in work.loans.iter().filter(|l| l.is_active()) {
            if state.loans.contains_key(&loan.id) {
                continue;
            }
            let held = state.loans.values().any(|stored| {
                stored.customer_id == loan.customer_id
                    && stored.loan_number == loan.loan_number
                    && stored.is_active()
                    && !work
                        .loans
                        .iter()
                        .any(|l| l.id == stored.id && !l.is_active())
            });
            let reserved = state.requests.iter().any(|r| {
                r.customer_id == loan.customer_id
                    && r.loan_number == loan.loan_number
                    && r.is_pending()
            });
            if held || reserved {
                return Err(StoreError::LoanNumberTaken {
                    customer_id: loan.customer_id,
                    loan_number: loan.loan_number,
                });
            }
        }
        if let Some(rollup) = &work.customer {
            let customer_id = rollup.aggregate.customer_id;
            for stored in state.loans.values().filter(|l| l.customer_id == customer_id) {
                let expected = rollup.version_of(stored.id);
                if expected != Some(stored.version) {
                    return Err(StoreError::VersionConflict {
                        loan_id: stored.id,
                        expected: expected.unwrap_or_default(),
                        found: stored.version,
                    });
                }
            }
        }
        if state.faults.conflicting_commits > 0 {
            state.faults.conflicting_commits -= 1;
            let loan = work.loans.first();
            return Err(StoreError::VersionConflict {
                loan_id: loan.map(|l| l.id).unwrap_or_else(LoanId::new),
                expected: loan.map(|l| l.version).unwrap_or_default(),
                found: loan.map(|l| l.version + 1).unwrap_or_default(),
            });
        }

        let mut committed = Vec::with_capacity(work.loans.len());
        for mut loan in work.loans {
            loan.version += 1;
            state.loans.insert(loan.id, loan.clone());
            committed.push(loan);
        }
        if let Some(rollup) = work.customer {
            state
                .customers
                .insert(rollup.aggregate.customer_id, rollup.aggregate);
        }
        state.audit.extend(work.audit);
        Ok(committed)
    }

    async fn insert_loan_request(&self, request: LoanRequest) -> Result<LoanRequest, StoreError> {
        let mut state = self.state.write();
        if state
            .requests
            .iter()
            .any(|r| r.customer_id == request.customer_id && r.is_pending())
        {
            return Err(StoreError::PendingRequestExists(request.customer_id));
        }
        state.requests.push(request.clone());
        Ok(request)
    }

    async fn resolve_loan_request(
        &self,
        id: LoanRequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<LoanRequest>, StoreError> {
        let mut state = self.state.write();
        Ok(state.requests.iter_mut().find(|r| r.id == id).map(|r| {
            r.status = status;
            r.resolved_at = Some(at);
            r.clone()
        }))
    }

    async fn loan_requests(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<LoanRequest>, StoreError> {
        Ok(self
            .state
            .read()
            .requests
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect())
    }
}
