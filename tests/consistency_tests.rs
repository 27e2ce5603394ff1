use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use emi_ledger::{
    AuditEntry, Cadence, ClockSource, CustomerAggregate, CustomerId, EngineConfig, EngineError,
    InstallmentMode, Loan, LoanId, LoanNumber, LoanParameters, LoanRequest, LoanRequestId,
    LoanRequestKind, LoanStore, MemoryLedger, MemoryStore, NewLoan, PaymentEngine, PaymentId,
    PaymentIntent, RequestStatus, StoreError, UnitOfWork,
};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

type Interleaved = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs a competing write just before the next commit reaches the store
#[derive(Clone)]
struct InterleavingStore {
    inner: MemoryStore,
    pending: Arc<Mutex<Option<Interleaved>>>,
}

impl InterleavingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn before_next_commit(&self, write: impl Future<Output = ()> + Send + 'static) {
        *self.pending.lock() = Some(Box::pin(write));
    }
}

#[async_trait]
impl LoanStore for InterleavingStore {
    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        self.inner.find_loan(id).await
    }

    async fn find_loan_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Loan>, StoreError> {
        self.inner.find_loan_by_payment(payment_id).await
    }

    async fn loans_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>, StoreError> {
        self.inner.loans_for_customer(customer_id).await
    }

    async fn customer_aggregate(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerAggregate>, StoreError> {
        self.inner.customer_aggregate(customer_id).await
    }

    async fn audit_trail(&self, payment_id: PaymentId) -> Result<Vec<AuditEntry>, StoreError> {
        self.inner.audit_trail(payment_id).await
    }

    async fn commit(&self, work: UnitOfWork) -> Result<Vec<Loan>, StoreError> {
        let pending = self.pending.lock().take();
        if let Some(write) = pending {
            write.await;
        }
        self.inner.commit(work).await
    }

    async fn insert_loan_request(&self, request: LoanRequest) -> Result<LoanRequest, StoreError> {
        self.inner.insert_loan_request(request).await
    }

    async fn resolve_loan_request(
        &self,
        id: LoanRequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<LoanRequest>, StoreError> {
        self.inner.resolve_loan_request(id, status, at).await
    }

    async fn loan_requests(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<LoanRequest>, StoreError> {
        self.inner.loan_requests(customer_id).await
    }
}

struct Harness {
    /// engine whose commits can be interleaved
    engine: PaymentEngine,
    /// engine writing straight to the same store
    other: PaymentEngine,
    store: MemoryStore,
    interleaving: InterleavingStore,
    customer_id: CustomerId,
}

fn config() -> EngineConfig {
    EngineConfig::default().with_clock(ClockSource::Test("2024-01-01T09:00:00Z".parse().unwrap()))
}

fn harness_with(config: EngineConfig) -> Harness {
    let store = MemoryStore::new();
    let interleaving = InterleavingStore::new(store.clone());
    let engine = PaymentEngine::new(
        config.clone(),
        Arc::new(interleaving.clone()),
        Arc::new(MemoryLedger::new()),
    );
    let other = PaymentEngine::new(config, Arc::new(store.clone()), Arc::new(MemoryLedger::new()));
    Harness {
        engine,
        other,
        store,
        interleaving,
        customer_id: CustomerId::new(),
    }
}

fn harness() -> Harness {
    harness_with(config())
}

fn number(n: u8) -> LoanNumber {
    LoanNumber::new(n, 15).unwrap()
}

fn new_loan(customer_id: CustomerId, n: u8) -> NewLoan {
    NewLoan {
        customer_id,
        loan_number: number(n),
        params: LoanParameters {
            principal: dec!(10000),
            cadence: Cadence::Monthly,
            total_installments: 10,
            per_installment_amount: dec!(1000),
            mode: InstallmentMode::Fixed,
            emi_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        },
    }
}

#[tokio::test]
async fn test_sibling_payment_during_commit_is_not_lost() {
    let h = harness();
    let a = h.other.originate_loan(new_loan(h.customer_id, 1)).await.unwrap();
    let b = h.other.originate_loan(new_loan(h.customer_id, 2)).await.unwrap();

    let (other, b_id) = (h.other.clone(), b.id);
    h.interleaving.before_next_commit(async move {
        other
            .record_payment(b_id, PaymentIntent::paid("ravi"))
            .await
            .unwrap();
    });
    let result = h
        .engine
        .record_payment(a.id, PaymentIntent::paid("asha"))
        .await
        .unwrap();
    assert_eq!(result.loan.cumulative_paid, dec!(1000));

    let b = h.engine.loan(b.id).await.unwrap();
    assert_eq!(b.cumulative_paid, dec!(1000));
    let summary = h.engine.customer_summary(h.customer_id).await.unwrap().unwrap();
    assert_eq!(summary.cumulative_paid, dec!(2000));
    assert_eq!(summary.remaining_balance, dec!(18000));
}

#[tokio::test]
async fn test_stale_customer_rollup_is_refused() {
    let h = harness_with(EngineConfig {
        conflict_retries: 0,
        ..config()
    });
    let a = h.other.originate_loan(new_loan(h.customer_id, 1)).await.unwrap();
    let b = h.other.originate_loan(new_loan(h.customer_id, 2)).await.unwrap();

    let (other, b_id) = (h.other.clone(), b.id);
    h.interleaving.before_next_commit(async move {
        other
            .record_payment(b_id, PaymentIntent::paid("ravi"))
            .await
            .unwrap();
    });
    let err = h
        .engine
        .record_payment(a.id, PaymentIntent::paid("asha"))
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error {err}");

    let a = h.engine.loan(a.id).await.unwrap();
    assert!(a.history.is_empty());
    let summary = h.engine.customer_summary(h.customer_id).await.unwrap().unwrap();
    assert_eq!(summary.cumulative_paid, dec!(1000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_on_sibling_loans() {
    let h = harness_with(EngineConfig {
        conflict_retries: 50,
        ..config()
    });
    let a = h.engine.originate_loan(new_loan(h.customer_id, 1)).await.unwrap();
    let b = h.engine.originate_loan(new_loan(h.customer_id, 2)).await.unwrap();

    let mut handles = Vec::new();
    for loan_id in [a.id, b.id, a.id, b.id, a.id, b.id, a.id, b.id] {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .record_payment(loan_id, PaymentIntent::paid("asha"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let loans = h.store.loans_for_customer(h.customer_id).await.unwrap();
    assert!(loans.iter().all(|l| l.cumulative_paid == dec!(4000)));
    let summary = h.engine.customer_summary(h.customer_id).await.unwrap().unwrap();
    assert_eq!(summary.cumulative_paid, dec!(8000));
    assert_eq!(summary.remaining_balance, dec!(12000));
}

#[tokio::test]
async fn test_number_claimed_during_origination_is_refused() {
    let h = harness();
    let other = h.other.clone();
    let customer_id = h.customer_id;
    h.interleaving.before_next_commit(async move {
        other.originate_loan(new_loan(customer_id, 3)).await.unwrap();
    });

    let err = h
        .engine
        .originate_loan(new_loan(h.customer_id, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "unexpected error {err}");

    let holding = h
        .store
        .loans_for_customer(h.customer_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.loan_number == number(3) && l.is_active())
        .count();
    assert_eq!(holding, 1);
}

#[tokio::test]
async fn test_store_refuses_a_second_active_loan_on_a_number() {
    let h = harness();
    h.engine.originate_loan(new_loan(h.customer_id, 4)).await.unwrap();

    let duplicate = Loan::originate(new_loan(h.customer_id, 4), Utc::now()).unwrap();
    let err = h
        .store
        .commit(UnitOfWork::for_loan(duplicate))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::LoanNumberTaken { loan_number, .. } if loan_number == number(4)
    ));
}

#[tokio::test]
async fn test_origination_respects_pending_requests() {
    let h = harness();
    h.engine
        .submit_loan_request(h.customer_id, LoanRequestKind::Addition, number(2))
        .await
        .unwrap();
    assert!(
        !h.engine
            .available_loan_numbers(h.customer_id)
            .await
            .unwrap()
            .contains(&number(2))
    );

    let err = h
        .engine
        .originate_loan(new_loan(h.customer_id, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // the store holds the same line when the engine check is bypassed
    let reserved = Loan::originate(new_loan(h.customer_id, 2), Utc::now()).unwrap();
    let err = h
        .store
        .commit(UnitOfWork::for_loan(reserved))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LoanNumberTaken { .. }));

    h.engine.originate_loan(new_loan(h.customer_id, 5)).await.unwrap();
}
