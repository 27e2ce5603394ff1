use chrono::NaiveDate;
use emi_ledger::{
    Cadence, ClockSource, CustomerId, EngineConfig, EngineError, InstallmentMode, Loan,
    LoanNumber, LoanParameters, LoanRequestKind, LoanStatus, MemoryLedger, MemoryStore, NewLoan,
    PaymentEngine, PaymentIntent, RequestStatus,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn engine() -> PaymentEngine {
    let config = EngineConfig::default()
        .with_clock(ClockSource::Test("2024-03-01T08:00:00Z".parse().unwrap()));
    PaymentEngine::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryLedger::new()),
    )
}

fn number(n: u8) -> LoanNumber {
    LoanNumber::new(n, 15).unwrap()
}

fn params() -> LoanParameters {
    LoanParameters {
        principal: dec!(6000),
        cadence: Cadence::Monthly,
        total_installments: 6,
        per_installment_amount: dec!(1000),
        mode: InstallmentMode::Fixed,
        emi_start_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
    }
}

async fn originate(engine: &PaymentEngine, customer_id: CustomerId, n: u8) -> Loan {
    engine
        .originate_loan(NewLoan {
            customer_id,
            loan_number: number(n),
            params: params(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_active_loan_holds_its_number() {
    let engine = engine();
    let customer_id = CustomerId::new();
    originate(&engine, customer_id, 1).await;

    let available = engine.available_loan_numbers(customer_id).await.unwrap();
    assert_eq!(available.len(), 14);
    assert!(!available.contains(&number(1)));

    let err = engine
        .originate_loan(NewLoan {
            customer_id,
            loan_number: number(1),
            params: params(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // numbers are per customer
    originate(&engine, CustomerId::new(), 1).await;
}

#[tokio::test]
async fn test_origination_validates_parameters() {
    let engine = engine();
    let mut bad = params();
    bad.per_installment_amount = dec!(0);
    let err = engine
        .originate_loan(NewLoan {
            customer_id: CustomerId::new(),
            loan_number: number(2),
            params: bad,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_only_one_pending_request_per_customer() {
    let engine = engine();
    let customer_id = CustomerId::new();

    let first = engine
        .submit_loan_request(customer_id, LoanRequestKind::Addition, number(2))
        .await
        .unwrap();
    assert_eq!(first.status, RequestStatus::Pending);
    assert!(
        !engine
            .available_loan_numbers(customer_id)
            .await
            .unwrap()
            .contains(&number(2))
    );

    let err = engine
        .submit_loan_request(customer_id, LoanRequestKind::Addition, number(3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PendingRequestExists(id) if id == customer_id));
    assert!(err.is_conflict());

    let resolved = engine.resolve_loan_request(first.id, false).await.unwrap();
    assert_eq!(resolved.status, RequestStatus::Rejected);
    assert!(resolved.resolved_at.is_some());

    engine
        .submit_loan_request(customer_id, LoanRequestKind::Addition, number(3))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_admit_exactly_one() {
    let engine = Arc::new(engine());
    let customer_id = CustomerId::new();

    let mut handles = Vec::new();
    for n in 1..=8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_loan_request(customer_id, LoanRequestKind::Addition, number(n))
                .await
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error {e}"),
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_renewal_requests_need_a_new_number() {
    let engine = engine();
    let customer_id = CustomerId::new();
    let loan = originate(&engine, customer_id, 5).await;

    let err = engine
        .submit_loan_request(
            customer_id,
            LoanRequestKind::Renewal { renewing: loan.id },
            number(5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine
        .submit_loan_request(
            customer_id,
            LoanRequestKind::Renewal { renewing: loan.id },
            number(6),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_renewal_supersedes_old_loan() {
    let engine = engine();
    let customer_id = CustomerId::new();
    let old = originate(&engine, customer_id, 5).await;
    engine
        .record_payment(old.id, PaymentIntent::paid("asha"))
        .await
        .unwrap();

    let same_number = engine
        .renew_loan(
            old.id,
            NewLoan {
                customer_id,
                loan_number: number(5),
                params: params(),
            },
        )
        .await;
    assert!(matches!(same_number, Err(EngineError::Validation(_))));

    let renewed = engine
        .renew_loan(
            old.id,
            NewLoan {
                customer_id,
                loan_number: number(6),
                params: params(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renewed.renewed_from, Some(old.id));
    assert_eq!(renewed.status, LoanStatus::Active);

    let old = engine.loan(old.id).await.unwrap();
    assert_eq!(old.status, LoanStatus::Renewed);
    assert!(old.history.len() == 1);

    // renewed loans drop out of the customer totals and free their number
    let summary = engine.customer_summary(customer_id).await.unwrap().unwrap();
    assert_eq!(summary.active_loans, 1);
    assert_eq!(summary.cumulative_paid, dec!(0));
    assert_eq!(summary.remaining_balance, dec!(6000));
    assert!(
        engine
            .available_loan_numbers(customer_id)
            .await
            .unwrap()
            .contains(&number(5))
    );

    let again = engine
        .renew_loan(
            old.id,
            NewLoan {
                customer_id,
                loan_number: number(7),
                params: params(),
            },
        )
        .await;
    assert!(matches!(again, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_schedule_table_through_engine() {
    let engine = engine();
    let mut p = params();
    p.cadence = Cadence::Weekly;
    p.total_installments = 10;
    p.mode = InstallmentMode::Custom {
        final_amount: dec!(1500),
    };
    let table = engine.compute_schedule(&p).unwrap();
    assert_eq!(table.total_due, dec!(10500));
    assert_eq!(table.installments.len(), 10);
    assert_eq!(
        table.installments[9].due_date,
        NaiveDate::from_ymd_opt(2024, 5, 7)
    );
}
