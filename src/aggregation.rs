//! Loan and customer rollups, always rebuilt from the full history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::loan::{Loan, LoanParameters, PaymentRecord};
use crate::primitives::{CustomerId, LoanStatus, Money, PaymentStatus};
use crate::schedule;

#[derive(Debug, Clone, PartialEq)]
pub struct LoanRollup {
    pub cumulative_paid: Money,
    pub remaining_balance: Money,
    pub paid_count: Decimal,
    pub last_payment_date: Option<NaiveDate>,
    pub next_installment_index: u32,
    pub next_due_date: Option<NaiveDate>,
    pub fully_settled: bool,
}

pub fn loan_rollup(
    params: &LoanParameters,
    history: &[PaymentRecord],
    partial_weight: Decimal,
) -> LoanRollup {
    let cumulative_paid = history
        .iter()
        .fold(Decimal::ZERO, |acc, p| acc + p.amount);

    let (full, partial) = history.iter().fold((0u32, 0u32), |(full, partial), p| {
        match p.status {
            PaymentStatus::Paid | PaymentStatus::Advance => (full + 1, partial),
            PaymentStatus::Partial => (full, partial + 1),
            PaymentStatus::Due | PaymentStatus::Overdue => (full, partial),
        }
    });
    let paid_count = Decimal::from(full) + partial_weight * Decimal::from(partial);

    let next_installment_index = schedule::next_installment_index(params, history);
    let fully_settled = next_installment_index > params.total_installments;
    let next_due_date = if fully_settled {
        None
    } else {
        schedule::due_date_for_installment(params, next_installment_index)
    };

    LoanRollup {
        cumulative_paid,
        remaining_balance: (params.principal - cumulative_paid).max(Decimal::ZERO),
        paid_count,
        last_payment_date: history.iter().map(|p| p.payment_date).max(),
        next_installment_index,
        next_due_date,
        fully_settled,
    }
}

impl Loan {
    /// Recompute every derived field from `history` and move between
    /// `Active` and `Completed` as settlement dictates.
    pub fn refresh_rollup(&mut self, partial_weight: Decimal) -> LoanRollup {
        let rollup = loan_rollup(&self.params, &self.history, partial_weight);
        self.cumulative_paid = rollup.cumulative_paid;
        self.remaining_balance = rollup.remaining_balance;
        self.paid_count = rollup.paid_count;
        self.last_payment_date = rollup.last_payment_date;
        self.next_due_date = rollup.next_due_date;
        self.status = match (self.status, rollup.fully_settled) {
            (LoanStatus::Active, true) => LoanStatus::Completed,
            (LoanStatus::Completed, false) => LoanStatus::Active,
            (status, _) => status,
        };
        rollup
    }
}

/// customer-level totals across active loans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub customer_id: CustomerId,
    pub cumulative_paid: Money,
    pub remaining_balance: Money,
    pub last_payment_date: Option<NaiveDate>,
    pub active_loans: u32,
    pub updated_at: DateTime<Utc>,
}

pub fn customer_aggregate<'a>(
    customer_id: CustomerId,
    loans: impl IntoIterator<Item = &'a Loan>,
    now: DateTime<Utc>,
) -> CustomerAggregate {
    let mut aggregate = CustomerAggregate {
        customer_id,
        cumulative_paid: Decimal::ZERO,
        remaining_balance: Decimal::ZERO,
        last_payment_date: None,
        active_loans: 0,
        updated_at: now,
    };
    for loan in loans
        .into_iter()
        .filter(|l| l.customer_id == customer_id && l.is_active())
    {
        aggregate.cumulative_paid += loan.cumulative_paid;
        aggregate.remaining_balance += loan.remaining_balance;
        aggregate.last_payment_date = aggregate.last_payment_date.max(loan.last_payment_date);
        aggregate.active_loans += 1;
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::NewLoan;
    use crate::primitives::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(index: u32, amount: Money, status: PaymentStatus, day: u32) -> PaymentRecord {
        PaymentRecord {
            id: PaymentId::new(),
            amount,
            status,
            payment_date: date(2024, 1, day),
            installment_index: index,
            collector: "asha".to_string(),
            notes: None,
            advance: None,
            chain_id: None,
            recorded_at: Utc::now(),
            edited: None,
        }
    }

    fn loan(customer_id: CustomerId) -> Loan {
        Loan::originate(
            NewLoan {
                customer_id,
                loan_number: LoanNumber::new(1, 15).unwrap(),
                params: LoanParameters {
                    principal: dec!(3000),
                    cadence: Cadence::Daily,
                    total_installments: 3,
                    per_installment_amount: dec!(1000),
                    mode: InstallmentMode::Fixed,
                    emi_start_date: date(2024, 1, 1),
                },
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rollup_counts_partials_at_half_weight() {
        let l = loan(CustomerId::new());
        let history = vec![
            record(1, dec!(1000), PaymentStatus::Paid, 1),
            record(2, dec!(400), PaymentStatus::Partial, 3),
        ];
        let rollup = loan_rollup(&l.params, &history, dec!(0.5));
        assert_eq!(rollup.cumulative_paid, dec!(1400));
        assert_eq!(rollup.remaining_balance, dec!(1600));
        assert_eq!(rollup.paid_count, dec!(1.5));
        assert_eq!(rollup.last_payment_date, Some(date(2024, 1, 3)));
        assert_eq!(rollup.next_installment_index, 2);
        assert_eq!(rollup.next_due_date, Some(date(2024, 1, 2)));
    }

    #[test]
    fn remaining_balance_never_goes_negative() {
        let l = loan(CustomerId::new());
        let history = vec![record(1, dec!(5000), PaymentStatus::Paid, 1)];
        let rollup = loan_rollup(&l.params, &history, dec!(0.5));
        assert_eq!(rollup.remaining_balance, dec!(0));
    }

    #[test]
    fn refresh_moves_between_active_and_completed() {
        let mut l = loan(CustomerId::new());
        l.history = (1..=3)
            .map(|i| record(i, dec!(1000), PaymentStatus::Paid, i))
            .collect();
        l.refresh_rollup(dec!(0.5));
        assert_eq!(l.status, LoanStatus::Completed);
        assert_eq!(l.next_due_date, None);

        l.history[2].status = PaymentStatus::Partial;
        l.history[2].amount = dec!(200);
        l.refresh_rollup(dec!(0.5));
        assert_eq!(l.status, LoanStatus::Active);
        assert_eq!(l.next_due_date, Some(date(2024, 1, 3)));

        l.status = LoanStatus::Defaulted;
        l.refresh_rollup(dec!(0.5));
        assert_eq!(l.status, LoanStatus::Defaulted);
    }

    #[test]
    fn customer_aggregate_sums_active_loans_only() {
        let customer_id = CustomerId::new();
        let mut a = loan(customer_id);
        a.history = vec![record(1, dec!(1000), PaymentStatus::Paid, 4)];
        a.refresh_rollup(dec!(0.5));
        let mut b = loan(customer_id);
        b.history = vec![record(1, dec!(500), PaymentStatus::Partial, 9)];
        b.refresh_rollup(dec!(0.5));
        let mut renewed = loan(customer_id);
        renewed.status = LoanStatus::Renewed;
        let other = loan(CustomerId::new());

        let agg = customer_aggregate(customer_id, [&a, &b, &renewed, &other], Utc::now());
        assert_eq!(agg.active_loans, 2);
        assert_eq!(agg.cumulative_paid, dec!(1500));
        assert_eq!(agg.remaining_balance, dec!(4500));
        assert_eq!(agg.last_payment_date, Some(date(2024, 1, 9)));
    }
}
