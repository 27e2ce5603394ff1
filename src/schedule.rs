//! Installment amounts, due dates and settlement state.
//!
//! Everything here is pure arithmetic over [`LoanParameters`] and a loan's
//! ordered history. Nothing is cached on the loan: the next installment is
//! always derived from the records themselves.

use std::collections::BTreeMap;

use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::loan::{LoanParameters, PaymentRecord};
use crate::primitives::{Cadence, Money, PaymentStatus};

/// one row of a repayment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub index: u32,
    pub due_date: Option<NaiveDate>,
    pub amount: Money,
    pub is_final_override: bool,
}

/// full repayment schedule for a set of loan parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTable {
    pub total_due: Money,
    pub installments: Vec<ScheduledInstallment>,
}

/// Total amount repayable over the whole schedule
pub fn total_due(params: &LoanParameters) -> Money {
    let count = Decimal::from(params.total_installments);
    match params.final_override() {
        Some(final_amount) => {
            params.per_installment_amount * (count - Decimal::ONE) + final_amount
        }
        None => params.per_installment_amount * count,
    }
}

pub fn is_final_override(params: &LoanParameters, index: u32) -> bool {
    index == params.total_installments && params.final_override().is_some()
}

/// Amount due for the installment at `index` (1-based)
pub fn due_amount_for_installment(params: &LoanParameters, index: u32) -> Money {
    match params.final_override() {
        Some(final_amount) if index == params.total_installments => final_amount,
        _ => params.per_installment_amount,
    }
}

/// Move `date` forward by `periods` repayment periods. Months clamp to the
/// last day of a shorter month.
pub fn add_periods(date: NaiveDate, cadence: Cadence, periods: u32) -> Option<NaiveDate> {
    match cadence {
        Cadence::Daily => date.checked_add_days(Days::new(u64::from(periods))),
        Cadence::Weekly => date.checked_add_days(Days::new(u64::from(periods) * 7)),
        Cadence::Monthly => date.checked_add_months(Months::new(periods)),
    }
}

pub fn due_date_for_installment(params: &LoanParameters, index: u32) -> Option<NaiveDate> {
    add_periods(
        params.emi_start_date,
        params.cadence,
        index.saturating_sub(1),
    )
}

pub fn compute_schedule(params: &LoanParameters) -> Result<ScheduleTable> {
    params.validate()?;
    let installments = (1..=params.total_installments)
        .map(|index| ScheduledInstallment {
            index,
            due_date: due_date_for_installment(params, index),
            amount: due_amount_for_installment(params, index),
            is_final_override: is_final_override(params, index),
        })
        .collect();
    Ok(ScheduleTable {
        total_due: total_due(params),
        installments,
    })
}

/// What has been collected against one installment so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstallmentProgress {
    pub collected: Money,
    pub partial_collected: Money,
    pub closed_by_payment: bool,
}

impl InstallmentProgress {
    pub fn is_settled(&self, due: Money) -> bool {
        self.closed_by_payment || self.partial_collected >= due
    }
}

/// Per-installment progress derived from the history
pub fn installment_progress(history: &[PaymentRecord]) -> BTreeMap<u32, InstallmentProgress> {
    let mut progress: BTreeMap<u32, InstallmentProgress> = BTreeMap::new();
    for record in history {
        let entry = progress.entry(record.installment_index).or_default();
        match record.status {
            PaymentStatus::Paid | PaymentStatus::Advance => {
                entry.collected += record.amount;
                entry.closed_by_payment = true;
            }
            PaymentStatus::Partial => {
                entry.collected += record.amount;
                entry.partial_collected += record.amount;
            }
            PaymentStatus::Due | PaymentStatus::Overdue => {}
        }
    }
    progress
}

/// Lowest installment not yet settled. Returns `total_installments + 1`
/// once the whole schedule is settled.
pub fn next_installment_index(params: &LoanParameters, history: &[PaymentRecord]) -> u32 {
    let progress = installment_progress(history);
    (1..=params.total_installments)
        .find(|index| {
            !progress
                .get(index)
                .is_some_and(|p| p.is_settled(due_amount_for_installment(params, *index)))
        })
        .unwrap_or(params.total_installments + 1)
}

/// Amount still owed on `index` after any partial payments against it
pub fn outstanding_on_installment(
    params: &LoanParameters,
    history: &[PaymentRecord],
    index: u32,
) -> Money {
    let due = due_amount_for_installment(params, index);
    match installment_progress(history).get(&index) {
        Some(p) if p.is_settled(due) => Decimal::ZERO,
        Some(p) => due - p.partial_collected,
        None => due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::InstallmentMode;
    use rust_decimal_macros::dec;

    fn weekly_custom() -> LoanParameters {
        LoanParameters {
            principal: dec!(10000),
            cadence: Cadence::Weekly,
            total_installments: 10,
            per_installment_amount: dec!(1000),
            mode: InstallmentMode::Custom {
                final_amount: dec!(1500),
            },
            emi_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn custom_total_uses_final_override() {
        assert_eq!(total_due(&weekly_custom()), dec!(10500));

        let mut monthly = weekly_custom();
        monthly.cadence = Cadence::Monthly;
        assert_eq!(total_due(&monthly), dec!(10500));
    }

    #[test]
    fn fixed_and_daily_totals_are_uniform() {
        let mut p = weekly_custom();
        p.mode = InstallmentMode::Fixed;
        assert_eq!(total_due(&p), dec!(10000));

        let mut daily = weekly_custom();
        daily.cadence = Cadence::Daily;
        assert_eq!(total_due(&daily), dec!(10000));
    }

    #[test]
    fn final_override_only_on_last_index() {
        let p = weekly_custom();
        for index in 1..=p.total_installments {
            let expected = if index == 10 { dec!(1500) } else { dec!(1000) };
            assert_eq!(due_amount_for_installment(&p, index), expected, "index {index}");
            assert_eq!(is_final_override(&p, index), index == 10);
        }

        let mut daily = p.clone();
        daily.cadence = Cadence::Daily;
        for index in 1..=daily.total_installments {
            assert_eq!(due_amount_for_installment(&daily, index), dec!(1000));
        }
    }

    #[test]
    fn schedule_table_lists_due_dates() {
        let mut p = weekly_custom();
        p.cadence = Cadence::Monthly;
        p.emi_start_date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let table = compute_schedule(&p).unwrap();

        assert_eq!(table.installments.len(), 10);
        assert_eq!(table.total_due, dec!(10500));
        assert_eq!(
            table.installments[1].due_date,
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            table.installments[2].due_date,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
        assert!(table.installments[9].is_final_override);
        let sum: Money = table.installments.iter().map(|i| i.amount).sum();
        assert_eq!(sum, table.total_due);
    }

    #[test]
    fn schedule_rejects_zero_installments() {
        let mut p = weekly_custom();
        p.total_installments = 0;
        assert!(compute_schedule(&p).is_err());
    }

    #[test]
    fn weekly_periods_step_seven_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            add_periods(start, Cadence::Weekly, 2),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(add_periods(start, Cadence::Daily, 0), Some(start));
    }
}
