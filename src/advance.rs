use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loan::{LoanParameters, PaymentRecord};
use crate::primitives::{Cadence, Money};
use crate::schedule;

/// installment settled by an advance payment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvanceInstallment {
    pub index: u32,
    pub amount: Money,
    pub is_final_override: bool,
}

/// breakdown of an advance payment over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceSpan {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// installments the range covers before truncation
    pub requested: u32,
    pub installments: Vec<AdvanceInstallment>,
    pub total_amount: Money,
}

impl AdvanceSpan {
    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        (self.installments.len() as u32) < self.requested
    }
}

/// Number of installments an inclusive date range covers for a cadence.
/// A reversed range covers nothing.
pub fn span_length(cadence: Cadence, from: NaiveDate, to: NaiveDate) -> u32 {
    if to < from {
        return 0;
    }
    let days = (to - from).num_days();
    let periods = match cadence {
        Cadence::Daily => days + 1,
        Cadence::Weekly => days / 7 + 1,
        Cadence::Monthly => {
            let months = i64::from(to.year() - from.year()) * 12
                + i64::from(to.month()) - i64::from(from.month());
            (months + 1).max(1)
        }
    };
    u32::try_from(periods).unwrap_or(u32::MAX)
}

/// Installments an advance over `from..=to` would settle, starting at the
/// next unsettled installment. Stops at the end of the schedule.
pub fn compute_advance_span(
    params: &LoanParameters,
    history: &[PaymentRecord],
    from: NaiveDate,
    to: NaiveDate,
) -> AdvanceSpan {
    let requested = span_length(params.cadence, from, to);
    let start = schedule::next_installment_index(params, history);

    let installments: Vec<AdvanceInstallment> = (start..)
        .take(requested as usize)
        .take_while(|index| *index <= params.total_installments)
        .map(|index| AdvanceInstallment {
            index,
            amount: schedule::due_amount_for_installment(params, index),
            is_final_override: schedule::is_final_override(params, index),
        })
        .collect();
    let total_amount = installments
        .iter()
        .fold(Decimal::ZERO, |acc, i| acc + i.amount);

    debug!(
        requested,
        start,
        covered = installments.len(),
        %total_amount,
        "computed advance span"
    );

    AdvanceSpan {
        from_date: from,
        to_date: to,
        requested,
        installments,
        total_amount,
    }
}
