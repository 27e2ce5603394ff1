use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monetary amount. All rollups are exact decimal sums.
pub type Money = Decimal;

macro_rules! entity_id {
    ($($name:ident),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl From<Uuid> for $name {
                fn from(id: Uuid) -> Self {
                    Self(id)
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

entity_id!(
    CustomerId,
    LoanId,
    PaymentId,
    PartialChainId,
    AdvanceGroupId,
    LoanRequestId,
    AuditEntryId,
);

/// Slot in a customer's fixed loan-number pool, rendered `L1`..`L15`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoanNumber(u8);

impl LoanNumber {
    /// Returns `None` when `n` falls outside `1..=pool_size`
    pub fn new(n: u8, pool_size: u8) -> Option<Self> {
        (1..=pool_size).contains(&n).then_some(Self(n))
    }

    pub fn pool(pool_size: u8) -> impl Iterator<Item = LoanNumber> {
        (1..=pool_size).map(LoanNumber)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for LoanNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl std::str::FromStr for LoanNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('L')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| *n > 0)
            .map(LoanNumber)
            .ok_or_else(|| format!("invalid loan number '{s}'"))
    }
}

impl TryFrom<String> for LoanNumber {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LoanNumber> for String {
    fn from(n: LoanNumber) -> Self {
        n.to_string()
    }
}

/// repayment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

/// how installment amounts are laid out across the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InstallmentMode {
    /// every installment is the same amount
    Fixed,
    /// all but the last share one amount, the last is `final_amount`
    Custom { final_amount: Money },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
    Partial,
    Advance,
    Due,
    Overdue,
}

impl PaymentStatus {
    /// Statuses that represent money actually collected
    pub fn is_payment(&self) -> bool {
        match self {
            PaymentStatus::Paid | PaymentStatus::Partial | PaymentStatus::Advance => true,
            PaymentStatus::Due | PaymentStatus::Overdue => false,
        }
    }

    /// Statuses that close their installment on their own
    pub fn settles_installment(&self) -> bool {
        match self {
            PaymentStatus::Paid | PaymentStatus::Advance => true,
            PaymentStatus::Partial | PaymentStatus::Due | PaymentStatus::Overdue => false,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Partial => "Partial",
            PaymentStatus::Advance => "Advance",
            PaymentStatus::Due => "Due",
            PaymentStatus::Overdue => "Overdue",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Completed,
    Defaulted,
    Renewed,
}
