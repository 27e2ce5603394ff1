use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Clock configuration for different environments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// Use system time (production)
    #[default]
    System,
    /// Use a controllable clock starting at the given instant
    Test(DateTime<Utc>),
    /// Use a controllable clock starting at the current system time
    TestNow,
}

impl ClockSource {
    /// Create from environment variables
    /// - EMI_CLOCK: "system" (default) or "test"
    /// - EMI_CLOCK_START: RFC3339 timestamp for test mode start time
    pub fn from_env() -> Self {
        match std::env::var("EMI_CLOCK").as_deref() {
            Ok("test") => match std::env::var("EMI_CLOCK_START") {
                Ok(start) => match DateTime::parse_from_rfc3339(&start) {
                    Ok(start) => ClockSource::Test(start.with_timezone(&Utc)),
                    Err(e) => {
                        tracing::warn!(error = %e, "invalid EMI_CLOCK_START, using current time");
                        ClockSource::TestNow
                    }
                },
                Err(_) => ClockSource::TestNow,
            },
            _ => ClockSource::System,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub clock: ClockSource,
    /// How many times a unit of work is re-run after a version conflict
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
    #[serde(default = "default_loan_number_pool")]
    pub loan_number_pool: u8,
    /// Weight a partial record contributes to the paid-installment count
    #[serde(default = "default_partial_weight")]
    pub partial_weight: Decimal,
}

impl EngineConfig {
    /// Build from environment variables, falling back to defaults
    /// - EMI_CONFLICT_RETRIES: retry budget for conflicting edits
    /// - EMI_CLOCK / EMI_CLOCK_START: see [`ClockSource::from_env`]
    pub fn from_env() -> Self {
        let conflict_retries = std::env::var("EMI_CONFLICT_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_conflict_retries);
        EngineConfig {
            clock: ClockSource::from_env(),
            conflict_retries,
            ..Default::default()
        }
    }

    pub fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            clock: ClockSource::default(),
            conflict_retries: default_conflict_retries(),
            loan_number_pool: default_loan_number_pool(),
            partial_weight: default_partial_weight(),
        }
    }
}

fn default_conflict_retries() -> u32 {
    3
}

fn default_loan_number_pool() -> u8 {
    15
}

fn default_partial_weight() -> Decimal {
    dec!(0.5)
}
