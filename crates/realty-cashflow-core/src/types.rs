use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Used for solver outputs.
pub type Rate = Decimal;

/// Rates expressed as percentages (8.6 = 8.6%). Used for deal parameters.
pub type Percent = Decimal;

/// Month offset from deal start (month 0 = first disbursement).
pub type Month = u32;

/// Months per year, as used by every annualisation in the crate.
pub const MONTHS_PER_YEAR: u32 = 12;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    INR,
    USD,
    GBP,
    EUR,
    AED,
    SGD,
    CAD,
    AUD,
    Other(String),
}

/// Converts an annual percentage rate to the periodic monthly decimal rate.
pub(crate) fn monthly_rate(annual_rate: Percent) -> Rate {
    annual_rate / Decimal::from(MONTHS_PER_YEAR) / Decimal::ONE_HUNDRED
}

/// Converts a percentage (0–100) to a decimal rate.
pub(crate) fn pct_to_rate(pct: Percent) -> Rate {
    pct / Decimal::ONE_HUNDRED
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
