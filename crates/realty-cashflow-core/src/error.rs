use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtyError {
    /// Invalid loan or scenario parameter (non-positive principal/term, negative rate, ...)
    #[error("Domain error: {field} — {reason}")]
    Domain { field: String, reason: String },

    /// Disbursement tranches that cannot form a valid schedule
    #[error("Invalid disbursement schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("No convergence: {function} found no root after {iterations} iterations (last NPV: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RealtyError {
    pub(crate) fn domain(field: &str, reason: impl Into<String>) -> Self {
        RealtyError::Domain {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schedule(reason: impl Into<String>) -> Self {
        RealtyError::InvalidSchedule {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for RealtyError {
    fn from(e: serde_json::Error) -> Self {
        RealtyError::SerializationError(e.to_string())
    }
}
