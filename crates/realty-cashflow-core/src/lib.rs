pub mod analysis;
pub mod cashflow;
pub mod construction;
pub mod error;
pub mod loan;
pub mod returns;
pub mod scenario;
pub mod types;

pub use error::RealtyError;
pub use types::*;

/// Standard result type for all realty-cashflow operations
pub type RealtyResult<T> = Result<T, RealtyError>;
