pub mod amortization;
pub mod tranches;
