pub mod analyze;
pub mod loan;
pub mod returns;
pub mod schedule;
