pub mod aggregation;
pub mod projection;
