pub mod disbursement;
