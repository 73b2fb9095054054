pub mod credentials;
pub mod diagnose;
pub mod ledger;
pub mod request;
