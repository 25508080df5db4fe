pub mod auth;
pub mod checkout;
pub mod orders;
pub mod payments;
