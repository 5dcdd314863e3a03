pub mod admin_alerting;
pub mod currency;
pub mod signature;
