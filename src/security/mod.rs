pub mod client;
pub mod config;
pub mod jwt;
pub mod rate_limit;
