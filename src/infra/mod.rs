pub mod accounts;
pub mod db;
pub mod memory;
pub mod oauth;
pub mod refresh_tokens;
