pub mod config;
pub mod core;
pub mod distribution;
pub mod domain;
pub mod issuance;
pub mod prompt;
pub mod storage;
