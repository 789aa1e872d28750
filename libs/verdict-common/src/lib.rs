pub mod config;
pub mod envelope;
pub mod redis;
pub mod types;
