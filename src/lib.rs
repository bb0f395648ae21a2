pub mod chain;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod rewards;
pub mod store;
pub mod workers;
