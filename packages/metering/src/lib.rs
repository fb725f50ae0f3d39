// ABOUTME: Usage metering for proxied requests
// ABOUTME: Buffered asynchronous collection and batch persistence of transactions

pub mod collector;
pub mod store;
pub mod types;

pub use collector::{BatchInsert, Collector};
pub use store::MeterStore;
pub use types::{Transaction, UsageQuery, UsageSummary};
