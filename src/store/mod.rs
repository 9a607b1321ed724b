//! Stats persistence

pub mod rest;
pub mod stats;

pub use rest::RestClient;
pub use stats::{BotMatchStats, MatchRecord, RestStatsStore, StatsSink};
