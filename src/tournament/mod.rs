//! Bot registry, tournament roster and the match sequencer

pub mod registry;
pub mod roster;
pub mod service;

pub use registry::{BotRegistry, BotSummary, RegistryError};
pub use roster::BotStanding;
pub use service::{TournamentError, TournamentService};
