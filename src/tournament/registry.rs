//! Bot registry - everyone who joined, between tournaments

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::roster::RosterBot;

#[derive(Debug, Clone)]
struct RegisteredBot {
    name: String,
    password: String,
    color: String,
    action_url: Option<String>,
    /// Join sequence, for stable ordering
    seq: u64,
}

/// Public view of a registered bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSummary {
    pub name: String,
    pub color: String,
    pub has_url: bool,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Bot {0} already exists")]
    DuplicateName(String),

    #[error("Bot {0} not found")]
    NotFound(String),

    #[error("Invalid password")]
    InvalidPassword,
}

/// Registered bots keyed by name
pub struct BotRegistry {
    bots: DashMap<String, RegisteredBot>,
    next_seq: AtomicU64,
    host_password: String,
}

impl BotRegistry {
    pub fn new(host_password: impl Into<String>) -> Self {
        Self {
            bots: DashMap::new(),
            next_seq: AtomicU64::new(0),
            host_password: host_password.into(),
        }
    }

    pub fn join(&self, name: &str, password: &str, color: &str) -> Result<(), RegistryError> {
        match self.bots.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredBot {
                    name: name.to_string(),
                    password: password.to_string(),
                    color: color.to_string(),
                    action_url: None,
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                });
                info!(bot = %name, color = %color, "Bot joined");
                Ok(())
            }
        }
    }

    /// Accepts either the bot's own password or the host password
    pub fn set_action_url(&self, name: &str, password: &str, url: &str) -> Result<(), RegistryError> {
        let mut bot = self
            .bots
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if password != bot.password && password != self.host_password {
            return Err(RegistryError::InvalidPassword);
        }

        bot.action_url = Some(url.to_string());
        info!(bot = %name, "Controller address set");
        Ok(())
    }

    /// Returns false when nothing was registered under `name`
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.bots.remove(name).is_some();
        if removed {
            info!(bot = %name, "Bot removed");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<BotSummary> {
        self.bots.get(name).map(|bot| summary(&bot))
    }

    /// All bots in join order
    pub fn list(&self) -> Vec<BotSummary> {
        self.ordered().iter().map(summary).collect()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    /// Roster for a new tournament, in join order
    pub fn roster_bots(&self) -> Vec<RosterBot> {
        self.ordered()
            .into_iter()
            .map(|bot| RosterBot {
                name: bot.name,
                color: bot.color,
                action_url: bot.action_url,
            })
            .collect()
    }

    fn ordered(&self) -> Vec<RegisteredBot> {
        let mut bots: Vec<RegisteredBot> = self.bots.iter().map(|e| e.value().clone()).collect();
        bots.sort_by_key(|b| b.seq);
        bots
    }
}

fn summary(bot: &RegisteredBot) -> BotSummary {
    BotSummary {
        name: bot.name.clone(),
        color: bot.color.clone(),
        has_url: bot.action_url.is_some(),
    }
}
