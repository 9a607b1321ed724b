//! Tournament roster - ordered bots with cumulative scores

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Bot as handed to a new tournament
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterBot {
    pub name: String,
    pub color: String,
    pub action_url: Option<String>,
}

/// Public score line of one bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStanding {
    pub name: String,
    pub color: String,
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug)]
struct RosterEntry {
    bot: RosterBot,
    kills: u32,
    deaths: u32,
}

/// Roster shared by a tournament, its matches and the HTTP layer.
///
/// Entry order is fixed at construction and doubles as the tank index inside
/// every match. Counters only grow.
#[derive(Debug)]
pub struct Roster {
    entries: RwLock<Vec<RosterEntry>>,
}

impl Roster {
    pub fn new(bots: Vec<RosterBot>) -> Self {
        let entries = bots
            .into_iter()
            .map(|bot| RosterEntry {
                bot,
                kills: 0,
                deaths: 0,
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Tank colors in roster order
    pub fn colors(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.bot.color.clone()).collect()
    }

    pub fn name(&self, idx: usize) -> Option<String> {
        self.entries.read().get(idx).map(|e| e.bot.name.clone())
    }

    /// Current controller address of the bot at `idx`
    pub fn action_url(&self, idx: usize) -> Option<String> {
        self.entries.read().get(idx).and_then(|e| e.bot.action_url.clone())
    }

    /// Point a bot at a new controller; false when the name is unknown
    pub fn set_action_url(&self, name: &str, url: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.bot.name == name) {
            Some(entry) => {
                entry.bot.action_url = Some(url.to_string());
                true
            }
            None => false,
        }
    }

    pub fn record_kill(&self, idx: usize) {
        if let Some(entry) = self.entries.write().get_mut(idx) {
            entry.kills += 1;
        }
    }

    pub fn record_death(&self, idx: usize) {
        if let Some(entry) = self.entries.write().get_mut(idx) {
            entry.deaths += 1;
        }
    }

    pub fn standings(&self) -> Vec<BotStanding> {
        self.entries
            .read()
            .iter()
            .map(|e| BotStanding {
                name: e.bot.name.clone(),
                color: e.bot.color.clone(),
                kills: e.kills,
                deaths: e.deaths,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(name: &str, color: &str) -> RosterBot {
        RosterBot {
            name: name.to_string(),
            color: color.to_string(),
            action_url: None,
        }
    }

    #[test]
    fn counters_accumulate_per_index() {
        let roster = Roster::new(vec![bot("alpha", "red"), bot("beta", "blue")]);
        roster.record_kill(0);
        roster.record_kill(0);
        roster.record_death(1);
        roster.record_death(7);

        let standings = roster.standings();
        assert_eq!((standings[0].kills, standings[0].deaths), (2, 0));
        assert_eq!((standings[1].kills, standings[1].deaths), (0, 1));
        assert_eq!(roster.colors(), vec!["red".to_string(), "blue".to_string()]);
    }

    #[test]
    fn action_url_updates_by_name() {
        let roster = Roster::new(vec![bot("alpha", "red")]);
        assert_eq!(roster.action_url(0), None);

        assert!(roster.set_action_url("alpha", "http://alpha.local/act"));
        assert_eq!(roster.action_url(0).as_deref(), Some("http://alpha.local/act"));
        assert!(!roster.set_action_url("ghost", "http://ghost.local"));
        assert_eq!(roster.name(0).as_deref(), Some("alpha"));
        assert_eq!(roster.name(3), None);
    }

    #[test]
    fn standings_serialize_without_controller_address() {
        let roster = Roster::new(vec![RosterBot {
            action_url: Some("http://secret.local".to_string()),
            ..bot("alpha", "red")
        }]);
        assert_eq!(
            serde_json::to_value(roster.standings()).unwrap(),
            serde_json::json!([{"name": "alpha", "color": "red", "kills": 0, "deaths": 0}])
        );
    }
}
