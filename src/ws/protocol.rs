//! Wire types for observers (WebSocket) and bot controllers (HTTP poll)

use serde::{Deserialize, Serialize};

use crate::game::combat::BulletKind;
use crate::game::physics::{ActivePowerUp, PowerUp};
use crate::game::{Direction, Position};
use crate::tournament::roster::BotStanding;

/// Messages pushed to every observer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full, unfiltered world state (once per tick)
    Update { state: WorldSnapshot },

    /// Roster standings (on start, every kill/death, every match completion)
    #[serde(rename_all = "camelCase")]
    Stats {
        bots: Vec<BotStanding>,
        game_counter: u32,
    },

    /// A bot's controller address changed mid-tournament
    #[serde(rename_all = "camelCase")]
    Deployment { game_number: u32, bot_name: String },
}

/// Full world state for observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub tick: u64,
    pub tanks: Vec<TankSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    pub walls: Vec<Position>,
    pub water: Vec<Position>,
    pub power_ups: Vec<PowerUp>,
    pub bots: Vec<BotStanding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankSnapshot {
    pub id: usize,
    pub color: String,
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub alive: bool,
    pub last_move_tick: i64,
    pub power_up: Option<ActivePowerUp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub owner: usize,
    #[serde(rename = "type")]
    pub kind: BulletKind,
}

/// Fog-limited view posted to one tank's controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankView {
    pub my_tank: VisibleTank,
    pub tanks: Vec<VisibleTank>,
    pub bullets: Vec<VisibleBullet>,
    pub walls: Vec<Position>,
    pub water: Vec<Position>,
    pub power_ups: Vec<PowerUp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleTank {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub color: String,
    pub power_up: Option<ActivePowerUp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleBullet {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    #[serde(rename = "type")]
    pub kind: BulletKind,
}

/// Raw controller reply, validated into an intent by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerReply {
    pub action: String,
    /// Any JSON value; only a direction string means anything
    #[serde(default)]
    pub direction: Option<serde_json::Value>,
}
