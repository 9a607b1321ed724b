//! Tank movement, grid rules and power-up lifecycle

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::r#match::MatchState;
use super::{Direction, Position};

/// Power-up types that can lie on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    /// Bullets do not kill the holder
    Shield,
    /// Holder is hidden from every other tank's view
    Stealth,
    /// Holder fires homing bullets
    Missile,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [PowerUpKind::Shield, PowerUpKind::Stealth, PowerUpKind::Missile];
}

/// A power-up waiting on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUp {
    #[serde(flatten)]
    pub pos: Position,
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
}

/// A power-up held by a tank, with its countdown in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePowerUp {
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
    #[serde(rename = "expiry")]
    pub remaining: u32,
}

/// Movement and pickup rules
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply a move intent. Facing always changes; the position only when the
    /// tank is off cooldown and the destination is free.
    pub fn move_tank(state: &mut MatchState, id: usize, dir: Direction) -> bool {
        let tick = state.tick as i64;
        let speed = i64::from(state.config.tank_speed_ticks);
        let Some(tank) = state.tanks.get(id) else {
            return false;
        };
        if !tank.alive {
            return false;
        }

        let ready = tick - tank.last_move_tick >= speed;
        let dest = tank.pos.step(dir);
        let can_move = ready && Self::is_free_for_tank(state, dest);

        let picked = if can_move {
            state
                .power_ups
                .iter()
                .position(|p| p.pos == dest)
                .map(|idx| state.power_ups.remove(idx))
        } else {
            None
        };

        let duration = state.config.power_up_duration;
        let tank = &mut state.tanks[id];
        tank.dir = dir;
        if !can_move {
            return false;
        }

        tank.pos = dest;
        tank.last_move_tick = tick;
        if let Some(power_up) = picked {
            tank.power_up = Some(ActivePowerUp {
                kind: power_up.kind,
                remaining: duration,
            });
        }
        true
    }

    /// Apply an aim intent
    pub fn aim_tank(state: &mut MatchState, id: usize, dir: Direction) {
        if let Some(tank) = state.tanks.get_mut(id) {
            if tank.alive {
                tank.dir = dir;
            }
        }
    }

    /// On-grid, not a wall or water tile, and not held by a living tank
    pub fn is_free_for_tank(state: &MatchState, pos: Position) -> bool {
        state.in_bounds(pos)
            && !state.walls.contains(&pos)
            && !state.water.contains(&pos)
            && !state.tanks.iter().any(|t| t.alive && t.pos == pos)
    }

    /// Count down every held power-up, clearing it at zero
    pub fn tick_power_ups(state: &mut MatchState) {
        for tank in state.tanks.iter_mut() {
            if let Some(active) = tank.power_up.as_mut() {
                if active.remaining > 0 {
                    active.remaining -= 1;
                }
                if active.remaining == 0 {
                    tank.power_up = None;
                }
            }
        }
    }

    /// Roll for a power-up spawn on a random empty cell
    pub fn maybe_spawn_power_up(state: &mut MatchState) -> Option<PowerUp> {
        if !state.rng.gen_bool(state.config.power_up_spawn_chance) {
            return None;
        }

        let kind = *PowerUpKind::ALL.choose(&mut state.rng)?;
        let free: Vec<Position> = state
            .cells()
            .filter(|&pos| {
                !state.walls.contains(&pos)
                    && !state.water.contains(&pos)
                    && !state.tanks.iter().any(|t| t.pos == pos)
                    && !state.power_ups.iter().any(|p| p.pos == pos)
            })
            .collect();
        let pos = *free.choose(&mut state.rng)?;

        let power_up = PowerUp { pos, kind };
        state.power_ups.push(power_up);
        Some(power_up)
    }
}
