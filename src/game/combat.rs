//! Combat system - bullets, shooting, hit detection

use serde::{Deserialize, Serialize};

use super::physics::PowerUpKind;
use super::r#match::MatchState;
use super::{Direction, Position};

/// Bullet behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletKind {
    Normal,
    /// Homing: turns towards an adjacent enemy
    Missile,
}

/// A bullet in flight, one cell per tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bullet {
    pub pos: Position,
    pub dir: Direction,
    /// Index of the tank that fired it
    pub owner: usize,
    pub kind: BulletKind,
}

/// A confirmed kill from collision resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kill {
    pub killer: usize,
    pub victim: usize,
}

/// Combat system for bullets and hits
pub struct CombatSystem;

impl CombatSystem {
    /// Move every bullet one cell. Bullets leaving the grid, hitting a wall or
    /// landing on a dead tank are dropped; surviving missiles re-aim.
    pub fn advance_bullets(state: &mut MatchState) {
        let mut bullets = std::mem::take(&mut state.bullets);
        bullets.retain_mut(|bullet| {
            let dest = bullet.pos.step(bullet.dir);
            if !state.in_bounds(dest)
                || state.walls.contains(&dest)
                || state.tanks.iter().any(|t| !t.alive && t.pos == dest)
            {
                return false;
            }

            bullet.pos = dest;
            if bullet.kind == BulletKind::Missile {
                if let Some(dir) = Self::homing_direction(state, bullet) {
                    bullet.dir = dir;
                }
            }
            true
        });
        state.bullets = bullets;
    }

    /// First neighbour (N, S, W, E) holding a living tank other than the owner
    fn homing_direction(state: &MatchState, bullet: &Bullet) -> Option<Direction> {
        [Direction::N, Direction::S, Direction::W, Direction::E]
            .into_iter()
            .find(|&dir| {
                let cell = bullet.pos.step(dir);
                state
                    .tanks
                    .iter()
                    .any(|t| t.alive && t.id != bullet.owner && t.pos == cell)
            })
    }

    /// Resolve bullets sharing a cell with a tank or a wall
    pub fn resolve_collisions(state: &mut MatchState) -> Vec<Kill> {
        let mut kills = Vec::new();
        let mut bullets = std::mem::take(&mut state.bullets);

        bullets.retain(|bullet| {
            let hit = state
                .tanks
                .iter()
                .position(|t| t.alive && t.pos == bullet.pos)
                .or_else(|| state.tanks.iter().position(|t| t.pos == bullet.pos));

            match hit {
                Some(idx) => {
                    let tank = &mut state.tanks[idx];
                    if tank.alive && !tank.has_power_up(PowerUpKind::Shield) {
                        tank.alive = false;
                        kills.push(Kill {
                            killer: bullet.owner,
                            victim: idx,
                        });
                    }
                    false
                }
                None => !state.walls.contains(&bullet.pos),
            }
        });

        state.bullets = bullets;
        kills
    }

    /// Fire from `id` one cell ahead along its facing
    pub fn shoot(state: &mut MatchState, id: usize) -> bool {
        let Some(tank) = state.tanks.get(id) else {
            return false;
        };
        if !tank.alive {
            return false;
        }

        let spawn = tank.pos.step(tank.dir);
        if !state.in_bounds(spawn) {
            return false;
        }

        let kind = if tank.has_power_up(PowerUpKind::Missile) {
            BulletKind::Missile
        } else {
            BulletKind::Normal
        };
        let bullet = Bullet {
            pos: spawn,
            dir: tank.dir,
            owner: id,
            kind,
        };
        state.bullets.push(bullet);
        true
    }
}
