//! World snapshots for observers and fog-of-war views for controllers

use crate::tournament::roster::BotStanding;
use crate::ws::protocol::{
    BulletSnapshot, TankSnapshot, TankView, VisibleBullet, VisibleTank, WorldSnapshot,
};

use super::physics::PowerUpKind;
use super::r#match::{MatchState, Tank};
use super::Position;

/// Full unfiltered state, broadcast once per tick
pub fn build_world_snapshot(state: &MatchState, bots: Vec<BotStanding>) -> WorldSnapshot {
    let tanks = state
        .tanks
        .iter()
        .map(|t| TankSnapshot {
            id: t.id,
            color: t.color.clone(),
            x: t.pos.x,
            y: t.pos.y,
            dir: t.dir,
            alive: t.alive,
            last_move_tick: t.last_move_tick,
            power_up: t.power_up,
        })
        .collect();

    let bullets = state
        .bullets
        .iter()
        .map(|b| BulletSnapshot {
            x: b.pos.x,
            y: b.pos.y,
            dir: b.dir,
            owner: b.owner,
            kind: b.kind,
        })
        .collect();

    WorldSnapshot {
        tick: state.tick,
        tanks,
        bullets,
        walls: sorted(state.walls.iter().copied()),
        water: sorted(state.water.iter().copied()),
        power_ups: state.power_ups.clone(),
        bots,
    }
}

/// What tank `viewer` is allowed to see this tick.
///
/// Everything is filtered by Manhattan distance to the viewer against the fog
/// radius. Dead tanks and stealthed tanks are never shown to others; the
/// viewer always sees itself.
pub fn build_tank_view(state: &MatchState, viewer: usize) -> Option<TankView> {
    let me = state.tanks.get(viewer)?;
    let radius = state.config.fog_radius;
    let visible = |pos: Position| me.pos.manhattan(pos) <= radius;

    let tanks = state
        .tanks
        .iter()
        .filter(|t| {
            t.id != viewer
                && t.alive
                && !t.has_power_up(PowerUpKind::Stealth)
                && visible(t.pos)
        })
        .map(visible_tank)
        .collect();

    let bullets = state
        .bullets
        .iter()
        .filter(|b| visible(b.pos))
        .map(|b| VisibleBullet {
            x: b.pos.x,
            y: b.pos.y,
            dir: b.dir,
            kind: b.kind,
        })
        .collect();

    Some(TankView {
        my_tank: visible_tank(me),
        tanks,
        bullets,
        walls: sorted(state.walls.iter().copied().filter(|&p| visible(p))),
        water: sorted(state.water.iter().copied().filter(|&p| visible(p))),
        power_ups: state
            .power_ups
            .iter()
            .filter(|p| visible(p.pos))
            .copied()
            .collect(),
    })
}

fn visible_tank(tank: &Tank) -> VisibleTank {
    VisibleTank {
        x: tank.pos.x,
        y: tank.pos.y,
        dir: tank.dir,
        color: tank.color.clone(),
        power_up: tank.power_up,
    }
}

// Stable ordering for set-backed tiles
fn sorted(cells: impl Iterator<Item = Position>) -> Vec<Position> {
    let mut cells: Vec<Position> = cells.collect();
    cells.sort_unstable();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::combat::{Bullet, BulletKind};
    use crate::game::physics::{ActivePowerUp, PowerUp};
    use crate::game::Direction;

    fn state(fog_radius: i32) -> MatchState {
        MatchState::blank(
            GameConfig {
                fog_radius,
                power_up_spawn_chance: 0.0,
                ..GameConfig::default()
            },
            5,
        )
    }

    #[test]
    fn fog_radius_is_inclusive_manhattan() {
        let mut state = state(3);
        let me = state.place_tank("red", Position::new(5, 5), Direction::N);
        state.place_tank("blue", Position::new(7, 6), Direction::S);
        state.place_tank("green", Position::new(8, 6), Direction::S);
        state.walls.insert(Position::new(5, 8));
        state.walls.insert(Position::new(5, 9));
        state.water.insert(Position::new(2, 5));
        state.power_ups.push(PowerUp {
            pos: Position::new(9, 9),
            kind: PowerUpKind::Shield,
        });
        state.bullets.push(Bullet {
            pos: Position::new(4, 4),
            dir: Direction::E,
            owner: 1,
            kind: BulletKind::Normal,
        });

        let view = build_tank_view(&state, me).unwrap();
        assert_eq!(view.my_tank.color, "red");
        assert_eq!(view.tanks.len(), 1);
        assert_eq!(view.tanks[0].color, "blue");
        assert_eq!(view.bullets.len(), 1);
        assert_eq!(view.walls, vec![Position::new(5, 8)]);
        assert_eq!(view.water, vec![Position::new(2, 5)]);
        assert!(view.power_ups.is_empty());
    }

    #[test]
    fn stealth_hides_from_others_but_not_from_self() {
        let mut state = state(50);
        let sneaky = state.place_tank("red", Position::new(1, 1), Direction::N);
        let other = state.place_tank("blue", Position::new(1, 2), Direction::N);
        state.tanks[sneaky].power_up = Some(ActivePowerUp {
            kind: PowerUpKind::Stealth,
            remaining: 10,
        });

        let own = build_tank_view(&state, sneaky).unwrap();
        assert_eq!(own.my_tank.power_up.map(|p| p.kind), Some(PowerUpKind::Stealth));
        assert_eq!(own.tanks.len(), 1);

        let seen_by_other = build_tank_view(&state, other).unwrap();
        assert!(seen_by_other.tanks.is_empty());
    }

    #[test]
    fn dead_tanks_are_not_visible() {
        let mut state = state(50);
        let me = state.place_tank("red", Position::new(0, 0), Direction::N);
        let dead = state.place_tank("blue", Position::new(0, 1), Direction::N);
        state.tanks[dead].alive = false;

        assert!(build_tank_view(&state, me).unwrap().tanks.is_empty());
        assert!(build_tank_view(&state, 99).is_none());
    }

    #[test]
    fn world_snapshot_is_unfiltered() {
        let mut state = state(0);
        state.place_tank("red", Position::new(0, 0), Direction::N);
        let stealthy = state.place_tank("blue", Position::new(14, 14), Direction::W);
        state.tanks[stealthy].power_up = Some(ActivePowerUp {
            kind: PowerUpKind::Stealth,
            remaining: 3,
        });
        state.walls.insert(Position::new(7, 7));
        state.tick = 12;

        let snapshot = build_world_snapshot(&state, vec![]);
        assert_eq!(snapshot.tick, 12);
        assert_eq!(snapshot.tanks.len(), 2);
        assert_eq!(snapshot.walls, vec![Position::new(7, 7)]);
    }
}
