//! Match state and tick loop

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::tournament::roster::Roster;
use crate::util::time::Timer;
use crate::ws::protocol::WorldSnapshot;

use super::collector::ActionCollector;
use super::combat::{Bullet, CombatSystem, Kill};
use super::physics::{ActivePowerUp, PhysicsSystem, PowerUp, PowerUpKind};
use super::snapshot::build_world_snapshot;
use super::{Action, Direction, Position, TankAction};

const WALL_SEGMENTS: usize = 5;
const WATER_SEGMENTS: usize = 5;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Constructed, loop not started
    Idle,
    /// Ticks are being computed
    Running,
    /// Frozen until resumed
    Paused,
    /// Match over
    Completed,
}

/// Externally requested run state, shared by the tournament and its match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Latest requested run state; a closed channel counts as a stop
pub fn observe_run_state(control: &mut watch::Receiver<RunState>) -> RunState {
    if control.has_changed().is_err() {
        return RunState::Stopped;
    }
    *control.borrow_and_update()
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No bullets in flight and fewer than two colors alive
    LastTeamStanding,
    /// Tick ceiling reached
    TickLimit,
    /// Forced by a tournament stop
    Stopped,
}

/// Tank state in a match
#[derive(Debug, Clone)]
pub struct Tank {
    /// Roster index
    pub id: usize,
    pub color: String,
    pub pos: Position,
    pub dir: Direction,
    pub alive: bool,
    pub last_move_tick: i64,
    pub power_up: Option<ActivePowerUp>,
}

impl Tank {
    pub fn has_power_up(&self, kind: PowerUpKind) -> bool {
        self.power_up.map_or(false, |p| p.kind == kind)
    }
}

/// Match errors
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("No free cell left to place tank {tank} on a {width}x{height} grid")]
    GridFull { tank: usize, width: i32, height: i32 },
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub config: GameConfig,
    pub seed: u64,
    pub tick: u64,
    pub tanks: Vec<Tank>,
    pub bullets: Vec<Bullet>,
    pub walls: HashSet<Position>,
    pub water: HashSet<Position>,
    pub power_ups: Vec<PowerUp>,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    /// Empty grid with no tanks or obstacles
    pub fn blank(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            tick: 0,
            tanks: Vec::new(),
            bullets: Vec::new(),
            walls: HashSet::new(),
            water: HashSet::new(),
            power_ups: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fresh match: obstacles (if enabled), then one tank per color on a
    /// random free cell with a random facing
    pub fn new(config: GameConfig, colors: &[String], seed: u64) -> Result<Self, MatchError> {
        let mut state = Self::blank(config, seed);
        if state.config.obstacles {
            state.generate_obstacles();
        }

        for (tank, color) in colors.iter().enumerate() {
            let free: Vec<Position> = state
                .cells()
                .filter(|pos| {
                    !state.walls.contains(pos)
                        && !state.water.contains(pos)
                        && !state.tanks.iter().any(|t| t.pos == *pos)
                })
                .collect();
            let pos = *free.choose(&mut state.rng).ok_or(MatchError::GridFull {
                tank,
                width: state.config.field_width,
                height: state.config.field_height,
            })?;
            let dir = Direction::ALL[state.rng.gen_range(0..Direction::ALL.len())];
            state.place_tank(color, pos, dir);
        }

        Ok(state)
    }

    /// Add a living tank; returns its index
    pub fn place_tank(&mut self, color: &str, pos: Position, dir: Direction) -> usize {
        let id = self.tanks.len();
        self.tanks.push(Tank {
            id,
            color: color.to_string(),
            pos,
            dir,
            alive: true,
            last_move_tick: -i64::from(self.config.tank_speed_ticks),
            power_up: None,
        });
        id
    }

    fn generate_obstacles(&mut self) {
        let (width, height) = (self.config.field_width, self.config.field_height);
        let max_len = (width.min(height) / 2).max(2);

        for _ in 0..WALL_SEGMENTS {
            let segment = self.random_segment(max_len);
            self.walls.extend(segment);
        }
        for _ in 0..WATER_SEGMENTS {
            let segment = self.random_segment(max_len);
            self.water.extend(segment);
        }
    }

    /// Straight horizontal or vertical run fully inside the grid
    fn random_segment(&mut self, max_len: i32) -> Vec<Position> {
        let (width, height) = (self.config.field_width, self.config.field_height);
        let horizontal = self.rng.gen_bool(0.5);
        let (span, lanes) = if horizontal { (width, height) } else { (height, width) };

        let len = self.rng.gen_range(2..=max_len).min(span);
        let start = self.rng.gen_range(0..=span - len);
        let lane = self.rng.gen_range(0..lanes);

        (start..start + len)
            .map(|i| {
                if horizontal {
                    Position::new(i, lane)
                } else {
                    Position::new(lane, i)
                }
            })
            .collect()
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.config.field_width && pos.y >= 0 && pos.y < self.config.field_height
    }

    /// Every cell of the grid, row by row
    pub fn cells(&self) -> impl Iterator<Item = Position> {
        let (width, height) = (self.config.field_width, self.config.field_height);
        (0..height).flat_map(move |y| (0..width).map(move |x| Position::new(x, y)))
    }

    /// A `wait` for every living tank
    pub fn wait_actions(&self) -> Vec<TankAction> {
        self.tanks
            .iter()
            .filter(|t| t.alive)
            .map(|t| TankAction::wait(t.id))
            .collect()
    }

    /// Advance one tick with the given (already ordered) intents
    pub fn advance(&mut self, intents: &[TankAction]) -> Vec<Kill> {
        self.tick += 1;

        CombatSystem::advance_bullets(self);
        let mut kills = CombatSystem::resolve_collisions(self);

        for intent in intents {
            if let Action::Move(dir) = intent.action {
                PhysicsSystem::move_tank(self, intent.tank, dir);
            }
        }
        for intent in intents {
            if let Action::Aim(dir) = intent.action {
                PhysicsSystem::aim_tank(self, intent.tank, dir);
            }
        }
        for intent in intents {
            if intent.action == Action::Shoot {
                CombatSystem::shoot(self, intent.tank);
            }
        }

        kills.extend(CombatSystem::resolve_collisions(self));

        PhysicsSystem::tick_power_ups(self);
        if let Some(power_up) = PhysicsSystem::maybe_spawn_power_up(self) {
            debug!(tick = self.tick, kind = ?power_up.kind, x = power_up.pos.x, y = power_up.pos.y, "Power-up spawned");
        }

        kills
    }

    /// Whether the match is over before computing the next tick
    pub fn termination(&self) -> Option<EndReason> {
        if self.bullets.is_empty() {
            let colors: HashSet<&str> = self
                .tanks
                .iter()
                .filter(|t| t.alive)
                .map(|t| t.color.as_str())
                .collect();
            if colors.len() < 2 {
                return Some(EndReason::LastTeamStanding);
            }
        }

        if self.tick >= self.config.max_ticks {
            Some(EndReason::TickLimit)
        } else {
            None
        }
    }
}

/// Callbacks from a running match into its tournament
pub trait MatchListener: Send + Sync {
    /// A bullet owned by `killer` killed `victim` (roster indices)
    fn on_kill(&self, killer: usize, victim: usize);

    /// Full state after a tick was computed
    fn on_tick(&self, snapshot: WorldSnapshot);
}

/// Outcome of one match
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub game_number: u32,
    pub ticks: u64,
    pub reason: EndReason,
    /// Kills per roster index in this match
    pub kills: Vec<u32>,
    /// Deaths per roster index in this match
    pub deaths: Vec<u32>,
}

/// One match: drives the tick cadence and the poll/apply pipeline
pub struct GameMatch {
    state: MatchState,
    game_number: u32,
    roster: Arc<Roster>,
    collector: ActionCollector,
    listener: Arc<dyn MatchListener>,
    phase: MatchPhase,
    /// Intents collected last tick, applied (once) by the next one
    next_intents: Option<Vec<TankAction>>,
    kills: Vec<u32>,
    deaths: Vec<u32>,
}

impl GameMatch {
    pub fn new(
        state: MatchState,
        game_number: u32,
        roster: Arc<Roster>,
        collector: ActionCollector,
        listener: Arc<dyn MatchListener>,
    ) -> Self {
        let tanks = state.tanks.len();
        Self {
            state,
            game_number,
            roster,
            collector,
            listener,
            phase: MatchPhase::Idle,
            next_intents: None,
            kills: vec![0; tanks],
            deaths: vec![0; tanks],
        }
    }

    /// Run the tick loop until the match ends or is stopped
    pub async fn run(mut self, mut control: watch::Receiver<RunState>) -> MatchResult {
        self.phase = MatchPhase::Running;
        info!(
            game_number = self.game_number,
            tanks = self.state.tanks.len(),
            seed = self.state.seed,
            "Match started"
        );

        let tick_budget = self.state.config.tick_duration;
        let reason = loop {
            if !self.wait_until_running(&mut control).await {
                break EndReason::Stopped;
            }
            if let Some(reason) = self.state.termination() {
                break reason;
            }

            let timer = Timer::new();
            self.simulate_tick();
            let intents = self.collect_intents().await;

            if observe_run_state(&mut control) == RunState::Running {
                self.next_intents = Some(intents);
            } else {
                debug!(
                    game_number = self.game_number,
                    tick = self.state.tick,
                    "Discarding intents collected while frozen"
                );
                self.next_intents = None;
            }

            if timer.elapsed() > tick_budget {
                debug!(
                    game_number = self.game_number,
                    tick = self.state.tick,
                    elapsed_ms = timer.elapsed_ms(),
                    "Tick over budget"
                );
            }

            let deadline = tokio::time::Instant::now() + timer.remaining(tick_budget);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    changed = control.changed() => {
                        // Only a pause or stop cuts the tick short
                        if changed.is_err() || *control.borrow() != RunState::Running {
                            break;
                        }
                    }
                }
            }
        };

        self.phase = MatchPhase::Completed;
        info!(
            game_number = self.game_number,
            ticks = self.state.tick,
            reason = ?reason,
            "Match ended"
        );

        MatchResult {
            game_number: self.game_number,
            ticks: self.state.tick,
            reason,
            kills: self.kills,
            deaths: self.deaths,
        }
    }

    /// Block while paused. Returns false once stopped.
    async fn wait_until_running(&mut self, control: &mut watch::Receiver<RunState>) -> bool {
        loop {
            match observe_run_state(control) {
                RunState::Running => {
                    if self.phase == MatchPhase::Paused {
                        info!(game_number = self.game_number, tick = self.state.tick, "Match resumed");
                        self.phase = MatchPhase::Running;
                    }
                    return true;
                }
                RunState::Stopped => return false,
                RunState::Paused => {
                    if self.phase != MatchPhase::Paused {
                        info!(game_number = self.game_number, tick = self.state.tick, "Match paused");
                        self.phase = MatchPhase::Paused;
                    }
                    if control.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Physics with the pending intents, then report kills and the new state
    fn simulate_tick(&mut self) -> Vec<Kill> {
        let intents = self
            .next_intents
            .take()
            .unwrap_or_else(|| self.state.wait_actions());
        let kills = self.state.advance(&intents);

        for kill in &kills {
            if let Some(count) = self.kills.get_mut(kill.killer) {
                *count += 1;
            }
            if let Some(count) = self.deaths.get_mut(kill.victim) {
                *count += 1;
            }
            info!(
                game_number = self.game_number,
                tick = self.state.tick,
                killer = %self.roster.name(kill.killer).unwrap_or_default(),
                victim = %self.roster.name(kill.victim).unwrap_or_default(),
                "Tank destroyed"
            );
            self.listener.on_kill(kill.killer, kill.victim);
        }

        self.listener
            .on_tick(build_world_snapshot(&self.state, self.roster.standings()));
        kills
    }

    /// Poll controllers on even ticks, wait otherwise; order is shuffled
    async fn collect_intents(&mut self) -> Vec<TankAction> {
        let mut intents = if self.state.tick % 2 == 0 {
            self.collector.collect(&self.state, &self.roster).await
        } else {
            self.state.wait_actions()
        };
        order_intents(&mut intents, &mut self.state.rng);
        intents
    }
}

/// Randomize the order intents are applied in, so no tank index wins contention by default
fn order_intents(intents: &mut [TankAction], rng: &mut impl Rng) {
    intents.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::roster::RosterBot;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn config() -> GameConfig {
        GameConfig {
            power_up_spawn_chance: 0.0,
            ..GameConfig::default()
        }
    }

    fn roster(colors: &[&str]) -> Arc<Roster> {
        Arc::new(Roster::new(
            colors
                .iter()
                .enumerate()
                .map(|(i, color)| RosterBot {
                    name: format!("bot-{}", i),
                    color: color.to_string(),
                    action_url: None,
                })
                .collect(),
        ))
    }

    #[derive(Default)]
    struct RecordingListener {
        kills: Mutex<Vec<(usize, usize)>>,
        ticks: Mutex<Vec<u64>>,
    }

    impl MatchListener for RecordingListener {
        fn on_kill(&self, killer: usize, victim: usize) {
            self.kills.lock().push((killer, victim));
        }

        fn on_tick(&self, snapshot: WorldSnapshot) {
            self.ticks.lock().push(snapshot.tick);
        }
    }

    #[test]
    fn red_shoots_blue_down_the_row() {
        let mut state = MatchState::blank(config(), 1);
        let red = state.place_tank("red", Position::new(0, 0), Direction::E);
        let blue = state.place_tank("blue", Position::new(5, 0), Direction::W);

        let mut kills = Vec::new();
        let mut pending = state.wait_actions();
        while state.termination().is_none() {
            kills.extend(state.advance(&pending));
            pending = if state.tick % 2 == 0 && state.tanks[blue].alive {
                vec![
                    TankAction { tank: red, action: Action::Shoot },
                    TankAction::wait(blue),
                ]
            } else {
                state.wait_actions()
            };
        }

        assert_eq!(kills, vec![Kill { killer: red, victim: blue }]);
        assert_eq!(state.termination(), Some(EndReason::LastTeamStanding));
        assert!(state.bullets.is_empty());
        assert!(state.tick < state.config.max_ticks);
    }

    #[test]
    fn application_order_varies_with_the_seed() {
        let orders: HashSet<Vec<usize>> = (0..32)
            .map(|seed| {
                let mut intents = vec![TankAction::wait(0), TankAction::wait(1)];
                order_intents(&mut intents, &mut ChaCha8Rng::seed_from_u64(seed));
                intents.iter().map(|i| i.tank).collect()
            })
            .collect();
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn contended_cell_goes_to_whichever_tank_moves_first() {
        let contested = Position::new(2, 2);
        let mut winners = HashSet::new();
        for seed in 0..32 {
            let mut state = MatchState::blank(config(), seed);
            let west = state.place_tank("red", Position::new(1, 2), Direction::N);
            let east = state.place_tank("blue", Position::new(3, 2), Direction::N);
            state.power_ups.push(PowerUp {
                pos: contested,
                kind: PowerUpKind::Shield,
            });

            let mut intents = vec![
                TankAction { tank: west, action: Action::Move(Direction::E) },
                TankAction { tank: east, action: Action::Move(Direction::W) },
            ];
            order_intents(&mut intents, &mut ChaCha8Rng::seed_from_u64(seed));
            state.advance(&intents);

            let holders: Vec<usize> = state
                .tanks
                .iter()
                .filter(|t| t.pos == contested)
                .map(|t| t.id)
                .collect();
            assert_eq!(holders.len(), 1);
            assert!(state.power_ups.is_empty());
            assert!(state.tanks[holders[0]].has_power_up(PowerUpKind::Shield));
            winners.insert(holders[0]);
        }
        assert_eq!(winners, HashSet::from([0, 1]));
    }

    #[test]
    fn termination_waits_for_bullets_and_tick_ceiling() {
        let mut state = MatchState::blank(config(), 2);
        state.place_tank("red", Position::new(0, 0), Direction::E);
        let blue = state.place_tank("blue", Position::new(9, 9), Direction::E);
        assert_eq!(state.termination(), None);

        state.tick = state.config.max_ticks - 1;
        assert_eq!(state.termination(), None);
        state.tick = state.config.max_ticks;
        assert_eq!(state.termination(), Some(EndReason::TickLimit));

        state.tick = 3;
        state.tanks[blue].alive = false;
        state.bullets.push(Bullet {
            pos: Position::new(4, 4),
            dir: Direction::N,
            owner: 0,
            kind: crate::game::combat::BulletKind::Normal,
        });
        assert_eq!(state.termination(), None);
        state.bullets.clear();
        assert_eq!(state.termination(), Some(EndReason::LastTeamStanding));
    }

    #[test]
    fn same_color_team_is_already_last_standing() {
        let mut state = MatchState::blank(config(), 2);
        state.place_tank("red", Position::new(0, 0), Direction::E);
        state.place_tank("red", Position::new(3, 3), Direction::E);
        assert_eq!(state.termination(), Some(EndReason::LastTeamStanding));
    }

    #[test]
    fn new_match_places_tanks_on_free_cells() {
        let colors: Vec<String> = ["red", "blue", "green", "gold"].iter().map(|c| c.to_string()).collect();
        let state = MatchState::new(
            GameConfig {
                obstacles: true,
                ..config()
            },
            &colors,
            42,
        )
        .unwrap();

        assert_eq!(state.tanks.len(), 4);
        assert!(!state.walls.is_empty());
        assert!(!state.water.is_empty());
        for tank in &state.tanks {
            assert!(state.in_bounds(tank.pos));
            assert!(!state.walls.contains(&tank.pos));
            assert!(!state.water.contains(&tank.pos));
            assert_eq!(tank.last_move_tick, -2);
        }
        let cells: HashSet<Position> = state.tanks.iter().map(|t| t.pos).collect();
        assert_eq!(cells.len(), 4);
        assert!(state.walls.iter().chain(&state.water).all(|p| state.in_bounds(*p)));
    }

    #[test]
    fn too_many_tanks_for_the_grid_is_an_error() {
        let colors: Vec<String> = (0..5).map(|i| format!("c{}", i)).collect();
        let small = GameConfig {
            field_width: 2,
            field_height: 2,
            ..config()
        };
        assert!(matches!(
            MatchState::new(small, &colors, 1),
            Err(MatchError::GridFull { tank: 4, .. })
        ));
    }

    #[test]
    fn pending_intents_are_applied_once() {
        let mut state = MatchState::blank(config(), 3);
        let red = state.place_tank("red", Position::new(2, 2), Direction::E);
        let listener = Arc::new(RecordingListener::default());
        let mut game = GameMatch::new(
            state,
            1,
            roster(&["red"]),
            ActionCollector::new(Duration::from_millis(50)),
            listener.clone(),
        );

        game.next_intents = Some(vec![TankAction { tank: red, action: Action::Shoot }]);
        game.simulate_tick();
        game.simulate_tick();

        // One bullet fired, then moved one cell
        assert_eq!(game.state.bullets.len(), 1);
        assert_eq!(game.state.bullets[0].pos, Position::new(4, 2));
        assert_eq!(*listener.ticks.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_ticks_and_resume_continues() {
        let mut state = MatchState::blank(
            GameConfig {
                tick_duration: Duration::from_millis(100),
                max_ticks: 10_000,
                ..config()
            },
            4,
        );
        state.place_tank("red", Position::new(0, 0), Direction::E);
        state.place_tank("blue", Position::new(9, 9), Direction::W);
        let listener = Arc::new(RecordingListener::default());
        let game = GameMatch::new(
            state,
            1,
            roster(&["red", "blue"]),
            ActionCollector::new(Duration::from_millis(50)),
            listener.clone(),
        );

        let (control, control_rx) = watch::channel(RunState::Running);
        let task = tokio::spawn(game.run(control_rx));

        tokio::time::sleep(Duration::from_millis(350)).await;
        control.send_replace(RunState::Paused);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let frozen_at = listener.ticks.lock().len();
        assert!(frozen_at >= 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(listener.ticks.lock().len(), frozen_at);

        control.send_replace(RunState::Running);
        tokio::time::sleep(Duration::from_millis(250)).await;
        let ticks = listener.ticks.lock().clone();
        assert!(ticks.len() > frozen_at);
        // Consecutive tick numbers: nothing skipped or repeated across the pause
        assert!(ticks.windows(2).all(|w| w[1] == w[0] + 1));

        control.send_replace(RunState::Stopped);
        let result = task.await.unwrap();
        assert_eq!(result.reason, EndReason::Stopped);
        assert_eq!(result.ticks as usize, listener.ticks.lock().len());
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_resumes_keep_the_tick_cadence() {
        let mut state = MatchState::blank(
            GameConfig {
                tick_duration: Duration::from_millis(100),
                max_ticks: 10_000,
                ..config()
            },
            6,
        );
        state.place_tank("red", Position::new(0, 0), Direction::E);
        state.place_tank("blue", Position::new(9, 9), Direction::W);
        let listener = Arc::new(RecordingListener::default());
        let game = GameMatch::new(
            state,
            1,
            roster(&["red", "blue"]),
            ActionCollector::new(Duration::from_millis(50)),
            listener.clone(),
        );

        let (control, control_rx) = watch::channel(RunState::Running);
        let task = tokio::spawn(game.run(control_rx));

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            control.send_replace(RunState::Running);
        }
        let ticks = listener.ticks.lock().len();
        assert!((10..=11).contains(&ticks), "got {} ticks in one second", ticks);

        control.send_replace(RunState::Stopped);
        let result = task.await.unwrap();
        assert_eq!(result.reason, EndReason::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn match_completes_at_tick_ceiling() {
        let mut state = MatchState::blank(
            GameConfig {
                max_ticks: 6,
                ..config()
            },
            5,
        );
        state.place_tank("red", Position::new(0, 0), Direction::N);
        state.place_tank("blue", Position::new(9, 9), Direction::S);
        let listener = Arc::new(RecordingListener::default());
        let game = GameMatch::new(
            state,
            7,
            roster(&["red", "blue"]),
            ActionCollector::new(Duration::from_millis(50)),
            listener.clone(),
        );
        assert_eq!(game.phase, MatchPhase::Idle);

        let (_control, control_rx) = watch::channel(RunState::Running);
        let result = game.run(control_rx).await;
        assert_eq!(result.reason, EndReason::TickLimit);
        assert_eq!(result.ticks, 6);
        assert_eq!(result.game_number, 7);
        assert_eq!(result.kills, vec![0, 0]);
        assert_eq!(listener.ticks.lock().len(), 6);
    }
}
