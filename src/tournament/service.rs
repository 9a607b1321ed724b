//! Tournament service - sequences matches over one roster

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::GameConfig;
use crate::game::r#match::observe_run_state;
use crate::game::{ActionCollector, GameMatch, MatchListener, MatchResult, MatchState, RunState};
use crate::store::{BotMatchStats, MatchRecord, StatsSink};
use crate::ws::protocol::{ServerMsg, WorldSnapshot};

use super::roster::{BotStanding, Roster, RosterBot};

/// Tournament errors
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("Tournament already active")]
    AlreadyActive,

    #[error("No active tournament")]
    NoActiveTournament,

    #[error("No bots to play with")]
    EmptyRoster,
}

/// State shared between the service, the driver task and the running match
pub struct TournamentShared {
    id: String,
    roster: Arc<Roster>,
    /// Number of the match being played (or next to be played)
    game_counter: AtomicU32,
    latest: RwLock<Option<(WorldSnapshot, u32)>>,
    control: watch::Sender<RunState>,
    events: broadcast::Sender<ServerMsg>,
}

impl TournamentShared {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn game_counter(&self) -> u32 {
        self.game_counter.load(Ordering::SeqCst)
    }

    pub fn run_state(&self) -> RunState {
        *self.control.borrow()
    }

    /// Switch the run state, notifying the match only on an actual change
    fn set_run_state(&self, next: RunState) -> bool {
        self.control.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    fn broadcast(&self, msg: ServerMsg) {
        // No observers is fine
        let _ = self.events.send(msg);
    }

    fn broadcast_stats(&self) {
        self.broadcast(ServerMsg::Stats {
            bots: self.roster.standings(),
            game_counter: self.game_counter(),
        });
    }

    /// Count the match, publish standings and hand the numbers to storage
    fn complete_match(&self, result: &MatchResult, sink: Option<&Arc<dyn StatsSink>>) {
        let completed = self.game_counter.fetch_add(1, Ordering::SeqCst);
        info!(
            tournament_id = %self.id,
            game_number = result.game_number,
            ticks = result.ticks,
            reason = ?result.reason,
            "Match completed"
        );
        self.broadcast_stats();

        let Some(sink) = sink else {
            return;
        };
        let bots = self
            .roster
            .standings()
            .into_iter()
            .enumerate()
            .map(|(idx, standing)| BotMatchStats {
                name: standing.name,
                match_kills: result.kills.get(idx).copied().unwrap_or_default(),
                match_deaths: result.deaths.get(idx).copied().unwrap_or_default(),
                total_kills: standing.kills,
                total_deaths: standing.deaths,
            })
            .collect();
        let record = MatchRecord {
            tournament_id: self.id.clone(),
            game_number: completed,
            bots,
        };

        let tournament_id = self.id.clone();
        let store = sink.record(record);
        tokio::spawn(async move {
            if let Err(e) = store.await {
                error!(tournament_id = %tournament_id, game_number = completed, error = %e, "Failed to store match stats");
            }
        });
    }
}

impl MatchListener for TournamentShared {
    fn on_kill(&self, killer: usize, victim: usize) {
        self.roster.record_kill(killer);
        self.roster.record_death(victim);
        self.broadcast_stats();
    }

    fn on_tick(&self, snapshot: WorldSnapshot) {
        let game_number = self.game_counter();
        *self.latest.write() = Some((snapshot.clone(), game_number));
        self.broadcast(ServerMsg::Update { state: snapshot });
    }
}

struct ActiveTournament {
    shared: Arc<TournamentShared>,
    driver: JoinHandle<()>,
}

/// Owns at most one tournament at a time and exposes its controls
pub struct TournamentService {
    config: GameConfig,
    collector: ActionCollector,
    stats_sink: Option<Arc<dyn StatsSink>>,
    events: broadcast::Sender<ServerMsg>,
    current: Mutex<Option<ActiveTournament>>,
}

impl TournamentService {
    pub fn new(
        config: GameConfig,
        stats_sink: Option<Arc<dyn StatsSink>>,
        events: broadcast::Sender<ServerMsg>,
    ) -> Self {
        Self {
            collector: ActionCollector::new(config.action_timeout),
            config,
            stats_sink,
            events,
            current: Mutex::new(None),
        }
    }

    /// Observer feed for every tournament this service runs
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    /// Start a new tournament; the previous one must be stopped
    pub fn start(&self, bots: Vec<RosterBot>) -> Result<Arc<TournamentShared>, TournamentError> {
        let mut current = self.current.lock();
        if current.as_ref().map_or(false, |t| t.shared.run_state() != RunState::Stopped) {
            return Err(TournamentError::AlreadyActive);
        }
        if bots.is_empty() {
            return Err(TournamentError::EmptyRoster);
        }

        let (control, control_rx) = watch::channel(RunState::Running);
        let shared = Arc::new(TournamentShared {
            id: chrono::Local::now().format("%Y%m%d_%H%M").to_string(),
            roster: Arc::new(Roster::new(bots)),
            game_counter: AtomicU32::new(1),
            latest: RwLock::new(None),
            control,
            events: self.events.clone(),
        });

        info!(tournament_id = %shared.id, bots = shared.roster.len(), "Tournament started");
        shared.broadcast_stats();

        let driver = tokio::spawn(drive(
            shared.clone(),
            self.config.clone(),
            self.collector.clone(),
            self.stats_sink.clone(),
            control_rx,
        ));

        if let Some(previous) = current.replace(ActiveTournament {
            shared: shared.clone(),
            driver,
        }) {
            // Stopped, but possibly still waiting on its last collection
            if !previous.driver.is_finished() {
                warn!(tournament_id = %previous.shared.id, "Previous tournament still winding down");
            }
        }

        Ok(shared)
    }

    pub fn pause(&self) -> Result<(), TournamentError> {
        let shared = self.active()?;
        if shared.set_run_state(RunState::Paused) {
            info!(tournament_id = %shared.id, "Tournament paused");
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<(), TournamentError> {
        let shared = self.active()?;
        if shared.set_run_state(RunState::Running) {
            info!(tournament_id = %shared.id, "Tournament resumed");
        }
        Ok(())
    }

    /// Force the running match to complete and start no further match
    pub fn stop(&self) -> Result<(), TournamentError> {
        let shared = self.active()?;
        shared.control.send_replace(RunState::Stopped);
        info!(tournament_id = %shared.id, "Tournament stopped");
        Ok(())
    }

    /// Repoint a bot of the running tournament; applies from its next poll
    pub fn update_action_url(&self, bot_name: &str, url: &str) -> bool {
        let Ok(shared) = self.active() else {
            return false;
        };
        if !shared.roster.set_action_url(bot_name, url) {
            return false;
        }

        info!(tournament_id = %shared.id, bot = %bot_name, "Controller redeployed");
        shared.broadcast(ServerMsg::Deployment {
            game_number: shared.game_counter(),
            bot_name: bot_name.to_string(),
        });
        true
    }

    pub fn is_active(&self) -> bool {
        self.active().is_ok()
    }

    pub fn is_paused(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |t| t.shared.run_state() == RunState::Paused)
    }

    /// Standings and match counter of the latest tournament, stopped or not
    pub fn standings(&self) -> (Vec<BotStanding>, u32) {
        match self.current.lock().as_ref() {
            Some(t) => (t.shared.roster.standings(), t.shared.game_counter()),
            None => (Vec::new(), 0),
        }
    }

    /// Last broadcast world state with the number of its match
    pub fn latest_state(&self) -> Option<(WorldSnapshot, u32)> {
        self.current
            .lock()
            .as_ref()
            .and_then(|t| t.shared.latest.read().clone())
    }

    fn active(&self) -> Result<Arc<TournamentShared>, TournamentError> {
        self.current
            .lock()
            .as_ref()
            .filter(|t| t.shared.run_state() != RunState::Stopped)
            .map(|t| t.shared.clone())
            .ok_or(TournamentError::NoActiveTournament)
    }
}

/// Match after match until stopped
async fn drive(
    shared: Arc<TournamentShared>,
    config: GameConfig,
    collector: ActionCollector,
    sink: Option<Arc<dyn StatsSink>>,
    mut control: watch::Receiver<RunState>,
) {
    loop {
        if !wait_until_running(&mut control).await {
            break;
        }

        let game_number = shared.game_counter();
        let state = match MatchState::new(config.clone(), &shared.roster.colors(), rand::random()) {
            Ok(state) => state,
            Err(e) => {
                error!(tournament_id = %shared.id, game_number, error = %e, "Cannot set up match, stopping tournament");
                shared.control.send_replace(RunState::Stopped);
                break;
            }
        };

        let game = GameMatch::new(
            state,
            game_number,
            shared.roster.clone(),
            collector.clone(),
            shared.clone(),
        );
        let result = game.run(control.clone()).await;
        shared.complete_match(&result, sink.as_ref());

        if observe_run_state(&mut control) == RunState::Stopped {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.inter_match_delay) => {}
            _ = wait_for_stop(&mut control) => break,
        }
    }

    info!(
        tournament_id = %shared.id,
        matches = shared.game_counter().saturating_sub(1),
        "Tournament finished"
    );
}

/// False once stopped
async fn wait_until_running(control: &mut watch::Receiver<RunState>) -> bool {
    loop {
        match observe_run_state(control) {
            RunState::Running => return true,
            RunState::Stopped => return false,
            RunState::Paused => {
                if control.changed().await.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn wait_for_stop(control: &mut watch::Receiver<RunState>) {
    while observe_run_state(control) != RunState::Stopped {
        if control.changed().await.is_err() {
            return;
        }
    }
}
