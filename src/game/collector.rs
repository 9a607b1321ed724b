//! Per-tick controller polling with a per-tank deadline

use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::tournament::roster::Roster;
use crate::ws::protocol::{ControllerReply, TankView};

use super::r#match::MatchState;
use super::snapshot::build_tank_view;
use super::{Action, Direction, TankAction};

/// Reasons a poll degrades to `wait`
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Controller answered with status {0}")]
    Status(u16),

    #[error("Malformed reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("No reply within {0:?}")]
    Timeout(Duration),
}

/// Fans out one request per living tank and collects one intent each
#[derive(Clone)]
pub struct ActionCollector {
    client: Client,
    timeout: Duration,
}

impl ActionCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// One intent per living tank, in tank order. Every poll races its own
    /// deadline, so the batch takes at most one timeout.
    pub async fn collect(&self, state: &MatchState, roster: &Roster) -> Vec<TankAction> {
        let polls = state.tanks.iter().filter(|t| t.alive).map(|tank| {
            let view = build_tank_view(state, tank.id);
            // Read at poll time so address updates apply from the next poll
            let url = roster.action_url(tank.id);
            let tank_id = tank.id;
            let tick = state.tick;

            async move {
                let action = match (url, view) {
                    (Some(url), Some(view)) => match self.poll(&url, &view).await {
                        Ok(action) => action,
                        Err(e) => {
                            debug!(tank = tank_id, tick, error = %e, "Controller poll degraded to wait");
                            Action::Wait
                        }
                    },
                    _ => Action::Wait,
                };
                TankAction {
                    tank: tank_id,
                    action,
                }
            }
        });

        join_all(polls).await
    }

    /// Request bounded by the deadline
    async fn poll(&self, url: &str, view: &TankView) -> Result<Action, PollError> {
        tokio::time::timeout(self.timeout, self.request(url, view))
            .await
            .map_err(|_| PollError::Timeout(self.timeout))?
    }

    async fn request(&self, url: &str, view: &TankView) -> Result<Action, PollError> {
        let response = self.client.post(url).json(view).send().await?;

        if !response.status().is_success() {
            return Err(PollError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let reply: ControllerReply = serde_json::from_slice(&body)?;
        Ok(validate_reply(&reply))
    }
}

/// Recognized action with a recognized direction where one is needed
pub fn validate_reply(reply: &ControllerReply) -> Action {
    let direction = reply
        .direction
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(Direction::parse);
    match (reply.action.as_str(), direction) {
        ("move", Some(dir)) => Action::Move(dir),
        ("aim", Some(dir)) => Action::Aim(dir),
        ("shoot", _) => Action::Shoot,
        _ => Action::Wait,
    }
}
