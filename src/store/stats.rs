//! Per-match bot stats persistence

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

use super::rest::{RestClient, StoreError};

/// Final numbers of one bot for one completed match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMatchStats {
    pub name: String,
    pub match_kills: u32,
    pub match_deaths: u32,
    /// Tournament totals after this match
    pub total_kills: u32,
    pub total_deaths: u32,
}

/// Everything stored about one completed match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub tournament_id: String,
    pub game_number: u32,
    pub bots: Vec<BotMatchStats>,
}

/// Destination for completed-match records.
///
/// Implementations return an owned future so callers can spawn it and move on.
pub trait StatsSink: Send + Sync {
    fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// One stored row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    pub tournament_id: String,
    pub game_number: u32,
    pub bot_name: String,
    pub match_kills: u32,
    pub match_deaths: u32,
    pub total_kills: u32,
    pub total_deaths: u32,
    pub recorded_at: DateTime<Utc>,
}

impl StatsRow {
    pub fn from_record(record: &MatchRecord, recorded_at: DateTime<Utc>) -> Vec<Self> {
        record
            .bots
            .iter()
            .map(|bot| Self {
                tournament_id: record.tournament_id.clone(),
                game_number: record.game_number,
                bot_name: bot.name.clone(),
                match_kills: bot.match_kills,
                match_deaths: bot.match_deaths,
                total_kills: bot.total_kills,
                total_deaths: bot.total_deaths,
                recorded_at,
            })
            .collect()
    }
}

/// Stats sink backed by a REST table
#[derive(Clone)]
pub struct RestStatsStore {
    rest: RestClient,
}

impl RestStatsStore {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl StatsSink for RestStatsStore {
    fn record(&self, record: MatchRecord) -> BoxFuture<'static, Result<(), StoreError>> {
        let rest = self.rest.clone();
        Box::pin(async move {
            let rows = StatsRow::from_record(&record, Utc::now());
            if rows.is_empty() {
                return Ok(());
            }
            rest.insert(&rows).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn record() -> MatchRecord {
        MatchRecord {
            tournament_id: "20261016_1412".to_string(),
            game_number: 3,
            bots: vec![
                BotMatchStats {
                    name: "alpha".to_string(),
                    match_kills: 1,
                    match_deaths: 0,
                    total_kills: 4,
                    total_deaths: 2,
                },
                BotMatchStats {
                    name: "beta".to_string(),
                    match_kills: 0,
                    match_deaths: 1,
                    total_kills: 2,
                    total_deaths: 4,
                },
            ],
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/rest/v1/bot_stats", addr)
    }

    #[tokio::test]
    async fn rows_are_posted_with_api_key() {
        let received: Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>> = Arc::default();
        let sink = received.clone();
        let url = serve(Router::new().route(
            "/rest/v1/bot_stats",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let key = headers
                        .get("apikey")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    sink.lock().push((key, body));
                    StatusCode::CREATED
                }
            }),
        ))
        .await;

        let store = RestStatsStore::new(RestClient::new(url, Some("service-key".to_string())));
        store.record(record()).await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        let (key, body) = &received[0];
        assert_eq!(key.as_deref(), Some("service-key"));

        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["tournamentId"], "20261016_1412");
        assert_eq!(rows[0]["gameNumber"], 3);
        assert_eq!(rows[0]["botName"], "alpha");
        assert_eq!(rows[0]["matchKills"], 1);
        assert_eq!(rows[1]["totalDeaths"], 4);
        assert!(rows[1]["recordedAt"].is_string());
    }

    #[tokio::test]
    async fn api_failure_surfaces_status() {
        let url = serve(Router::new().route(
            "/rest/v1/bot_stats",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        ))
        .await;

        let store = RestStatsStore::new(RestClient::new(url, None));
        match store.record(record()).await {
            Err(StoreError::Api { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
