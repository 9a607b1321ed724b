//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{issue_host_token, require_host, AuthError};
use crate::tournament::{BotStanding, BotSummary, RegistryError, TournamentError};
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;
use crate::ws::protocol::WorldSnapshot;

/// Upper bound on any control request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Any origin unless CLIENT_ORIGIN lists some
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    let cors = if state.config.client_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .client_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        cors.allow_origin(origins)
    };

    // Open to bots and observers
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/login", post(login_handler))
        .route("/join", post(join_handler))
        .route("/set-url", put(set_url_handler))
        .route("/teams", get(teams_handler))
        .route("/status", get(status_handler))
        .route("/stats", get(stats_handler))
        .route("/game-state", get(game_state_handler));

    // Host token required
    let host_routes = Router::new()
        .route("/add-bot", post(add_bot_handler))
        .route("/remove-bot", delete(remove_bot_handler))
        .route("/start-tournament", post(start_handler))
        .route("/pause-tournament", post(pause_handler))
        .route("/resume-tournament", post(resume_handler))
        .route("/stop-tournament", post(stop_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_host));

    let control_routes = public_routes
        .merge(host_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .merge(control_routes)
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

/// Present and non-blank, or a 400 naming what is needed
fn required(value: Option<String>, what: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} required", what)))
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    server_time: u64,
    tournament_active: bool,
    registered_bots: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        server_time: unix_millis(),
        tournament_active: state.tournament.is_active(),
        registered_bots: state.registry.len(),
    })
}

// ============================================================================
// Host login
// ============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    message: &'static str,
    token: String,
}

async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let password = required(req.password, "password")?;
    if password != state.config.host_password {
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let token = issue_host_token(&state.config.host_password, unix_millis() / 1000)?;
    info!("Host logged in");

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful",
        token,
    }))
}

// ============================================================================
// Bot endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    #[serde(default)]
    bot_name: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

async fn join_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.limiter.check_join() {
        return Err(AppError::TooManyRequests);
    }
    if state.tournament.is_active() {
        return Err(AppError::Forbidden(
            "Cannot join during an active tournament".to_string(),
        ));
    }

    let bot_name = required(req.bot_name, "botName, password, and color are")?;
    let password = required(req.password, "botName, password, and color are")?;
    let color = required(req.color, "botName, password, and color are")?;

    state
        .registry
        .join(&bot_name, &password, &color)
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    Ok(message(format!("Bot {} joined successfully", bot_name)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetUrlRequest {
    #[serde(default)]
    bot_name: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    action_url: Option<String>,
}

async fn set_url_handler(
    State(state): State<AppState>,
    Json(req): Json<SetUrlRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.limiter.check_set_url() {
        return Err(AppError::TooManyRequests);
    }

    let bot_name = required(req.bot_name, "botName, password, and actionUrl are")?;
    let password = required(req.password, "botName, password, and actionUrl are")?;
    let action_url = required(req.action_url, "botName, password, and actionUrl are")?;

    state
        .registry
        .set_action_url(&bot_name, &password, &action_url)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // Running tournaments pick it up on the bot's next poll
    state.tournament.update_action_url(&bot_name, &action_url);

    Ok(message("Action URL set successfully"))
}

// ============================================================================
// Host endpoints
// ============================================================================

#[derive(Deserialize)]
struct AddBotRequest {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Serialize)]
struct AddBotResponse {
    message: String,
    bot: BotSummary,
}

async fn add_bot_handler(
    State(state): State<AppState>,
    Json(req): Json<AddBotRequest>,
) -> Result<Json<AddBotResponse>, AppError> {
    if state.tournament.is_active() {
        return Err(AppError::Forbidden(
            "Cannot add bot during an active tournament".to_string(),
        ));
    }

    let strategy = required(req.strategy, "Strategy and color are")?;
    let color = required(req.color, "Strategy and color are")?;
    let url = state
        .config
        .strategies
        .get(&strategy)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown strategy {}", strategy)))?;

    let bot_name = format!("{} bot {}", strategy, rand::thread_rng().gen_range(0..1000));
    let password = Uuid::new_v4().to_string();

    state
        .registry
        .join(&bot_name, &password, &color)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    if let Some(url) = url {
        state.registry.set_action_url(&bot_name, &password, url)?;
    }

    let bot = state
        .registry
        .get(&bot_name)
        .ok_or_else(|| RegistryError::NotFound(bot_name.clone()))?;

    Ok(Json(AddBotResponse {
        message: format!("Bot {} added successfully", bot_name),
        bot,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveBotRequest {
    #[serde(default)]
    bot_name: Option<String>,
}

async fn remove_bot_handler(
    State(state): State<AppState>,
    Json(req): Json<RemoveBotRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let bot_name = required(req.bot_name, "botName")?;
    if !state.registry.remove(&bot_name) {
        return Err(RegistryError::NotFound(bot_name).into());
    }
    Ok(message("Bot removed successfully"))
}

async fn start_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    let tournament = state.tournament.start(state.registry.roster_bots())?;
    Ok(message(format!("Tournament {} started", tournament.id())))
}

async fn pause_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.tournament.pause()?;
    Ok(message("Tournament paused"))
}

async fn resume_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.tournament.resume()?;
    Ok(message("Tournament resumed"))
}

async fn stop_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.tournament.stop()?;
    Ok(message("Tournament stopped"))
}

// ============================================================================
// Read-only views
// ============================================================================

#[derive(Serialize)]
struct Team {
    name: String,
    color: String,
}

#[derive(Serialize)]
struct TeamsResponse {
    teams: Vec<Team>,
}

async fn teams_handler(State(state): State<AppState>) -> Json<TeamsResponse> {
    let teams = state
        .registry
        .list()
        .into_iter()
        .map(|bot| Team {
            name: bot.name,
            color: bot.color,
        })
        .collect();
    Json(TeamsResponse { teams })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    tournament_active: bool,
    bots: Vec<BotSummary>,
    paused: bool,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        tournament_active: state.tournament.is_active(),
        bots: state.registry.list(),
        paused: state.tournament.is_paused(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    bots: Vec<BotStanding>,
    game_counter: u32,
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let (bots, game_counter) = state.tournament.standings();
    Json(StatsResponse { bots, game_counter })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameStateResponse {
    #[serde(flatten)]
    state: WorldSnapshot,
    game_number: u32,
}

async fn game_state_handler(State(state): State<AppState>) -> Json<Option<GameStateResponse>> {
    Json(
        state
            .tournament
            .latest_state()
            .map(|(state, game_number)| GameStateResponse { state, game_number }),
    )
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests,
}

impl From<TournamentError> for AppError {
    fn from(e: TournamentError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateName(_) => AppError::Conflict(e.to_string()),
            RegistryError::NotFound(_) => AppError::NotFound(e.to_string()),
            RegistryError::InvalidPassword => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
