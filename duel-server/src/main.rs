mod auth;
mod config;
mod error;
mod game_ws;
mod kv;
mod lobby;
mod registry;
mod user_directory;

use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{reload_config, ConfigHandle};
use duel_core::session::{GameOutcome, SessionResult, RATING_DELTA};
use kv::InMemoryKvStore;
use lobby::AppState;
use registry::SessionRegistry;
use user_directory::{HttpUserDirectory, UserDirectory};

#[tokio::main]
/// Activates structured tracing, spawns the session watchdog and the
/// matchmaker, then serves the lobby websocket, the per-room game
/// websocket, and the auth-token endpoint. Listens on port 8080.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = Arc::new(ConfigHandle::default());
    if let Err(message) = reload_config(&config).await {
        tracing::error!(message, "Initial config load error.");
        panic!("Initial config load error: {}", message);
    }

    let registry = Arc::new(SessionRegistry::default());
    let kv: Arc<dyn kv::KvStore> = Arc::new(InMemoryKvStore::default());
    let user_directory_url = config.snapshot().await.user_directory_url;
    let user_directory: Arc<dyn UserDirectory> =
        Arc::new(HttpUserDirectory::new(user_directory_url));

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let state = AppState::new(
        config,
        registry.clone(),
        kv.clone(),
        user_directory.clone(),
        outcome_tx,
    );

    tokio::spawn(process_outcomes(outcome_rx, user_directory));

    let watchdog_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            watchdog_state
                .registry
                .sweep_ended(watchdog_state.kv.as_ref())
                .await;
        }
    });

    tokio::spawn(lobby::run_matchmaker(state.clone()));

    let app = Router::new()
        .route("/gam/api/v1/get_auth_token/", get(auth::get_auth_token))
        .route("/ws/global/:username/", get(lobby_ws_handler))
        .route(
            "/ws/game/:room_token/:username/:char_name/:token/",
            get(game_ws_handler),
        )
        .route("/reload", get(reload_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}

/// Drains finished-session outcomes and drives the (fire-and-forget) User
/// Directory bookkeeping described in spec §4.3: win/loss/draw counters,
/// the `RATING_PER_GAME` rating swing, and the winner's experience gain.
async fn process_outcomes(
    mut outcomes: mpsc::UnboundedReceiver<GameOutcome>,
    user_directory: Arc<dyn UserDirectory>,
) {
    while let Some(outcome) = outcomes.recv().await {
        let user_directory = user_directory.clone();
        tokio::spawn(async move {
            match outcome.result {
                SessionResult::Draw {
                    p1_username,
                    p2_username,
                } => {
                    let _ = user_directory.add_draw(&p1_username).await;
                    let _ = user_directory.add_draw(&p2_username).await;
                }
                SessionResult::Win {
                    winner_username,
                    loser_username,
                    winner_character_name,
                    experience_gained,
                } => {
                    let _ = user_directory.add_win(&winner_username).await;
                    let _ = user_directory.add_loss(&loser_username).await;
                    let _ = user_directory
                        .change_rating(&winner_username, RATING_DELTA)
                        .await;
                    let _ = user_directory
                        .change_rating(&loser_username, -RATING_DELTA)
                        .await;
                    if experience_gained > 0 {
                        let _ = user_directory
                            .update_char_experience(&winner_character_name, experience_gained)
                            .await;
                    }
                }
            }
        });
    }
}

async fn lobby_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| lobby::handle_lobby_socket(socket, state, username))
}

async fn game_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((room_token, username, char_name, token)): Path<(String, String, String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        game_ws::handle_game_socket(socket, state, room_token, username, char_name, token)
    })
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> String {
    match reload_config(&state.config).await {
        Ok(_) => "config reloaded".to_string(),
        Err(e) => format!("Config reload failed: {}", e),
    }
}

