//! C4 — the global lobby (presence, chat, invites) and the matchmaker that
//! pairs searching players into sessions, falling back to a bot opponent
//! per spec §4.4.
//!
//! The connection handler follows the teacher's `processing_module.rs`
//! shape exactly: split the socket, spawn one task that only sends and one
//! that only receives, race them with `tokio::select!`, and abort whichever
//! loses — the difference here is what gets sent (JSON lobby events merged
//! from a personal channel and a lobby-wide broadcast) and what inbound
//! messages mean (the `/command` grammar from the original `chat_consumer.py`).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Local;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{Action, LobbyClientFrame, LobbyServerMessage};
use tokio::sync::{broadcast, mpsc, Mutex, Notify};

use crate::config::ConfigHandle;
use crate::kv::{ChatEntry, KvStore};
use crate::registry::SessionRegistry;
use crate::user_directory::UserDirectory;
use duel_core::bot::{bot_sheet, choose_action, BOT_USERNAME};
use duel_core::character::Character;
use duel_core::session::{AttachOutcome, GameOutcome};

/// Everything the lobby handlers and the matchmaker share.
pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub registry: Arc<SessionRegistry>,
    pub kv: Arc<dyn KvStore>,
    pub user_directory: Arc<dyn UserDirectory>,
    /// Public chat/presence fan-out: every connected lobby client subscribes.
    pub lobby_broadcast: broadcast::Sender<LobbyServerMessage>,
    /// Per-user channels for targeted messages (`/private`, `/invite`, match
    /// notifications) that shouldn't go to everyone.
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<LobbyServerMessage>>>,
    /// Wakes the matchmaker loop early whenever `/search` is issued, so it
    /// doesn't wait out a full tick for an already-available pairing.
    matchmaker_poke: Notify,
    /// Where finished sessions post their outcome for User-Directory
    /// bookkeeping (spec §4.3's fire-and-forget rating/exp updates).
    pub outcomes: mpsc::UnboundedSender<GameOutcome>,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigHandle>,
        registry: Arc<SessionRegistry>,
        kv: Arc<dyn KvStore>,
        user_directory: Arc<dyn UserDirectory>,
        outcomes: mpsc::UnboundedSender<GameOutcome>,
    ) -> Arc<Self> {
        let (lobby_broadcast, _) = broadcast::channel(protocol::CHANNEL_BUFFER_SIZE);
        Arc::new(AppState {
            config,
            registry,
            kv,
            user_directory,
            lobby_broadcast,
            connections: Mutex::new(HashMap::new()),
            matchmaker_poke: Notify::new(),
            outcomes,
        })
    }

    async fn unregister_connection(&self, username: &str) {
        self.connections.lock().await.remove(username);
    }

    async fn send_to(&self, username: &str, message: LobbyServerMessage) {
        if let Some(tx) = self.connections.lock().await.get(username) {
            let _ = tx.send(message);
        }
    }

    async fn broadcast_presence(&self) {
        let users = self.kv.online_users().await;
        let _ = self
            .lobby_broadcast
            .send(LobbyServerMessage::NewUser { users });
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Parses one inbound lobby chat frame into the command it names, falling
/// back to a public message for anything unrecognized (the original
/// `ConsumerUtils.parse_message`'s "unknown command -> public" behavior).
enum Command {
    Public(String),
    Private { target: String, text: String },
    Invite { target: String },
    Search,
}

fn parse_command(text: &str) -> Command {
    let mut parts = text.splitn(3, ' ');
    match parts.next() {
        Some("/message") => Command::Public(parts.collect::<Vec<_>>().join(" ")),
        Some("/private") => match (parts.next(), parts.next()) {
            (Some(target), Some(rest)) => Command::Private {
                target: target.to_string(),
                text: rest.to_string(),
            },
            _ => Command::Public(text.to_string()),
        },
        Some("/invite") => match parts.next() {
            Some(target) => Command::Invite {
                target: target.to_string(),
            },
            None => Command::Public(text.to_string()),
        },
        Some("/search") => Command::Search,
        _ => Command::Public(text.to_string()),
    }
}

/// Drives one lobby websocket connection from attach to disconnect.
pub async fn handle_lobby_socket(socket: WebSocket, state: Arc<AppState>, username: String) {
    state.kv.mark_online(&username).await;
    state.broadcast_presence().await;

    let (sender, receiver) = socket.split();
    let (personal_tx, personal_rx) = mpsc::unbounded_channel();
    state
        .connections
        .lock()
        .await
        .insert(username.clone(), personal_tx);
    let lobby_rx = state.lobby_broadcast.subscribe();

    let mut send_task = tokio::spawn(send_logic(
        sender,
        personal_rx,
        lobby_rx,
        state.kv.clone(),
    ));
    let mut receive_task = tokio::spawn(receive_logic(receiver, state.clone(), username.clone()));

    tokio::select! {
        _ = &mut send_task => { receive_task.abort(); }
        _ = &mut receive_task => { send_task.abort(); }
    }

    state.kv.mark_offline(&username).await;
    state.kv.leave_search_pool(&username).await;
    state.unregister_connection(&username).await;
    state.broadcast_presence().await;
}

async fn send_logic(
    mut sender: SplitSink<WebSocket, Message>,
    mut personal_rx: mpsc::UnboundedReceiver<LobbyServerMessage>,
    mut lobby_rx: broadcast::Receiver<LobbyServerMessage>,
    kv: Arc<dyn KvStore>,
) {
    for entry in kv.recent_chat().await {
        let replay = LobbyServerMessage::Message {
            message: entry.message,
            username: entry.username,
            timestamp: entry.timestamp,
        };
        if send_json(&mut sender, &replay).await.is_err() {
            return;
        }
    }

    loop {
        let message = tokio::select! {
            msg = personal_rx.recv() => match msg {
                Some(msg) => msg,
                None => return,
            },
            msg = lobby_rx.recv() => match msg {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped_messages = skipped, "lagging on lobby broadcast");
                    continue;
                }
            },
        };
        if send_json(&mut sender, &message).await.is_err() {
            return;
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &LobbyServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("LobbyServerMessage always serializes");
    sender.send(Message::Text(text.into())).await
}

async fn receive_logic(mut receiver: SplitStream<WebSocket>, state: Arc<AppState>, username: String) {
    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return,
            Ok(_) => continue,
        };
        let parsed: LobbyClientFrame = match serde_json::from_str(&frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(?err, "dropping malformed lobby frame");
                continue;
            }
        };

        let history_limit = state.config.snapshot().await.chat_history_limit;
        match parse_command(&parsed.message) {
            Command::Public(text) => {
                let ts = timestamp();
                state
                    .kv
                    .push_chat_entry(
                        ChatEntry {
                            username: username.clone(),
                            message: text.clone(),
                            timestamp: ts.clone(),
                        },
                        history_limit,
                    )
                    .await;
                let _ = state.lobby_broadcast.send(LobbyServerMessage::Message {
                    message: text,
                    username: username.clone(),
                    timestamp: ts,
                });
            }
            Command::Private { target, text } => {
                state
                    .send_to(
                        &target,
                        LobbyServerMessage::Private {
                            message: text,
                            username: username.clone(),
                            timestamp: timestamp(),
                        },
                    )
                    .await;
            }
            Command::Invite { target } => {
                if let Some(session) = state.registry.create_session(state.kv.as_ref()).await {
                    state
                        .send_to(
                            &target,
                            LobbyServerMessage::Invite {
                                message: format!("{username} invites you to a duel"),
                                username: username.clone(),
                                timestamp: timestamp(),
                                target_url: format!("/game_lobby/{}/", session.room_token),
                            },
                        )
                        .await;
                }
            }
            Command::Search => {
                state.kv.enter_search_pool(&username).await;
                state.matchmaker_poke.notify_one();
            }
        }
    }
}

/// The matchmaker loop (spec §4.4): wakes on a tick or a `/search` poke,
/// pairs up whoever is waiting, and spawns a bot opponent for anyone who's
/// waited `matchmaker_bot_after_ticks` ticks alone.
pub async fn run_matchmaker(state: Arc<AppState>) {
    let mut waited: HashMap<String, u32> = HashMap::new();
    loop {
        let (tick_seconds, bot_after) = {
            let config = state.config.snapshot().await;
            (config.matchmaker_tick_seconds, config.matchmaker_bot_after_ticks)
        };

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(tick_seconds)) => {}
            _ = state.matchmaker_poke.notified() => {}
        }

        let mut pool = state.kv.search_pool().await;
        waited.retain(|username, _| pool.contains(username));
        for username in &pool {
            *waited.entry(username.clone()).or_insert(0) += 1;
        }

        while pool.len() >= 2 {
            let a = pool.remove(0);
            let b = pool.remove(0);
            waited.remove(&a);
            waited.remove(&b);
            state.kv.leave_search_pool(&a).await;
            state.kv.leave_search_pool(&b).await;
            match_players(&state, a, b).await;
        }

        if let Some(username) = pool
            .into_iter()
            .find(|u| waited.get(u).copied().unwrap_or(0) >= bot_after)
        {
            waited.remove(&username);
            state.kv.leave_search_pool(&username).await;
            match_with_bot(&state, username).await;
        }
    }
}

async fn match_players(state: &Arc<AppState>, a: String, b: String) {
    let session = match state.registry.create_session(state.kv.as_ref()).await {
        Some(session) => session,
        None => {
            tracing::error!("room token space exhausted while matching {a} vs {b}");
            return;
        }
    };

    for username in [&a, &b] {
        state
            .send_to(
                username,
                LobbyServerMessage::GameMatch {
                    message: "a match was found".into(),
                    target_url: format!("/game_lobby/{}/", session.room_token),
                },
            )
            .await;
    }
}

async fn match_with_bot(state: &Arc<AppState>, username: String) {
    let session = match state.registry.create_session(state.kv.as_ref()).await {
        Some(session) => session,
        None => {
            tracing::error!("room token space exhausted while matching {username} against a bot");
            return;
        }
    };

    state
        .send_to(
            &username,
            LobbyServerMessage::GameMatch {
                message: "a match was found".into(),
                target_url: format!("/game_lobby/{}/", session.room_token),
            },
        )
        .await;

    let bot_character = Character::new(&bot_sheet());
    let outcome_tx = state.outcomes.clone();
    if let AttachOutcome::Attached(slot) = session.attach_character(bot_character, outcome_tx) {
        let session = session.clone();
        tokio::spawn(async move {
            let mut events = session.events.subscribe();
            let mut rng = rand::thread_rng();
            loop {
                let (own_status, opponent_status) = match events.recv().await {
                    Ok(protocol::GameServerMessage::GameStarted {
                        p1_username,
                        p1_status,
                        p2_status,
                        ..
                    }) => split_statuses(p1_username, p1_status, p2_status),
                    Ok(protocol::GameServerMessage::Turn {
                        p1_username,
                        p1_status,
                        p2_status,
                        ..
                    }) => split_statuses(p1_username, p1_status, p2_status),
                    Ok(protocol::GameServerMessage::GameResult { .. }) | Err(_) => break,
                    _ => continue,
                };
                let action: Action = choose_action(&own_status, &opponent_status, &mut rng);
                slot.lock().unwrap().set_action(action);
            }
        });
    }
}

/// `GameStarted`/`Turn` carry both players' status; picks out the bot's own
/// status vs. the opponent's by comparing `p1_username` against the bot's
/// fixed username, since the bot's slot may be attached as either player.
fn split_statuses(
    p1_username: String,
    p1_status: protocol::CharacterStatus,
    p2_status: protocol::CharacterStatus,
) -> (protocol::CharacterStatus, protocol::CharacterStatus) {
    if p1_username == BOT_USERNAME {
        (p1_status, p2_status)
    } else {
        (p2_status, p1_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_private_message_command() {
        match parse_command("/private bob hey there") {
            Command::Private { target, text } => {
                assert_eq!(target, "bob");
                assert_eq!(text, "hey there");
            }
            _ => panic!("expected a private command"),
        }
    }

    #[test]
    fn unknown_command_falls_back_to_public() {
        match parse_command("/unknown-thing hi") {
            Command::Public(text) => assert_eq!(text, "/unknown-thing hi"),
            _ => panic!("expected a public fallback"),
        }
    }

    #[test]
    fn plain_text_is_public() {
        match parse_command("hello everyone") {
            Command::Public(text) => assert_eq!(text, "hello everyone"),
            _ => panic!("expected a public message"),
        }
    }
}
