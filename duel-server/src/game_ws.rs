//! The per-room game websocket: validates the single-use game token,
//! attaches (or reconnects) a character to its session, then forwards
//! `GameServerMessage` events out and `GameClientFrame` choices in. Same
//! split-and-race shape as `lobby.rs`'s connection handler.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{GameClientFrame, GameServerMessage};
use tokio::sync::broadcast;

use duel_core::character::Character;
use duel_core::error::validate_character_sheet;
use duel_core::session::{AttachOutcome, CharacterSlot};

use crate::lobby::AppState;

/// Validates the path's token/username pair and the requested character,
/// returning the slot to bind the connection to. The token is only
/// consumed (single-use) once the attach actually succeeds — a rejected
/// attempt leaves it valid for a retry, closing the replay hole without
/// punishing a client for a transient failure.
pub async fn authorize_and_attach(
    state: &Arc<AppState>,
    room_token: &str,
    username: &str,
    character_name: &str,
    game_token: &str,
) -> Result<(CharacterSlot, Option<GameServerMessage>), crate::error::ApiError> {
    let bound_username = state.kv.peek_auth_token(game_token).await;
    if bound_username.as_deref() != Some(username) {
        return Err(crate::error::ApiError::InvalidGameToken);
    }

    let session = state
        .registry
        .get(room_token)
        .await
        .ok_or(crate::error::ApiError::UnknownRoom)?;

    let sheets = state
        .user_directory
        .get_user_characters(username)
        .await
        .map_err(|_| crate::error::ApiError::UnknownRoom)?;
    let sheet = sheets
        .into_iter()
        .find(|s| s.name == character_name)
        .ok_or(crate::error::ApiError::UnknownRoom)?;
    validate_character_sheet(&sheet)?;

    let character = Character::new(&sheet);
    let outcome_tx = state.outcomes.clone();
    let outcome = match session.attach_character(character, outcome_tx) {
        AttachOutcome::Attached(slot) => Ok((
            slot,
            Some(GameServerMessage::PlayerConnect {
                message: "connected, waiting for an opponent".into(),
            }),
        )),
        AttachOutcome::Reconnect(slot) => Ok((slot, session.reconnect_snapshot())),
        AttachOutcome::Rejected => Err(crate::error::ApiError::UnknownRoom),
    };
    if outcome.is_ok() {
        state.kv.take_auth_token(game_token).await;
    }
    outcome
}

/// Drives one game-room websocket connection from accept to disconnect.
///
/// The token/room/character checks happen *after* the upgrade, inside the
/// already-accepted socket, per spec §7 item 3: a token-binding violation is
/// "accepted-then-closed without attaching a character", not an HTTP error —
/// the same idiom the teacher's `websocket_handler` uses for its own
/// handshake validation.
pub async fn handle_game_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    room_token: String,
    username: String,
    character_name: String,
    game_token: String,
) {
    let (slot, reconnect_message) =
        match authorize_and_attach(&state, &room_token, &username, &character_name, &game_token)
            .await
        {
            Ok(attached) => attached,
            Err(err) => {
                tracing::warn!(%room_token, %username, %err, "closing unattached game socket");
                let _ = socket.close().await;
                return;
            }
        };

    let session = match state.registry.get(&room_token).await {
        Some(session) => session,
        None => return,
    };

    let (mut sender, receiver) = socket.split();
    if let Some(message) = reconnect_message {
        let _ = send_json(&mut sender, &message).await;
    }

    let events = session.events.subscribe();
    let mut send_task = tokio::spawn(send_logic(sender, events));
    let mut receive_task = tokio::spawn(receive_logic(receiver, slot));

    tokio::select! {
        _ = &mut send_task => { receive_task.abort(); }
        _ = &mut receive_task => { send_task.abort(); }
    }
}

async fn send_logic(
    mut sender: SplitSink<WebSocket, Message>,
    mut events: broadcast::Receiver<GameServerMessage>,
) {
    loop {
        match events.recv().await {
            Ok(message) => {
                if send_json(&mut sender, &message).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped_messages = skipped, "lagging on session broadcast");
            }
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &GameServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("GameServerMessage always serializes");
    sender.send(Message::Text(text.into())).await
}

async fn receive_logic(mut receiver: SplitStream<WebSocket>, slot: CharacterSlot) {
    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return,
            Ok(_) => continue,
        };
        let parsed: GameClientFrame = match serde_json::from_str(&frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(?err, "dropping malformed game frame");
                continue;
            }
        };
        slot.lock().unwrap().set_action(parsed.choice);
    }
}
