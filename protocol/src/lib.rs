//! Wire contracts shared between the lobby/game WebSocket handlers and any
//! client. These are JSON frames (not postcard) — the duel service exchanges
//! messages with browsers, so the wire format favors human-debuggable JSON
//! over a binary codec.

use serde::{Deserialize, Serialize};

/// The buffer size used for the internal channels that fan messages out to
/// connection tasks (per-room broadcast, per-search-pool poke channel, ...).
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// One of the five actions a character can commit to for a turn.
///
/// `Pass` is the zero value: characters default to it, and it is the only
/// action available while stunned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Attack,
    Defence,
    Feint,
    Rest,
    Pass,
}

impl Default for Action {
    fn default() -> Self {
        Action::Pass
    }
}

/// `[health, energy, available_actions, is_dead]`, exactly as specified for
/// `p1_status`/`p2_status` in the game-room wire protocol. Serializing a
/// plain tuple gives us this array shape for free.
pub type CharacterStatus = (i64, i64, Vec<Action>, bool);

/// Inbound frame on `/ws/game/<room_token>/<username>/<char_name>/<token>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameClientFrame {
    pub choice: Action,
}

/// Outbound frames on the game-room socket, tagged by `message_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum GameServerMessage {
    #[serde(rename = "player connect")]
    PlayerConnect { message: String },
    #[serde(rename = "game started")]
    GameStarted {
        message: String,
        p1_username: String,
        p1_status: CharacterStatus,
        p2_username: String,
        p2_status: CharacterStatus,
    },
    #[serde(rename = "turn")]
    Turn {
        message: String,
        p1_username: String,
        p1_status: CharacterStatus,
        p1_action: Action,
        p2_username: String,
        p2_status: CharacterStatus,
        p2_action: Action,
    },
    #[serde(rename = "timer")]
    Timer { message: String, timer: u32 },
    #[serde(rename = "game result")]
    GameResult { message: String },
}

/// Inbound frame on `/ws/global/<username>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyClientFrame {
    pub message: String,
    pub username: String,
}

/// Outbound frames on the global lobby socket, tagged by `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum LobbyServerMessage {
    #[serde(rename = "/message")]
    Message {
        message: String,
        username: String,
        timestamp: String,
    },
    #[serde(rename = "/private")]
    Private {
        message: String,
        username: String,
        timestamp: String,
    },
    #[serde(rename = "/invite")]
    Invite {
        message: String,
        username: String,
        timestamp: String,
        target_url: String,
    },
    #[serde(rename = "/new_user")]
    NewUser { users: Vec<String> },
    #[serde(rename = "/game_match")]
    GameMatch { message: String, target_url: String },
}

/// Response body of `GET /gam/api/v1/get_auth_token/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_status_serializes_as_array() {
        let status: CharacterStatus = (80, 40, vec![Action::Attack, Action::Rest], false);
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"[80,40,["attack","rest"],false]"#);
    }

    #[test]
    fn game_server_message_tags_by_message_type() {
        let msg = GameServerMessage::Timer {
            message: "timer update".into(),
            timer: 12,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message_type"], "timer");
        assert_eq!(json["timer"], 12);
    }

    #[test]
    fn lobby_server_message_tags_by_event_type() {
        let msg = LobbyServerMessage::GameMatch {
            message: "Game found".into(),
            target_url: "/game_lobby/abc12345/".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event_type"], "/game_match");
    }

    #[test]
    fn action_round_trips_through_lowercase_json() {
        for (action, text) in [
            (Action::Attack, "\"attack\""),
            (Action::Defence, "\"defence\""),
            (Action::Feint, "\"feint\""),
            (Action::Rest, "\"rest\""),
            (Action::Pass, "\"pass\""),
        ] {
            assert_eq!(serde_json::to_string(&action).unwrap(), text);
            let back: Action = serde_json::from_str(text).unwrap();
            assert_eq!(back, action);
        }
    }
}
