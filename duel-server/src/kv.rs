//! The KV Store is another external collaborator scoped out of this crate
//! per spec §1/§6 (the real deployment backs it with Redis). `duel-server`
//! only ever goes through this trait: presence, the lobby chat history ring
//! buffer, the matchmaker's search pool, and the room/auth token sets.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn mark_online(&self, username: &str);
    async fn mark_offline(&self, username: &str);
    async fn online_users(&self) -> Vec<String>;

    async fn push_chat_entry(&self, entry: ChatEntry, history_limit: usize);
    async fn recent_chat(&self) -> Vec<ChatEntry>;

    /// Adds `username` to the set of players actively searching for a
    /// match. Ticks waited is tracked by the matchmaker itself, not here.
    async fn enter_search_pool(&self, username: &str);
    async fn leave_search_pool(&self, username: &str);
    async fn search_pool(&self) -> Vec<String>;

    /// Reserves a freshly-minted room token, returning `false` if it's
    /// already taken (spec's pairwise room-token uniqueness property).
    async fn reserve_room_token(&self, token: &str) -> bool;
    async fn release_room_token(&self, token: &str);

    /// Stores a single-use auth token bound to a username.
    async fn store_auth_token(&self, token: &str, username: &str);
    /// Looks up a token's bound username without consuming it, so a caller
    /// can validate before committing to the attach that burns it.
    async fn peek_auth_token(&self, token: &str) -> Option<String>;
    /// Looks up and deletes a token atomically (single-use semantics).
    async fn take_auth_token(&self, token: &str) -> Option<String>;
}

#[derive(Default)]
struct InMemoryState {
    online: HashSet<String>,
    chat_history: VecDeque<ChatEntry>,
    search_pool: HashSet<String>,
    room_tokens: HashSet<String>,
    auth_tokens: HashMap<String, String>,
}

/// In-memory stand-in for the Redis-backed KV store. Good enough for tests
/// and for a single-process deployment; the real service swaps this out
/// for a Redis client implementing the same trait.
#[derive(Default)]
pub struct InMemoryKvStore {
    state: Mutex<InMemoryState>,
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn mark_online(&self, username: &str) {
        self.state.lock().await.online.insert(username.to_string());
    }

    async fn mark_offline(&self, username: &str) {
        self.state.lock().await.online.remove(username);
    }

    async fn online_users(&self) -> Vec<String> {
        self.state.lock().await.online.iter().cloned().collect()
    }

    async fn push_chat_entry(&self, entry: ChatEntry, history_limit: usize) {
        let mut state = self.state.lock().await;
        state.chat_history.push_back(entry);
        while state.chat_history.len() > history_limit {
            state.chat_history.pop_front();
        }
    }

    async fn recent_chat(&self) -> Vec<ChatEntry> {
        self.state.lock().await.chat_history.iter().cloned().collect()
    }

    async fn enter_search_pool(&self, username: &str) {
        self.state.lock().await.search_pool.insert(username.to_string());
    }

    async fn leave_search_pool(&self, username: &str) {
        self.state.lock().await.search_pool.remove(username);
    }

    async fn search_pool(&self) -> Vec<String> {
        self.state.lock().await.search_pool.iter().cloned().collect()
    }

    async fn reserve_room_token(&self, token: &str) -> bool {
        self.state.lock().await.room_tokens.insert(token.to_string())
    }

    async fn release_room_token(&self, token: &str) {
        self.state.lock().await.room_tokens.remove(token);
    }

    async fn store_auth_token(&self, token: &str, username: &str) {
        self.state
            .lock()
            .await
            .auth_tokens
            .insert(token.to_string(), username.to_string());
    }

    async fn peek_auth_token(&self, token: &str) -> Option<String> {
        self.state.lock().await.auth_tokens.get(token).cloned()
    }

    async fn take_auth_token(&self, token: &str) -> Option<String> {
        self.state.lock().await.auth_tokens.remove(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_token_reservation_is_exclusive() {
        let kv = InMemoryKvStore::default();
        assert!(kv.reserve_room_token("ABCD1234").await);
        assert!(!kv.reserve_room_token("ABCD1234").await);
        kv.release_room_token("ABCD1234").await;
        assert!(kv.reserve_room_token("ABCD1234").await);
    }

    #[tokio::test]
    async fn auth_token_is_single_use() {
        let kv = InMemoryKvStore::default();
        kv.store_auth_token("tok", "alice").await;
        assert_eq!(kv.take_auth_token("tok").await, Some("alice".to_string()));
        assert_eq!(kv.take_auth_token("tok").await, None);
    }

    #[tokio::test]
    async fn chat_history_respects_limit() {
        let kv = InMemoryKvStore::default();
        for i in 0..5 {
            kv.push_chat_entry(
                ChatEntry {
                    username: "a".into(),
                    message: format!("msg {i}"),
                    timestamp: "00:00:00".into(),
                },
                3,
            )
            .await;
        }
        let history = kv.recent_chat().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "msg 2");
    }
}
