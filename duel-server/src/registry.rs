//! C5 — the session registry and the two kinds of tokens it mints: room
//! tokens (which name a [`Session`](duel_core::session::Session)) and
//! single-use game auth tokens (which bind one username to one room for
//! one connection attempt).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use duel_core::session::Session;
use rand::Rng;
use tokio::sync::RwLock;

use crate::kv::KvStore;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 8;
const MAX_MINT_ATTEMPTS: u32 = 100;
/// Room tokens are rejected-then-retried if already in the KV set; a live
/// entry still holding its token past this long is swept regardless of
/// whether its session ever ended (spec §4.5's "Room tokens ... TTL 24 h").
const ROOM_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

struct Entry {
    session: Arc<Session>,
    created_at: Instant,
}

/// Holds every live [`Session`], keyed by its room token.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionRegistry {
    /// Mints a fresh, KV-reserved room token and creates its session.
    /// Per spec's pairwise uniqueness property, this retries on collision
    /// up to [`MAX_MINT_ATTEMPTS`] times before giving up.
    pub async fn create_session(&self, kv: &dyn KvStore) -> Option<Arc<Session>> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_MINT_ATTEMPTS {
            let token = random_token(&mut rng);
            if kv.reserve_room_token(&token).await {
                let session = Session::new(token.clone());
                let entry = Entry {
                    session: session.clone(),
                    created_at: Instant::now(),
                };
                self.sessions.write().await.insert(token, entry);
                return Some(session);
            }
        }
        None
    }

    pub async fn get(&self, room_token: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(room_token)
            .map(|entry| entry.session.clone())
    }

    /// Drops ended sessions and sessions past [`ROOM_TOKEN_TTL`] from the
    /// registry and frees their room tokens, mirroring the teacher's
    /// watchdog-driven `cleanup_dead_rooms`.
    pub async fn sweep_ended(&self, kv: &dyn KvStore) {
        self.sweep(kv, ROOM_TOKEN_TTL).await
    }

    async fn sweep(&self, kv: &dyn KvStore, ttl: Duration) {
        let mut sessions = self.sessions.write().await;
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.session.is_ended() || entry.created_at.elapsed() >= ttl)
            .map(|(token, _)| token.clone())
            .collect();
        for token in stale {
            sessions.remove(&token);
            kv.release_room_token(&token).await;
        }
    }
}

/// Mints a single-use game auth token and stores it in the KV store bound
/// to `username`, per spec §6's auth-token endpoint.
pub async fn mint_game_token(kv: &dyn KvStore, username: &str) -> String {
    let mut rng = rand::thread_rng();
    let token = random_token(&mut rng);
    kv.store_auth_token(&token, username).await;
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    #[tokio::test]
    async fn create_session_mints_a_unique_reserved_token() {
        let registry = SessionRegistry::default();
        let kv = InMemoryKvStore::default();
        let session = registry.create_session(&kv).await.unwrap();
        assert_eq!(session.room_token.len(), TOKEN_LEN);
        assert!(registry.get(&session.room_token).await.is_some());
    }

    #[tokio::test]
    async fn sweep_ended_leaves_a_live_session_in_place() {
        let registry = SessionRegistry::default();
        let kv = InMemoryKvStore::default();
        let session = registry.create_session(&kv).await.unwrap();
        let token = session.room_token.clone();

        registry.sweep_ended(&kv).await;
        assert!(registry.get(&token).await.is_some());
        // The token is still reserved: re-reserving it must fail.
        assert!(!kv.reserve_room_token(&token).await);
    }

    #[tokio::test]
    async fn sweep_evicts_sessions_past_their_ttl_even_if_not_ended() {
        let registry = SessionRegistry::default();
        let kv = InMemoryKvStore::default();
        let session = registry.create_session(&kv).await.unwrap();
        let token = session.room_token.clone();
        assert!(!session.is_ended());

        registry.sweep(&kv, Duration::from_secs(0)).await;
        assert!(registry.get(&token).await.is_none());
        assert!(kv.reserve_room_token(&token).await);
    }

    #[tokio::test]
    async fn game_token_is_single_use_via_kv() {
        let kv = InMemoryKvStore::default();
        let token = mint_game_token(&kv, "alice").await;
        assert_eq!(kv.take_auth_token(&token).await, Some("alice".to_string()));
        assert_eq!(kv.take_auth_token(&token).await, None);
    }
}
