//! C3 — the turn-synchronized game session state machine.
//!
//! A [`Session`] owns exactly two character slots and, once both are
//! filled, the single task that drives the turn loop (`LOBBY` → `RUNNING` →
//! `ENDED`, per spec §4.3). Each character's runtime state lives behind its
//! own `std::sync::Mutex`; the turn loop is the only task that resolves
//! turns, but connection tasks (and the bot) may call `Character::set_action`
//! directly through the slot at any time — a single, short, lock-protected
//! write, matching spec §5's "single atomic slot write" model.
//!
//! Broadcasting events to observers is done with a `tokio::sync::broadcast`
//! channel, exactly as the teacher's relay rooms fan host updates out to
//! subscribed clients: "attaching an observer" is just subscribing
//! (`self.events.subscribe()`), and "detaching" is dropping the receiver —
//! inherently idempotent, no separate bookkeeping list required.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use protocol::GameServerMessage;
use tokio::sync::{broadcast, mpsc};

use crate::algebra::{self, ActionPowers};
use crate::character::Character;

/// Turns a session plays before forcing a draw, per spec §3/§4.3.
pub const MAX_TURNS: u32 = 100;
/// Seconds a turn's deadline allows before resolving with whatever was set.
pub const TURN_TIME: u32 = 30;
/// Rating swing applied to the winner (positive) and loser (negative).
pub const RATING_DELTA: i64 = 25;
/// Base experience constant used in the winner's experience formula.
pub const EXP_GAIN: i64 = 10;

/// A thread-shared handle to one combatant's runtime state.
pub type CharacterSlot = Arc<Mutex<Character>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Lobby,
    Running,
    Ended,
}

struct SessionInner {
    phase: Phase,
    slot1: Option<CharacterSlot>,
    slot2: Option<CharacterSlot>,
}

impl SessionInner {
    fn find_slot_by_owner(&self, owner_username: &str) -> Option<CharacterSlot> {
        for slot in [&self.slot1, &self.slot2].into_iter().flatten() {
            if slot.lock().unwrap().owner_username == owner_username {
                return Some(slot.clone());
            }
        }
        None
    }
}

/// The outcome of a finished session, handed to the caller so it can drive
/// the (external, fire-and-forget) User Directory bookkeeping described in
/// spec §4.3.
#[derive(Debug, Clone)]
pub enum SessionResult {
    Draw {
        p1_username: String,
        p2_username: String,
    },
    Win {
        winner_username: String,
        loser_username: String,
        winner_character_name: String,
        /// `floor(EXP_GAIN * loser.level / winner.level)`, per spec §4.3.
        experience_gained: i64,
    },
}

#[derive(Debug, Clone)]
pub struct GameOutcome {
    pub room_token: String,
    pub result: SessionResult,
}

/// What happened when a character tried to occupy a session.
pub enum AttachOutcome {
    /// Filled an empty slot. Carries the slot handle the caller should bind
    /// its connection task to.
    Attached(CharacterSlot),
    /// The session is `RUNNING` and `owner_username` already has a slot —
    /// the caller should rehydrate the client without touching state.
    Reconnect(CharacterSlot),
    /// No empty slot and no matching existing slot; the caller should
    /// accept-then-close the connection without attaching anything.
    Rejected,
}

pub struct Session {
    pub room_token: String,
    inner: Mutex<SessionInner>,
    pub events: broadcast::Sender<GameServerMessage>,
}

impl Session {
    pub fn new(room_token: String) -> Arc<Self> {
        let (events, _) = broadcast::channel(protocol::CHANNEL_BUFFER_SIZE);
        Arc::new(Session {
            room_token,
            inner: Mutex::new(SessionInner {
                phase: Phase::Lobby,
                slot1: None,
                slot2: None,
            }),
            events,
        })
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().unwrap().phase == Phase::Ended
    }

    /// Attaches a newly connected character to this session, spawning the
    /// turn loop once both slots are filled (spec §4.3's `attach_character`
    /// transition).
    pub fn attach_character(
        self: &Arc<Self>,
        character: Character,
        outcome_tx: mpsc::UnboundedSender<GameOutcome>,
    ) -> AttachOutcome {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Running => match inner.find_slot_by_owner(&character.owner_username) {
                Some(slot) => AttachOutcome::Reconnect(slot),
                None => AttachOutcome::Rejected,
            },
            Phase::Ended => AttachOutcome::Rejected,
            Phase::Lobby => {
                let handle: CharacterSlot = Arc::new(Mutex::new(character));
                if inner.slot1.is_none() {
                    inner.slot1 = Some(handle.clone());
                } else if inner.slot2.is_none() {
                    inner.slot2 = Some(handle.clone());
                } else {
                    return AttachOutcome::Rejected;
                }

                if inner.slot1.is_some() && inner.slot2.is_some() {
                    inner.phase = Phase::Running;
                    let session = self.clone();
                    tokio::spawn(async move {
                        session.run_turn_loop(outcome_tx).await;
                    });
                }

                AttachOutcome::Attached(handle)
            }
        }
    }

    /// A one-shot rehydration snapshot for a reconnecting client, per
    /// spec §4.3's reconnect behavior ("does not rewind").
    pub fn reconnect_snapshot(&self) -> Option<GameServerMessage> {
        let inner = self.inner.lock().unwrap();
        let (c1, c2) = (inner.slot1.as_ref()?, inner.slot2.as_ref()?);
        let (c1, c2) = (c1.lock().unwrap(), c2.lock().unwrap());
        Some(GameServerMessage::GameStarted {
            message: "reconnect".into(),
            p1_username: c1.owner_username.clone(),
            p1_status: c1.status(),
            p2_username: c2.owner_username.clone(),
            p2_status: c2.status(),
        })
    }

    async fn run_turn_loop(self: Arc<Self>, outcome_tx: mpsc::UnboundedSender<GameOutcome>) {
        let (c1, c2) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.slot1.clone().expect("both slots filled to start"),
                inner.slot2.clone().expect("both slots filled to start"),
            )
        };

        let start = {
            let (g1, g2) = (c1.lock().unwrap(), c2.lock().unwrap());
            GameServerMessage::GameStarted {
                message: "game started".into(),
                p1_username: g1.owner_username.clone(),
                p1_status: g1.status(),
                p2_username: g2.owner_username.clone(),
                p2_status: g2.status(),
            }
        };
        if self.events.send(start).is_err() {
            tracing::warn!(room_token = %self.room_token, "no observers subscribed at game start");
        }

        for turn_number in 1..=MAX_TURNS {
            {
                let mut g1 = c1.lock().unwrap();
                let mut g2 = c2.lock().unwrap();
                g1.begin_turn();
                g2.begin_turn();
            }

            let mut remaining = TURN_TIME;
            loop {
                let both_ready = {
                    let g1 = c1.lock().unwrap();
                    let g2 = c2.lock().unwrap();
                    g1.ready_to_act && g2.ready_to_act
                };
                if both_ready || remaining == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
                let _ = self.events.send(GameServerMessage::Timer {
                    message: "timer update".into(),
                    timer: remaining,
                });
            }

            let turn_event = {
                let mut g1 = c1.lock().unwrap();
                let mut g2 = c2.lock().unwrap();

                let a1 = g1.consume_action();
                let a2 = g2.consume_action();
                let p1 = ActionPowers {
                    epa: g1.stats.epa,
                    damage: g1.stats.damage,
                    aer: g1.stats.aer,
                };
                let p2 = ActionPowers {
                    epa: g2.stats.epa,
                    damage: g2.stats.damage,
                    aer: g2.stats.aer,
                };
                let (d1, d2) = algebra::resolve(a1, p1, a2, p2);
                g1.apply_turn(d1);
                g2.apply_turn(d2);

                GameServerMessage::Turn {
                    message: format!(
                        "Turn {}: {} played {:?}, {} played {:?}",
                        turn_number, g1.name, a1, g2.name, a2
                    ),
                    p1_username: g1.owner_username.clone(),
                    p1_status: g1.status(),
                    p1_action: a1,
                    p2_username: g2.owner_username.clone(),
                    p2_status: g2.status(),
                    p2_action: a2,
                }
            };
            let _ = self.events.send(turn_event);

            if let Some(result) = self.check_end_condition(&c1, &c2, turn_number) {
                let outcome_text = match &result {
                    SessionResult::Draw { .. } => "draw".to_string(),
                    SessionResult::Win {
                        winner_username, ..
                    } => format!("{winner_username} win"),
                };
                let _ = self.events.send(GameServerMessage::GameResult {
                    message: format!("game ended: {outcome_text}"),
                });

                self.inner.lock().unwrap().phase = Phase::Ended;
                let _ = outcome_tx.send(GameOutcome {
                    room_token: self.room_token.clone(),
                    result,
                });
                return;
            }
        }
    }

    fn check_end_condition(
        &self,
        c1: &CharacterSlot,
        c2: &CharacterSlot,
        turn_number: u32,
    ) -> Option<SessionResult> {
        let g1 = c1.lock().unwrap();
        let g2 = c2.lock().unwrap();

        match (g1.is_dead, g2.is_dead) {
            (true, true) => Some(SessionResult::Draw {
                p1_username: g1.owner_username.clone(),
                p2_username: g2.owner_username.clone(),
            }),
            (true, false) => Some(SessionResult::Win {
                winner_username: g2.owner_username.clone(),
                loser_username: g1.owner_username.clone(),
                winner_character_name: g2.name.clone(),
                experience_gained: EXP_GAIN * g1.level / g2.level,
            }),
            (false, true) => Some(SessionResult::Win {
                winner_username: g1.owner_username.clone(),
                loser_username: g2.owner_username.clone(),
                winner_character_name: g1.name.clone(),
                experience_gained: EXP_GAIN * g2.level / g1.level,
            }),
            (false, false) if turn_number == MAX_TURNS => Some(SessionResult::Draw {
                p1_username: g1.owner_username.clone(),
                p2_username: g2.owner_username.clone(),
            }),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::CharacterSheet;

    fn sheet(name: &str, level: i64) -> CharacterSheet {
        CharacterSheet {
            name: name.into(),
            owner_username: format!("{name}-owner"),
            strength: 5,
            agility: 5,
            stamina: 5,
            endurance: 5,
            level,
            experience: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn draw_by_simultaneous_tko() {
        let session = Session::new("ROOMTOKN".into());
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let mut c1 = Character::new(&sheet("a", 1));
        c1.health = 1;
        let mut c2 = Character::new(&sheet("b", 1));
        c2.health = 1;

        let slot1 = match session.attach_character(c1, outcome_tx.clone()) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };
        let slot2 = match session.attach_character(c2, outcome_tx) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };

        slot1.lock().unwrap().set_action(protocol::Action::Attack);
        slot2.lock().unwrap().set_action(protocol::Action::Attack);

        let outcome = outcome_rx.recv().await.expect("session finished");
        assert!(matches!(outcome.result, SessionResult::Draw { .. }));
        assert!(session.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_forfeit_resolves_as_pass_pass() {
        let session = Session::new("ROOMTOKN".into());
        let (outcome_tx, _outcome_rx) = mpsc::unbounded_channel();

        let c1 = Character::new(&sheet("a", 1));
        let c2 = Character::new(&sheet("b", 1));

        let slot1 = match session.attach_character(c1, outcome_tx.clone()) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };
        let slot2 = match session.attach_character(c2, outcome_tx) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };

        let mut events = session.events.subscribe();
        // start event
        let _ = events.recv().await.unwrap();

        tokio::time::advance(Duration::from_secs(TURN_TIME as u64 + 1)).await;

        // Wait for the resolved turn event amongst the 30 timer ticks.
        loop {
            match events.recv().await.unwrap() {
                GameServerMessage::Turn {
                    p1_action, p2_action, ..
                } => {
                    assert_eq!(p1_action, protocol::Action::Pass);
                    assert_eq!(p2_action, protocol::Action::Pass);
                    break;
                }
                _ => continue,
            }
        }

        assert_eq!(
            slot1.lock().unwrap().last_action,
            protocol::Action::Pass
        );
        assert_eq!(
            slot2.lock().unwrap().last_action,
            protocol::Action::Pass
        );
    }

    #[tokio::test(start_paused = true)]
    async fn winner_gains_experience_and_loser_only_loses() {
        let session = Session::new("ROOMTOKN".into());
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let mut strong = Character::new(&sheet("strong", 4));
        strong.health = strong.stats.max_health; // stays alive
        let mut weak = Character::new(&sheet("weak", 2));
        weak.health = 1; // dies to the first hit

        let slot_strong = match session.attach_character(strong, outcome_tx.clone()) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };
        let slot_weak = match session.attach_character(weak, outcome_tx) {
            AttachOutcome::Attached(slot) => slot,
            _ => panic!("expected attach"),
        };

        slot_strong
            .lock()
            .unwrap()
            .set_action(protocol::Action::Attack);
        slot_weak.lock().unwrap().set_action(protocol::Action::Pass);

        let outcome = outcome_rx.recv().await.expect("session finished");
        match outcome.result {
            SessionResult::Win {
                winner_username,
                experience_gained,
                ..
            } => {
                assert_eq!(winner_username, "strong-owner");
                // floor(10 * loser.level(2) / winner.level(4)) = 5
                assert_eq!(experience_gained, 5);
            }
            other => panic!("expected a win, got {other:?}"),
        }
    }

    #[test]
    fn reconnect_to_running_session_matches_existing_owner() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let session = Session::new("ROOMTOKN".into());
            let (outcome_tx, _rx) = mpsc::unbounded_channel();

            let c1 = Character::new(&sheet("a", 1));
            let owner = c1.owner_username.clone();
            let c2 = Character::new(&sheet("b", 1));

            session.attach_character(c1, outcome_tx.clone());
            session.attach_character(c2, outcome_tx.clone());

            let mut reconnecting = Character::new(&sheet("a", 1));
            reconnecting.owner_username = owner;
            match session.attach_character(reconnecting, outcome_tx) {
                AttachOutcome::Reconnect(_) => {}
                _ => panic!("expected reconnect"),
            }
        });
    }
}
