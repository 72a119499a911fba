//! C2 — per-combatant runtime state.
//!
//! A [`Character`] is constructed once per session from an immutable
//! [`CharacterSheet`] (the stats fetched from the User Directory) and then
//! mutated turn by turn by the owning [`crate::session::Session`]. The only
//! other writer is the connected client, which may only call
//! [`Character::set_action`].

use protocol::{Action, CharacterStatus};
use serde::{Deserialize, Serialize};

/// The immutable stat block a character is built from (mirrors the User
/// Directory's `/get_user_characters/<username>` response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub name: String,
    pub owner_username: String,
    pub strength: i64,
    pub agility: i64,
    pub stamina: i64,
    pub endurance: i64,
    pub level: i64,
    pub experience: i64,
}

/// Derived, per-turn power values handed to the action algebra. Computed
/// once at construction since the underlying stats never change mid-session.
#[derive(Debug, Clone, Copy)]
pub struct DerivedStats {
    pub max_energy: i64,
    pub max_health: i64,
    pub damage: i64,
    /// Energy cost per active action (`ATTACK`/`DEFENCE`).
    pub epa: i64,
    /// Base energy regeneration, applied every turn regardless of action.
    pub ber: i64,
    /// Active energy regeneration, gained by choosing `REST`.
    pub aer: i64,
}

impl DerivedStats {
    fn from_sheet(sheet: &CharacterSheet) -> Self {
        DerivedStats {
            max_energy: sheet.stamina * 20,
            max_health: sheet.endurance * 20,
            damage: sheet.strength * 4,
            epa: 100 / sheet.agility,
            ber: sheet.stamina * 2,
            aer: sheet.stamina * 8,
        }
    }
}

/// A combatant's full runtime state for the lifetime of one session.
#[derive(Debug, Clone)]
pub struct Character {
    pub name: String,
    pub owner_username: String,
    pub level: i64,
    pub experience: i64,
    pub stats: DerivedStats,

    pub health: i64,
    pub energy: i64,
    pub skip_turn: bool,
    pub is_dead: bool,

    pub current_action: Action,
    pub last_action: Action,
    pub ready_to_act: bool,
}

impl Character {
    pub fn new(sheet: &CharacterSheet) -> Self {
        let stats = DerivedStats::from_sheet(sheet);
        Character {
            name: sheet.name.clone(),
            owner_username: sheet.owner_username.clone(),
            level: sheet.level,
            experience: sheet.experience,
            stats,
            health: stats.max_health,
            energy: stats.max_energy,
            skip_turn: false,
            is_dead: false,
            current_action: Action::Pass,
            last_action: Action::Pass,
            ready_to_act: false,
        }
    }

    /// All actions this character may currently choose, per spec §4.2.
    pub fn available_actions(&self) -> Vec<Action> {
        if self.is_dead {
            return Vec::new();
        }
        if self.skip_turn {
            return vec![Action::Pass];
        }
        let mut actions = vec![Action::Attack, Action::Defence, Action::Feint, Action::Rest];
        if self.energy < self.stats.epa {
            actions.retain(|a| *a != Action::Attack && *a != Action::Defence);
        }
        actions
    }

    /// Accepts the action only if it is currently legal; hostile/invalid
    /// input is silently ignored, leaving `current_action` untouched.
    pub fn set_action(&mut self, action: Action) {
        if self.available_actions().contains(&action) {
            self.current_action = action;
            self.ready_to_act = true;
        }
    }

    /// Clears the turn's chosen action at the start of the next collection
    /// phase, per spec §4.3's "skip_turn is cleared at the start of the next
    /// turn (before input collection)".
    pub fn begin_turn(&mut self) {
        self.skip_turn = false;
    }

    /// Atomically captures the action to resolve this turn and resets for
    /// the next one.
    pub fn consume_action(&mut self) -> Action {
        self.last_action = self.current_action;
        self.current_action = Action::Pass;
        self.ready_to_act = false;
        self.last_action
    }

    /// Applies a resolved [`crate::algebra::StatusDelta`] plus this
    /// character's base energy regeneration.
    pub fn apply_turn(&mut self, delta: crate::algebra::StatusDelta) {
        self.health += delta.health;
        if self.health <= 0 {
            self.is_dead = true;
        }

        let new_energy = self.energy + delta.energy + self.stats.ber;
        self.energy = new_energy.clamp(0, self.stats.max_energy);

        self.skip_turn = delta.skip;
    }

    pub fn status(&self) -> CharacterStatus {
        (
            self.health,
            self.energy,
            self.available_actions(),
            self.is_dead,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str) -> CharacterSheet {
        CharacterSheet {
            name: name.into(),
            owner_username: format!("{name}-owner"),
            strength: 5,
            agility: 5,
            stamina: 5,
            endurance: 5,
            level: 1,
            experience: 0,
        }
    }

    #[test]
    fn derived_stats_match_spec_formulas() {
        let c = Character::new(&sheet("a"));
        assert_eq!(c.stats.max_energy, 100);
        assert_eq!(c.stats.max_health, 100);
        assert_eq!(c.stats.damage, 20);
        assert_eq!(c.stats.epa, 20);
        assert_eq!(c.stats.ber, 10);
        assert_eq!(c.stats.aer, 40);
    }

    #[test]
    fn available_actions_excludes_attack_defence_below_epa() {
        let mut c = Character::new(&sheet("a"));
        c.energy = c.stats.epa;
        assert!(c.available_actions().contains(&Action::Attack));

        c.energy = c.stats.epa - 1;
        let actions = c.available_actions();
        assert!(!actions.contains(&Action::Attack));
        assert!(!actions.contains(&Action::Defence));
        assert!(actions.contains(&Action::Feint));
        assert!(actions.contains(&Action::Rest));
    }

    #[test]
    fn stunned_character_may_only_pass() {
        let mut c = Character::new(&sheet("a"));
        c.skip_turn = true;
        assert_eq!(c.available_actions(), vec![Action::Pass]);
    }

    #[test]
    fn dead_character_has_no_actions() {
        let mut c = Character::new(&sheet("a"));
        c.is_dead = true;
        assert!(c.available_actions().is_empty());
    }

    #[test]
    fn set_action_ignores_illegal_choice() {
        let mut c = Character::new(&sheet("a"));
        c.energy = 0;
        c.set_action(Action::Attack);
        assert_eq!(c.current_action, Action::Pass);
        assert!(!c.ready_to_act);
    }

    #[test]
    fn consume_action_resets_state() {
        let mut c = Character::new(&sheet("a"));
        c.set_action(Action::Rest);
        let consumed = c.consume_action();
        assert_eq!(consumed, Action::Rest);
        assert_eq!(c.last_action, Action::Rest);
        assert_eq!(c.current_action, Action::Pass);
        assert!(!c.ready_to_act);
    }

    #[test]
    fn energy_clamps_to_max_and_zero() {
        let mut c = Character::new(&sheet("a"));
        c.apply_turn(crate::algebra::StatusDelta {
            health: 0,
            energy: 1000,
            skip: false,
        });
        assert_eq!(c.energy, c.stats.max_energy);

        c.apply_turn(crate::algebra::StatusDelta {
            health: 0,
            energy: -1000,
            skip: false,
        });
        assert_eq!(c.energy, 0);
    }

    #[test]
    fn health_below_zero_marks_dead_and_is_not_clamped() {
        let mut c = Character::new(&sheet("a"));
        c.apply_turn(crate::algebra::StatusDelta {
            health: -1000,
            energy: 0,
            skip: false,
        });
        assert!(c.is_dead);
        assert!(c.health < 0);
    }
}
