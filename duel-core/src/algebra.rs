//! C1 — the pure action-resolution algebra.
//!
//! [`resolve`] is a deterministic function from a pair of chosen actions to
//! a pair of [`StatusDelta`]s. It never touches a [`crate::character::Character`]
//! directly: the caller extracts [`ActionPowers`] from each character first,
//! so the algebra itself stays a pure, easily tested function, matching the
//! canonical action table in spec §4.1.
//!
//! Effect application happens in two phases, per spec's stated procedure:
//! first every action's own effects, then every action's counter-effects
//! (triggered by what the *opponent* played). Ordering only matters across
//! these two phases, never within one — each phase's two sides touch
//! disjoint (parameter, side) pairs.

use protocol::Action;

/// Per-turn power values derived from a character's stats, handed to the
/// algebra at resolution time (spec: "power values are set from
/// Character-derived quantities at play time").
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionPowers {
    /// Energy spent by `ATTACK`/`DEFENCE`.
    pub epa: i64,
    /// Damage dealt by `ATTACK`.
    pub damage: i64,
    /// Energy gained by `REST`.
    pub aer: i64,
}

/// The accumulated effect of one turn on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusDelta {
    pub health: i64,
    pub energy: i64,
    pub skip: bool,
}

/// Resolves one turn. Returns `(left_delta, right_delta)`.
pub fn resolve(
    left: Action,
    left_powers: ActionPowers,
    right: Action,
    right_powers: ActionPowers,
) -> (StatusDelta, StatusDelta) {
    let mut left_delta = StatusDelta::default();
    let mut right_delta = StatusDelta::default();

    // Phase 1: each side's own (non-counter) effects.
    apply_self_effects(left, left_powers, &mut left_delta, &mut right_delta);
    apply_self_effects(right, right_powers, &mut right_delta, &mut left_delta);

    // Phase 2: counter-effects, triggered by what the opponent played.
    apply_counter_effects(left, right, &mut left_delta, &mut right_delta);
    apply_counter_effects(right, left, &mut right_delta, &mut left_delta);

    (left_delta, right_delta)
}

/// Applies `action`'s always-on effects: `own_delta` is this side's delta,
/// `enemy_delta` the opponent's.
fn apply_self_effects(
    action: Action,
    powers: ActionPowers,
    own_delta: &mut StatusDelta,
    enemy_delta: &mut StatusDelta,
) {
    match action {
        Action::Attack => {
            own_delta.energy -= powers.epa;
            enemy_delta.health -= powers.damage;
        }
        Action::Defence => {
            own_delta.energy -= powers.epa;
        }
        Action::Rest => {
            own_delta.energy += powers.aer;
        }
        Action::Feint | Action::Pass => {}
    }
}

/// Applies `own_action`'s counter-effects, if any, given what the opponent
/// (`opponent_action`) played. `own_delta`/`enemy_delta` as above.
fn apply_counter_effects(
    own_action: Action,
    opponent_action: Action,
    own_delta: &mut StatusDelta,
    enemy_delta: &mut StatusDelta,
) {
    match (own_action, opponent_action) {
        (Action::Defence, Action::Attack) => {
            // Block: per spec's resolution of the block-ordering open
            // question, this produces exactly 0 delta to the defender's
            // health this turn, regardless of what was accrued so far.
            own_delta.health = 0;
            enemy_delta.energy *= 2;
            enemy_delta.skip = true;
        }
        (Action::Feint, Action::Defence) => {
            enemy_delta.energy *= 2;
            enemy_delta.skip = true;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powers(epa: i64, damage: i64, aer: i64) -> ActionPowers {
        ActionPowers { epa, damage, aer }
    }

    #[test]
    fn attack_mirror_both_lose_damage_and_epa() {
        // Both characters {5,5,5,5}: epa=20, damage=20, aer=40.
        let p = powers(20, 20, 40);
        let (l, r) = resolve(Action::Attack, p, Action::Attack, p);
        assert_eq!(l, StatusDelta { health: -20, energy: -20, skip: false });
        assert_eq!(r, StatusDelta { health: -20, energy: -20, skip: false });
    }

    #[test]
    fn feint_beats_defence() {
        let p = powers(20, 20, 40);
        let (left, right) = resolve(Action::Feint, p, Action::Defence, p);
        assert_eq!(left, StatusDelta::default());
        assert_eq!(
            right,
            StatusDelta { health: 0, energy: -40, skip: true }
        );
    }

    #[test]
    fn defence_beats_attack_blocks_and_stuns() {
        let p = powers(20, 20, 40);
        let (left, right) = resolve(Action::Defence, p, Action::Attack, p);
        // Defender (left): health untouched by the incoming attack (blocked),
        // own energy spent on defending.
        assert_eq!(left, StatusDelta { health: 0, energy: -20, skip: false });
        // Attacker (right): own energy spend doubled by the penalty, stunned.
        assert_eq!(right, StatusDelta { health: 0, energy: -40, skip: true });
    }

    #[test]
    fn rest_vs_attack() {
        let p = powers(20, 20, 40);
        let (left, right) = resolve(Action::Rest, p, Action::Attack, p);
        assert_eq!(left, StatusDelta { health: -20, energy: 40, skip: false });
        assert_eq!(right, StatusDelta { health: 0, energy: -20, skip: false });
    }

    #[test]
    fn pass_is_idempotent() {
        let p = ActionPowers::default();
        let (l, r) = resolve(Action::Pass, p, Action::Pass, p);
        assert_eq!(l, StatusDelta::default());
        assert_eq!(r, StatusDelta::default());
    }

    #[test]
    fn resolve_is_commutative_under_swap() {
        let p = powers(20, 20, 40);
        let pairs = [
            (Action::Attack, Action::Defence),
            (Action::Feint, Action::Defence),
            (Action::Attack, Action::Attack),
            (Action::Rest, Action::Feint),
            (Action::Pass, Action::Attack),
        ];
        for (a, b) in pairs {
            let (d1, d2) = resolve(a, p, b, p);
            let (d2_swapped, d1_swapped) = resolve(b, p, a, p);
            assert_eq!(d1, d1_swapped);
            assert_eq!(d2, d2_swapped);
        }
    }
}
