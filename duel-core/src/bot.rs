//! The synthetic opponent the matchmaker falls back to when no human match
//! is found in time (spec §4.4). Stats are the canonical bot sheet
//! `{strength: 5, agility: 5, stamina: 5, endurance: 5, level: 1}`; its move
//! is an opponent-aware weighted sample, matching the original `ai_logic.py`
//! table (with that module's dict-iteration bug fixed rather than carried
//! forward — iterating `{action: weight}` must walk `.items()`, not the bare
//! dict).

use protocol::{Action, CharacterStatus};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::character::CharacterSheet;

pub const BOT_USERNAME: &str = "bot";
pub const BOT_CHARACTER_NAME: &str = "Training Dummy";

/// The bot's fixed stat sheet, used whenever the matchmaker spawns one.
pub fn bot_sheet() -> CharacterSheet {
    CharacterSheet {
        name: BOT_CHARACTER_NAME.into(),
        owner_username: BOT_USERNAME.into(),
        strength: 5,
        agility: 5,
        stamina: 5,
        endurance: 5,
        level: 1,
        experience: 0,
    }
}

const CANDIDATES: [Action; 5] = [
    Action::Attack,
    Action::Defence,
    Action::Feint,
    Action::Rest,
    Action::Pass,
];

/// Builds the weighted action multiset from spec §4.4's table: start
/// `{ATTACK:1, DEFENCE:1, FEINT:1, REST:0, PASS:0}`, add REST below 50
/// energy, add ATTACK/FEINT/DEFENCE for the corresponding energy/health
/// advantage over `opponent`, then zero DEFENCE/FEINT if the opponent
/// couldn't ATTACK or DEFENCE this turn anyway. Finally intersects with
/// `own`'s currently available actions.
fn action_weights(own: &CharacterStatus, opponent: &CharacterStatus) -> Vec<(Action, u32)> {
    let (own_health, own_energy, own_available, _) = own;
    let (opp_health, opp_energy, opp_available, _) = opponent;

    let mut weights = [1u32, 1, 1, 0, 0]; // Attack, Defence, Feint, Rest, Pass
    if *own_energy < 50 {
        weights[3] += 1;
    }
    if own_energy > opp_energy {
        weights[0] += 1;
    }
    if own_health > opp_health {
        weights[2] += 1;
    }
    if own_health < opp_health {
        weights[1] += 1;
    }

    let opponent_can_threaten =
        opp_available.contains(&Action::Attack) || opp_available.contains(&Action::Defence);
    if !opponent_can_threaten {
        weights[1] = 0;
        weights[2] = 0;
    }

    CANDIDATES
        .into_iter()
        .zip(weights)
        .filter(|(action, weight)| *weight > 0 && own_available.contains(action))
        .collect()
}

/// Picks the bot's move for this turn, given its own status and the
/// opponent's, both as broadcast on the wire (spec §4.4).
pub fn choose_action<R: Rng + ?Sized>(
    own: &CharacterStatus,
    opponent: &CharacterStatus,
    rng: &mut R,
) -> Action {
    let own_energy = own.1;
    if own_energy < 20 {
        return Action::Pass;
    }

    let weighted = action_weights(own, opponent);
    if weighted.is_empty() {
        return Action::Pass;
    }
    let dist = WeightedIndex::new(weighted.iter().map(|(_, w)| *w))
        .expect("at least one positive weight since weighted is non-empty");
    weighted[dist.sample(rng)].0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn status(health: i64, energy: i64, available: Vec<Action>) -> CharacterStatus {
        (health, energy, available, false)
    }

    #[test]
    fn low_energy_always_passes() {
        let own = status(100, 19, vec![Action::Attack, Action::Rest]);
        let opponent = status(100, 0, vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_action(&own, &opponent, &mut rng), Action::Pass);
    }

    #[test]
    fn stunned_bot_always_passes() {
        let own = status(100, 100, vec![Action::Pass]);
        let opponent = status(100, 100, vec![Action::Attack]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_action(&own, &opponent, &mut rng), Action::Pass);
    }

    #[test]
    fn excludes_defence_and_feint_when_opponent_cannot_threaten() {
        let own = status(
            100,
            100,
            vec![Action::Attack, Action::Defence, Action::Feint, Action::Rest],
        );
        let opponent = status(50, 50, vec![Action::Rest, Action::Pass]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let action = choose_action(&own, &opponent, &mut rng);
            assert!(action != Action::Defence && action != Action::Feint);
        }
    }

    #[test]
    fn only_samples_from_available_actions() {
        let own = status(100, 100, vec![Action::Feint, Action::Rest]);
        let opponent = status(100, 100, vec![Action::Attack, Action::Defence]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let action = choose_action(&own, &opponent, &mut rng);
            assert!(action == Action::Feint || action == Action::Rest);
        }
    }
}
