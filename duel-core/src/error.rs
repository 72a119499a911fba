//! Error types and boundary validation for the session engine.
//!
//! Character sheets arrive from the User Directory (an external
//! collaborator, out of scope per spec §1) as plain data; [`duel-server`]
//! is expected to call [`validate_character_sheet`] right after fetching one
//! and before building a [`crate::character::Character`] from it, so the
//! derived-stat formulas in [`crate::character::DerivedStats`] (in
//! particular `100 / agility`) never see a value that would make them
//! ill-defined.

use thiserror::Error;

use crate::character::CharacterSheet;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("character sheet '{0}' has a non-positive stat or level, which the derived formulas can't accept")]
    InvalidCharacterSheet(String),
}

/// Rejects sheets whose stats would divide by zero or produce a nonsensical
/// character (spec §3's data model implies all four base stats and level
/// are positive integers).
pub fn validate_character_sheet(sheet: &CharacterSheet) -> Result<(), SessionError> {
    if sheet.strength < 0
        || sheet.agility <= 0
        || sheet.stamina <= 0
        || sheet.endurance <= 0
        || sheet.level < 1
    {
        return Err(SessionError::InvalidCharacterSheet(sheet.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> CharacterSheet {
        CharacterSheet {
            name: "a".into(),
            owner_username: "a-owner".into(),
            strength: 5,
            agility: 5,
            stamina: 5,
            endurance: 5,
            level: 1,
            experience: 0,
        }
    }

    #[test]
    fn accepts_a_well_formed_sheet() {
        assert!(validate_character_sheet(&sheet()).is_ok());
    }

    #[test]
    fn rejects_zero_agility() {
        let mut s = sheet();
        s.agility = 0;
        assert!(validate_character_sheet(&s).is_err());
    }

    #[test]
    fn rejects_zero_level() {
        let mut s = sheet();
        s.level = 0;
        assert!(validate_character_sheet(&s).is_err());
    }
}
