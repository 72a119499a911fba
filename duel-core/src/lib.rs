//! Session-engine core: the action algebra, character runtime state, the
//! turn-synchronized session state machine, and the bot fallback opponent.
//! Everything here is free of transport and storage concerns — no axum, no
//! reqwest, no Redis-shaped traits — those live in `duel-server`.

pub mod algebra;
pub mod bot;
pub mod character;
pub mod error;
pub mod session;
