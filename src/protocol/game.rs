//! Game values carried through the handshake.
//!
//! The transport never interprets these beyond equality checks on the
//! variant. Status transitions belong to the game-logic collaborator, which
//! publishes the current phase through [`GameState`].

use crate::error::constants;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Which card-game ruleset a server instance runs.
///
/// Only `0` is assigned. Every other value is kept as `Reserved` so a peer
/// announcing an unknown ruleset is reported as a variant mismatch rather
/// than a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum GameVariant {
    #[default]
    TexasHoldem,
    Reserved(u8),
}

impl From<u8> for GameVariant {
    fn from(value: u8) -> Self {
        match value {
            0 => GameVariant::TexasHoldem,
            other => GameVariant::Reserved(other),
        }
    }
}

impl From<GameVariant> for u8 {
    fn from(variant: GameVariant) -> Self {
        match variant {
            GameVariant::TexasHoldem => 0,
            GameVariant::Reserved(value) => value,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVariant::TexasHoldem => f.write_str("Texas Hold'em"),
            GameVariant::Reserved(_) => f.write_str("Unknown"),
        }
    }
}

/// Coarse game phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum GameStatus {
    #[default]
    Waiting = 0,
    Dealing = 1,
    PreFlop = 2,
    Flop = 3,
    Turn = 4,
    River = 5,
}

impl TryFrom<u8> for GameStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameStatus::Waiting),
            1 => Ok(GameStatus::Dealing),
            2 => Ok(GameStatus::PreFlop),
            3 => Ok(GameStatus::Flop),
            4 => Ok(GameStatus::Turn),
            5 => Ok(GameStatus::River),
            other => Err(format!("{}: {other}", constants::ERR_UNKNOWN_GAME_STATUS)),
        }
    }
}

impl From<GameStatus> for u8 {
    fn from(status: GameStatus) -> Self {
        status as u8
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::Waiting => "WAITING",
            GameStatus::Dealing => "DEALING",
            GameStatus::PreFlop => "PRE_FLOP",
            GameStatus::Flop => "FLOP",
            GameStatus::Turn => "TURN",
            GameStatus::River => "RIVER",
        };
        f.write_str(name)
    }
}

/// Current game phase, shared between the game logic and the transport.
///
/// Reads and writes are atomic so the game logic can publish a new phase
/// from any task while outgoing handshakes pick it up.
#[derive(Debug, Default)]
pub struct GameState {
    status: AtomicU8,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: GameStatus) -> Self {
        Self {
            status: AtomicU8::new(status.into()),
        }
    }

    pub fn status(&self) -> GameStatus {
        // Only valid discriminants are ever stored.
        GameStatus::try_from(self.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_status(&self, status: GameStatus) {
        self.status.store(status.into(), Ordering::Release);
    }
}
