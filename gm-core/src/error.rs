//! Error types for the stateful layers.
//!
//! The rules engine and the normalizer never fail; these errors come from
//! parsing raw text and from scene or lore edits addressed to the wrong
//! record.

use crate::character::CharacterId;
use thiserror::Error;

/// Errors from gm-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown character: {0}")]
    UnknownCharacter(CharacterId),

    #[error("Character {0} is not an NPC")]
    NotAnNpc(CharacterId),

    #[error("Character {0} is not a PC")]
    NotAPc(CharacterId),

    #[error("NPC {0} is not in the scene")]
    NotInScene(CharacterId),

    #[error("Unknown lore entry: {0}")]
    UnknownLoreEntry(String),

    #[error("Memory content cannot be empty")]
    EmptyMemory,
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
