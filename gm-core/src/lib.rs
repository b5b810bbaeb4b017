//! Game-master assistant core for D&D 5e.
//!
//! This crate provides:
//! - A normalizer that turns loosely shaped character JSON into a canonical
//!   [`Character`] with every substructure present
//! - A pure rules engine for derived statistics and damage-per-round
//!   estimates
//! - Explicit scene state for multi-NPC dialogue and the party damage table
//! - A lore book linked to characters
//!
//! # Quick Start
//!
//! ```
//! use gm_core::{normalize, rules, SceneConfig, SceneState};
//! use serde_json::json;
//!
//! let fighter = normalize(json!({
//!     "_id": {"$oid": "pc-1"},
//!     "name": "Valeros",
//!     "character_type": "PC",
//!     "system": {
//!         "abilities": {"str": {"value": 16}},
//!         "details": {"level": 5}
//!     },
//!     "items": [{
//!         "name": "Longsword",
//!         "type": "weapon",
//!         "system": {"damage": {"base": {"denomination": 8, "number": 1}}}
//!     }]
//! }));
//! assert_eq!(fighter.proficiency, Some(3));
//!
//! let longsword = fighter.find_attack("Longsword").unwrap();
//! let entry = rules::damage_per_round(&fighter, &longsword, 15).unwrap();
//! assert!(entry.dpr_advantage > entry.dpr_normal);
//!
//! let mut scene = SceneState::new(SceneConfig::new().with_target_ac(16));
//! let id = scene.roster.upsert(fighter);
//! scene.toggle_pc(&id).unwrap();
//! scene.toggle_attack(&id, "Longsword").unwrap();
//! assert!(scene.party_dpr().total_dpr > 0.0);
//! ```

pub mod character;
pub mod dice;
pub mod error;
pub mod lore;
pub mod normalize;
pub mod rules;
pub mod scene;
pub mod testing;

// Primary public API
pub use character::{
    Ability, ArmorType, Character, CharacterId, CharacterKind, FactionStanding, Item, Memory,
    ProficiencyLevel, Skill, WeaponProperty,
};
pub use dice::{Advantage, DamageDice, DiceError};
pub use error::{CoreError, Result};
pub use lore::{LoreBook, LoreEntry, LoreType};
pub use normalize::normalize;
pub use rules::DamageEntry;
pub use scene::{
    DialogueRequest, DialogueResponse, PartyDpr, PartyDprRow, Roster, SceneConfig, SceneState,
};
