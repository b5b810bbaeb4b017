//! Sample records and a ready-made scene for tests.
//!
//! The samples are raw backend JSON in the shapes the normalizer has to
//! cope with: Mongo ids, D&D Beyond importer flags, the legacy `vtt_data`
//! block, properties as lists and as flag maps, legacy damage formulas.

use crate::character::CharacterId;
use crate::scene::{SceneConfig, SceneState};
use serde_json::{json, Value};

/// Level 5 fighter: STR 16, heavy armor and shield (AC 18), longsword and
/// longbow.
pub fn sample_fighter() -> Value {
    json!({
        "_id": {"$oid": "pc-valeros"},
        "name": "Valeros",
        "character_type": "PC",
        "vtt_flags": {"ddbimporter": {"dndbeyond": {"totalLevels": 5}}},
        "system": {
            "abilities": {
                "str": {"value": 16, "proficient": 1},
                "dex": {"value": 12},
                "con": {"value": 14, "proficient": 1},
                "int": {"value": 10},
                "wis": {"value": 13},
                "cha": {"value": 8}
            },
            "attributes": {
                "hp": {"value": 44, "max": 44},
                "movement": {"walk": 30},
                "init": {"ability": "dex"}
            },
            "details": {"race": "Human", "background": "Soldier"},
            "skills": {
                "ath": {"value": 1},
                "prc": {"value": 1},
                "itm": {"value": 0.5}
            },
            "traits": {"languages": {"value": ["common"]}}
        },
        "items": [
            {
                "name": "Longsword",
                "type": "weapon",
                "system": {
                    "damage": {"base": {"denomination": 8, "number": 1, "types": ["slashing"]}},
                    "properties": ["ver"],
                    "equipped": true,
                    "actionType": "mwak",
                    "type": {"value": "martialM"}
                }
            },
            {
                "name": "Longbow",
                "type": "weapon",
                "system": {
                    "damage": {"base": {"denomination": "8", "number": "1"}},
                    "properties": ["amm", "hvy", "two"],
                    "actionType": "rwak",
                    "type": {"value": "martialR"}
                }
            },
            {
                "name": "Chain Mail",
                "type": "equipment",
                "system": {
                    "armor": {"value": 16, "dex": 0},
                    "type": {"value": "heavy"},
                    "equipped": true
                }
            },
            {
                "name": "Shield",
                "type": "equipment",
                "system": {
                    "armor": {"value": 2},
                    "type": {"value": "shield"},
                    "equipped": true
                }
            }
        ]
    })
}

/// Level 3 rogue marked the old way (`"Player Character"`): DEX 18,
/// leather armor (AC 15), finesse rapier and an off-hand dagger.
pub fn sample_rogue() -> Value {
    json!({
        "_id": "pc-merisiel",
        "name": "Merisiel",
        "character_type": "Player Character",
        "system": {
            "abilities": {
                "str": {"value": 10},
                "dex": {"value": 18, "proficient": 1},
                "int": {"value": 12, "proficient": 1},
                "wis": {"value": 12},
                "cha": {"value": 14}
            },
            "details": {"level": 3, "race": "Elf"},
            "skills": {
                "ste": {"value": 2},
                "slt": {"value": 1},
                "prc": {"value": 1},
                "acr": {"value": "1"}
            },
            "attributes": {"movement": {"walk": 35}}
        },
        "items": [
            {
                "name": "Rapier",
                "type": "weapon",
                "system": {
                    "damage": {"base": {"denomination": 8, "number": 1}},
                    "properties": {"fin": true, "lgt": false},
                    "equipped": true
                }
            },
            {
                "name": "Dagger",
                "type": "weapon",
                "system": {
                    "damage": {"base": {"denomination": 4, "number": 1}},
                    "properties": ["fin", "lgt", "thr"],
                    "offHand": true
                }
            },
            {
                "name": "Leather Armor",
                "type": "equipment",
                "system": {
                    "armor": {"value": 11},
                    "type": {"value": "light"},
                    "equipped": true
                }
            },
            {"name": "Thieves' Tools", "type": "tool", "system": {}}
        ]
    })
}

/// Level 7 wizard whose level only sits at the top level and whose staff
/// uses the legacy damage formula list.
pub fn sample_wizard() -> Value {
    json!({
        "_id": "pc-ezren",
        "name": "Ezren",
        "type": "Player Character",
        "level": 7,
        "system": {
            "abilities": {
                "str": {"value": 8},
                "dex": {"value": 14},
                "con": {"value": 12},
                "int": {"value": 17, "proficient": 1},
                "wis": {"value": 12, "proficient": 1}
            },
            "attributes": {"spellcasting": "int", "ac": {"calc": "mage"}},
            "skills": {"arc": {"value": 2}, "his": {"value": 1}}
        },
        "items": [
            {
                "name": "Quarterstaff",
                "type": "weapon",
                "system": {"damage": {"parts": [["1d6 + @mod", "bludgeoning"]]}}
            },
            {"name": "Spellbook", "type": "loot"}
        ]
    })
}

/// An innkeeper NPC stored with the legacy `vtt_data` block.
pub fn sample_npc() -> Value {
    json!({
        "_id": {"$oid": "npc-ameiko"},
        "name": "Ameiko Kaijitsu",
        "character_type": "NPC",
        "description": "Proprietor of the Rusty Dragon.",
        "vtt_data": {
            "abilities": {"cha": {"value": 16}, "dex": {"value": 14}},
            "details": {"level": "4"}
        },
        "personality_traits": ["Sardonic", "Generous"],
        "motivations": ["Keep the inn running"],
        "memories": [
            {
                "memory_id": "mem-1",
                "timestamp": "2024-05-01T19:00:00+00:00",
                "content": "The party saved Sandpoint from goblins.",
                "type": "event",
                "source": "gm"
            }
        ],
        "pc_faction_standings": {"pc-valeros": "Amiable"},
        "gm_notes": "Half-sister of Tsuto."
    })
}

/// A second NPC with nothing but a name.
pub fn sample_minimal_npc() -> Value {
    json!({"_id": "npc-hemlock", "name": "Sheriff Hemlock"})
}

pub fn all_samples() -> Vec<Value> {
    vec![
        sample_fighter(),
        sample_rogue(),
        sample_wizard(),
        sample_npc(),
        sample_minimal_npc(),
        json!({}),
    ]
}

/// A scene whose roster holds every sample character.
pub struct SceneFixture {
    pub scene: SceneState,
    pub fighter: CharacterId,
    pub rogue: CharacterId,
    pub wizard: CharacterId,
    pub innkeeper: CharacterId,
    pub sheriff: CharacterId,
}

impl SceneFixture {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        let mut scene = SceneState::new(config);
        let fighter = scene.roster.upsert_raw(sample_fighter());
        let rogue = scene.roster.upsert_raw(sample_rogue());
        let wizard = scene.roster.upsert_raw(sample_wizard());
        let innkeeper = scene.roster.upsert_raw(sample_npc());
        let sheriff = scene.roster.upsert_raw(sample_minimal_npc());
        Self {
            scene,
            fighter,
            rogue,
            wizard,
            innkeeper,
            sheriff,
        }
    }
}

impl Default for SceneFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert two floats agree to within `1e-9`.
#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
