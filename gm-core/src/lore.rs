//! World lore entries and their links to characters.
//!
//! Links are two-sided: a [`LoreEntry`] lists the characters it concerns and
//! each linked [`Character`](crate::character::Character) lists the entry
//! in `linked_lore_ids`. [`LoreBook`] keeps both sides in step.

use crate::character::CharacterId;
use crate::error::{CoreError, Result};
use crate::normalize::{lenient, lenient_seq};
use crate::scene::Roster;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Category of a lore entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoreType {
    Location,
    #[serde(rename = "Organization/Faction")]
    Organization,
    #[serde(rename = "Historical Event")]
    HistoricalEvent,
    #[serde(rename = "Key Item/Artifact")]
    Artifact,
    #[serde(rename = "Concept/Deity")]
    Concept,
    #[default]
    Miscellaneous,
}

impl LoreType {
    pub fn label(&self) -> &'static str {
        match self {
            LoreType::Location => "Location",
            LoreType::Organization => "Organization/Faction",
            LoreType::HistoricalEvent => "Historical Event",
            LoreType::Artifact => "Key Item/Artifact",
            LoreType::Concept => "Concept/Deity",
            LoreType::Miscellaneous => "Miscellaneous",
        }
    }

    pub fn all() -> [LoreType; 6] {
        [
            LoreType::Location,
            LoreType::Organization,
            LoreType::HistoricalEvent,
            LoreType::Artifact,
            LoreType::Concept,
            LoreType::Miscellaneous,
        ]
    }
}

impl fmt::Display for LoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A piece of world knowledge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoreEntry {
    #[serde(alias = "_id", deserialize_with = "lenient")]
    pub lore_id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub lore_type: LoreType,
    #[serde(deserialize_with = "lenient")]
    pub description: String,
    #[serde(deserialize_with = "lenient_seq")]
    pub key_facts: Vec<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gm_notes: Option<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub linked_character_ids: Vec<CharacterId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LoreEntry {
    pub fn new(name: impl Into<String>, lore_type: LoreType) -> Self {
        Self {
            lore_id: Uuid::new_v4().to_string(),
            name: name.into(),
            lore_type,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_fact(mut self, fact: impl Into<String>) -> Self {
        self.key_facts.push(fact.into());
        self
    }
}

/// All lore entries of a campaign, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoreBook {
    entries: BTreeMap<String, LoreEntry>,
}

impl LoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. An entry without an id gets one.
    pub fn insert(&mut self, mut entry: LoreEntry) -> String {
        if entry.lore_id.trim().is_empty() {
            entry.lore_id = Uuid::new_v4().to_string();
        }
        let id = entry.lore_id.clone();
        info!(lore_id = %id, name = %entry.name, "lore entry stored");
        self.entries.insert(id.clone(), entry);
        id
    }

    /// Insert a raw record from the backend. A record that cannot be read
    /// is stored as an empty entry under a fresh id.
    pub fn insert_raw(&mut self, raw: Value) -> String {
        let entry = serde_json::from_value(raw).unwrap_or_else(|err| {
            debug!(%err, "lore record could not be read, using an empty entry");
            LoreEntry::default()
        });
        self.insert(entry)
    }

    pub fn get(&self, lore_id: &str) -> Option<&LoreEntry> {
        self.entries.get(lore_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LoreEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn of_type(&self, lore_type: LoreType) -> impl Iterator<Item = &LoreEntry> {
        self.entries
            .values()
            .filter(move |e| e.lore_type == lore_type)
    }

    /// Entries whose name contains `query`, ignoring case.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a LoreEntry> {
        let query = query.to_lowercase();
        self.entries
            .values()
            .filter(move |e| e.name.to_lowercase().contains(&query))
    }

    /// Entries linked to a character.
    pub fn linked_to<'a>(
        &'a self,
        character_id: &'a CharacterId,
    ) -> impl Iterator<Item = &'a LoreEntry> {
        self.entries
            .values()
            .filter(move |e| e.linked_character_ids.contains(character_id))
    }

    pub fn set_gm_notes(&mut self, lore_id: &str, notes: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(lore_id)
            .ok_or_else(|| CoreError::UnknownLoreEntry(lore_id.to_string()))?;
        entry.gm_notes = Some(notes.into());
        Ok(())
    }

    /// Record a link on the entry and on the character.
    pub fn link(
        &mut self,
        roster: &mut Roster,
        lore_id: &str,
        character_id: &CharacterId,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(lore_id)
            .ok_or_else(|| CoreError::UnknownLoreEntry(lore_id.to_string()))?;
        let character = roster
            .get_mut(character_id)
            .ok_or_else(|| CoreError::UnknownCharacter(character_id.clone()))?;

        if !entry.linked_character_ids.contains(character_id) {
            entry.linked_character_ids.push(character_id.clone());
        }
        if !character.linked_lore_ids.iter().any(|id| id == lore_id) {
            character.linked_lore_ids.push(lore_id.to_string());
        }
        info!(%lore_id, %character_id, "lore linked");
        Ok(())
    }

    /// Remove a link from both sides. Returns whether a link existed.
    pub fn unlink(
        &mut self,
        roster: &mut Roster,
        lore_id: &str,
        character_id: &CharacterId,
    ) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(lore_id)
            .ok_or_else(|| CoreError::UnknownLoreEntry(lore_id.to_string()))?;

        let before = entry.linked_character_ids.len();
        entry.linked_character_ids.retain(|id| id != character_id);
        let mut removed = entry.linked_character_ids.len() != before;

        if let Some(character) = roster.get_mut(character_id) {
            let before = character.linked_lore_ids.len();
            character.linked_lore_ids.retain(|id| id != lore_id);
            removed |= character.linked_lore_ids.len() != before;
        }
        Ok(removed)
    }

    /// Delete an entry and every character's link to it.
    pub fn delete(&mut self, roster: &mut Roster, lore_id: &str) -> Result<LoreEntry> {
        let entry = self
            .entries
            .remove(lore_id)
            .ok_or_else(|| CoreError::UnknownLoreEntry(lore_id.to_string()))?;
        for character in roster.characters_mut() {
            character.linked_lore_ids.retain(|id| id != lore_id);
        }
        info!(%lore_id, "lore entry deleted");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn roster_with_npc() -> (Roster, CharacterId) {
        let mut roster = Roster::new();
        let id = roster.upsert_raw(testing::sample_npc());
        (roster, id)
    }

    #[test]
    fn test_lore_type_labels() {
        let json = serde_json::to_value(LoreType::Organization).unwrap();
        assert_eq!(json, serde_json::json!("Organization/Faction"));
        for lore_type in LoreType::all() {
            let back: LoreType = serde_json::to_value(lore_type)
                .and_then(serde_json::from_value)
                .unwrap();
            assert_eq!(back, lore_type);
            assert_eq!(serde_json::to_value(lore_type).unwrap(), lore_type.label());
        }
    }

    #[test]
    fn test_insert_raw_accepts_mongo_id() {
        let mut book = LoreBook::new();
        let id = book.insert_raw(serde_json::json!({
            "_id": "lore-1",
            "name": "Sandpoint",
            "lore_type": "Location",
            "key_facts": ["Coastal town", 4]
        }));
        assert_eq!(id, "lore-1");
        let entry = book.get("lore-1").unwrap();
        assert_eq!(entry.key_facts, vec!["Coastal town".to_string()]);

        let minted = book.insert_raw(serde_json::json!("not a record"));
        assert!(!minted.is_empty());
        assert_eq!(book.len(), 2);
        let fallback = book.get(&minted).unwrap();
        assert!(fallback.name.is_empty());
        assert_eq!(fallback.lore_type, LoreType::Miscellaneous);
    }

    #[test]
    fn test_link_records_both_sides() {
        let (mut roster, npc) = roster_with_npc();
        let mut book = LoreBook::new();
        let lore = book.insert(LoreEntry::new("The Old Light", LoreType::Location));

        book.link(&mut roster, &lore, &npc).unwrap();
        book.link(&mut roster, &lore, &npc).unwrap();

        assert_eq!(book.get(&lore).unwrap().linked_character_ids, vec![npc.clone()]);
        assert_eq!(roster.get(&npc).unwrap().linked_lore_ids, vec![lore.clone()]);
        assert_eq!(book.linked_to(&npc).count(), 1);

        assert!(book.unlink(&mut roster, &lore, &npc).unwrap());
        assert!(!book.unlink(&mut roster, &lore, &npc).unwrap());
        assert!(roster.get(&npc).unwrap().linked_lore_ids.is_empty());
    }

    #[test]
    fn test_link_errors() {
        let (mut roster, npc) = roster_with_npc();
        let mut book = LoreBook::new();
        let lore = book.insert(LoreEntry::new("Thassilon", LoreType::HistoricalEvent));

        assert!(matches!(
            book.link(&mut roster, "missing", &npc),
            Err(CoreError::UnknownLoreEntry(_))
        ));
        assert!(matches!(
            book.link(&mut roster, &lore, &CharacterId::from("ghost")),
            Err(CoreError::UnknownCharacter(_))
        ));
    }

    #[test]
    fn test_delete_removes_links_everywhere() {
        let (mut roster, npc) = roster_with_npc();
        let pc = roster.upsert_raw(testing::sample_fighter());
        let mut book = LoreBook::new();
        let lore = book.insert(LoreEntry::new("Runelords", LoreType::Concept));
        let keep = book.insert(LoreEntry::new("Magnimar", LoreType::Location));

        book.link(&mut roster, &lore, &npc).unwrap();
        book.link(&mut roster, &lore, &pc).unwrap();
        book.link(&mut roster, &keep, &pc).unwrap();

        let deleted = book.delete(&mut roster, &lore).unwrap();
        assert_eq!(deleted.name, "Runelords");
        assert!(roster.get(&npc).unwrap().linked_lore_ids.is_empty());
        assert_eq!(roster.get(&pc).unwrap().linked_lore_ids, vec![keep]);
        assert!(matches!(
            book.delete(&mut roster, &lore),
            Err(CoreError::UnknownLoreEntry(_))
        ));
    }

    #[test]
    fn test_search_and_filter() {
        let mut book = LoreBook::new();
        book.insert(LoreEntry::new("Sandpoint Cathedral", LoreType::Location));
        book.insert(LoreEntry::new("Sihedron Rune", LoreType::Artifact));
        book.insert(LoreEntry::new("Sandpoint Boar", LoreType::Miscellaneous));

        assert_eq!(book.search("sandpoint").count(), 2);
        assert_eq!(book.of_type(LoreType::Artifact).count(), 1);

        let id = book.search("rune").next().unwrap().lore_id.clone();
        book.set_gm_notes(&id, "Seven points").unwrap();
        assert_eq!(book.get(&id).unwrap().gm_notes.as_deref(), Some("Seven points"));
        assert!(book.set_gm_notes("nope", "x").is_err());
    }
}
