//! Scene state: who is present, what has been said, and the party's damage
//! output.
//!
//! [`SceneState`] is a plain value owned by the caller. It holds the
//! [`Roster`] of canonical characters, the NPCs and PCs active in the
//! current scene, one dialogue history per active NPC, and the combat
//! estimator settings (selected attacks, target AC, rounds to sustain).

use crate::character::{Character, CharacterId, FactionStanding, Memory};
use crate::error::{CoreError, Result};
use crate::normalize::{lenient, lenient_seq, normalize};
use crate::rules::{self, DamageEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Context sent when the GM leaves the scene description blank.
pub const DEFAULT_SCENE_CONTEXT: &str = "A general scene.";

// ============================================================================
// Configuration
// ============================================================================

/// Defaults for a new scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Target AC for the party damage estimate.
    pub target_ac: i32,

    /// Rounds the party is expected to keep up its damage.
    pub rounds_to_sustain: u32,

    /// History lines sent with each dialogue request.
    pub history_window: usize,
}

impl SceneConfig {
    pub fn new() -> Self {
        Self {
            target_ac: 15,
            rounds_to_sustain: 3,
            history_window: 5,
        }
    }

    pub fn with_target_ac(mut self, ac: i32) -> Self {
        self.target_ac = ac;
        self
    }

    /// Set rounds to sustain. Values below 1 become 1.
    pub fn with_rounds_to_sustain(mut self, rounds: u32) -> Self {
        self.rounds_to_sustain = rounds.max(1);
        self
    }

    pub fn with_history_window(mut self, lines: usize) -> Self {
        self.history_window = lines;
        self
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Roster
// ============================================================================

/// Every known character, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    characters: BTreeMap<CharacterId, Character>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw record and insert it, replacing any record with the
    /// same id.
    pub fn upsert_raw(&mut self, raw: Value) -> CharacterId {
        self.upsert(normalize(raw))
    }

    pub fn upsert(&mut self, character: Character) -> CharacterId {
        let id = character.id.clone();
        if self.characters.insert(id.clone(), character).is_some() {
            debug!(%id, "character replaced");
        } else {
            debug!(%id, "character added");
        }
        id
    }

    /// Replace the whole roster with a fresh fetch.
    pub fn load_all(&mut self, records: impl IntoIterator<Item = Value>) {
        self.characters = records
            .into_iter()
            .map(normalize)
            .map(|c| (c.id.clone(), c))
            .collect();
        info!(count = self.characters.len(), "roster loaded");
    }

    pub fn get(&self, id: &CharacterId) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn get_mut(&mut self, id: &CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(id)
    }

    pub fn remove(&mut self, id: &CharacterId) -> Option<Character> {
        self.characters.remove(id)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn characters_mut(&mut self) -> impl Iterator<Item = &mut Character> {
        self.characters.values_mut()
    }

    pub fn pcs(&self) -> impl Iterator<Item = &Character> {
        self.characters().filter(|c| c.is_pc())
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Character> {
        self.characters().filter(|c| c.is_npc())
    }

    fn require(&self, id: &CharacterId) -> Result<&Character> {
        self.get(id)
            .ok_or_else(|| CoreError::UnknownCharacter(id.clone()))
    }

    fn require_npc(&self, id: &CharacterId) -> Result<&Character> {
        let character = self.require(id)?;
        if character.is_npc() {
            Ok(character)
        } else {
            Err(CoreError::NotAnNpc(id.clone()))
        }
    }

    fn require_pc(&self, id: &CharacterId) -> Result<&Character> {
        let character = self.require(id)?;
        if character.is_pc() {
            Ok(character)
        } else {
            Err(CoreError::NotAPc(id.clone()))
        }
    }

    fn require_npc_mut(&mut self, id: &CharacterId) -> Result<&mut Character> {
        self.require_npc(id)?;
        self.get_mut(id)
            .ok_or_else(|| CoreError::UnknownCharacter(id.clone()))
    }

    /// Attach a memory to an NPC. Returns the new memory's id.
    pub fn add_memory(&mut self, npc_id: &CharacterId, memory: Memory) -> Result<String> {
        if memory.content.trim().is_empty() {
            return Err(CoreError::EmptyMemory);
        }
        let npc = self.require_npc_mut(npc_id)?;
        let memory_id = memory.memory_id.clone();
        npc.memories.push(memory);
        info!(%npc_id, %memory_id, "memory added");
        Ok(memory_id)
    }

    /// Delete a memory. Returns whether it existed.
    pub fn delete_memory(&mut self, npc_id: &CharacterId, memory_id: &str) -> Result<bool> {
        let npc = self.require_npc_mut(npc_id)?;
        let before = npc.memories.len();
        npc.memories.retain(|m| m.memory_id != memory_id);
        Ok(npc.memories.len() != before)
    }

    /// Record how an NPC regards a PC.
    pub fn set_faction_standing(
        &mut self,
        npc_id: &CharacterId,
        pc_id: &CharacterId,
        standing: FactionStanding,
    ) -> Result<()> {
        self.require_pc(pc_id)?;
        let npc = self.require_npc_mut(npc_id)?;
        npc.pc_faction_standings
            .insert(pc_id.to_string(), standing);
        Ok(())
    }
}

// ============================================================================
// Dialogue
// ============================================================================

/// Payload for one NPC's dialogue generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueRequest {
    pub scene_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_utterance: Option<String>,
    /// Names of the PCs present.
    pub active_pcs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking_pc_id: Option<CharacterId>,
    pub recent_dialogue_history: Vec<String>,
}

/// What the backend returns for one NPC.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueResponse {
    #[serde(deserialize_with = "lenient")]
    pub npc_id: String,
    #[serde(deserialize_with = "lenient")]
    pub npc_dialogue: String,
    #[serde(deserialize_with = "lenient_seq")]
    pub new_memory_suggestions: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub generated_topics: Vec<String>,
}

// ============================================================================
// Party Damage
// ============================================================================

/// One attack row of the party damage table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyDprRow {
    pub pc_id: CharacterId,
    pub pc_name: String,
    pub selected: bool,
    pub entry: DamageEntry,
}

/// Damage table for the active PCs against the scene's target AC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyDpr {
    pub target_ac: i32,
    pub rounds: u32,
    pub rows: Vec<PartyDprRow>,
    /// Sum of normal-roll DPR over selected rows.
    pub total_dpr: f64,
    /// Hit points the party can expect to remove over `rounds`.
    pub estimated_hp: i64,
}

// ============================================================================
// Scene State
// ============================================================================

/// The state of the GM's current scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneState {
    config: SceneConfig,
    pub roster: Roster,
    active_npcs: Vec<CharacterId>,
    active_pcs: Vec<CharacterId>,
    speaking_pc: Option<CharacterId>,
    histories: BTreeMap<CharacterId, Vec<String>>,
    selected_attacks: BTreeMap<CharacterId, BTreeSet<String>>,
    target_ac: i32,
    rounds_to_sustain: u32,
}

impl SceneState {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            target_ac: config.target_ac,
            rounds_to_sustain: config.rounds_to_sustain.max(1),
            config,
            roster: Roster::new(),
            active_npcs: Vec::new(),
            active_pcs: Vec::new(),
            speaking_pc: None,
            histories: BTreeMap::new(),
            selected_attacks: BTreeMap::new(),
        }
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Remove a character from the roster and from every part of the scene.
    pub fn remove_character(&mut self, id: &CharacterId) -> Option<Character> {
        self.remove_npc(id);
        self.active_pcs.retain(|pc| pc != id);
        self.selected_attacks.remove(id);
        if self.speaking_pc.as_ref() == Some(id) {
            self.speaking_pc = None;
        }
        self.roster.remove(id)
    }

    // ------------------------------------------------------------------------
    // NPCs
    // ------------------------------------------------------------------------

    pub fn active_npcs(&self) -> &[CharacterId] {
        &self.active_npcs
    }

    pub fn is_npc_active(&self, id: &CharacterId) -> bool {
        self.active_npcs.contains(id)
    }

    /// Bring an NPC into the scene with an empty history. NPCs already
    /// present note the arrival in their own histories.
    ///
    /// Returns `false` if the NPC was already in the scene.
    pub fn add_npc(&mut self, id: &CharacterId) -> Result<bool> {
        let name = self.roster.require_npc(id)?.name.clone();
        if self.is_npc_active(id) {
            return Ok(false);
        }

        let arrival =
            format!("(System Observation: {name} has just arrived or become prominent in the scene.)");
        for other in &self.active_npcs {
            self.histories
                .entry(other.clone())
                .or_default()
                .push(arrival.clone());
        }

        self.active_npcs.push(id.clone());
        self.histories.insert(id.clone(), Vec::new());
        info!(npc_id = %id, %name, "NPC joined the scene");
        Ok(true)
    }

    /// Take an NPC out of the scene, dropping its history.
    ///
    /// Returns `false` if the NPC was not in the scene.
    pub fn remove_npc(&mut self, id: &CharacterId) -> bool {
        let before = self.active_npcs.len();
        self.active_npcs.retain(|npc| npc != id);
        self.histories.remove(id);
        let removed = self.active_npcs.len() != before;
        if removed {
            info!(npc_id = %id, "NPC left the scene");
        }
        removed
    }

    /// Add or remove an NPC. Returns whether it is in the scene afterwards.
    pub fn toggle_npc(&mut self, id: &CharacterId) -> Result<bool> {
        if self.is_npc_active(id) {
            self.remove_npc(id);
            Ok(false)
        } else {
            self.add_npc(id)
        }
    }

    // ------------------------------------------------------------------------
    // PCs
    // ------------------------------------------------------------------------

    pub fn active_pcs(&self) -> &[CharacterId] {
        &self.active_pcs
    }

    pub fn is_pc_active(&self, id: &CharacterId) -> bool {
        self.active_pcs.contains(id)
    }

    /// Add or remove a PC. Returns whether it is active afterwards.
    pub fn toggle_pc(&mut self, id: &CharacterId) -> Result<bool> {
        self.roster.require_pc(id)?;
        if self.is_pc_active(id) {
            self.active_pcs.retain(|pc| pc != id);
            if self.speaking_pc.as_ref() == Some(id) {
                self.speaking_pc = None;
            }
            info!(pc_id = %id, "PC left the party");
            Ok(false)
        } else {
            self.active_pcs.push(id.clone());
            info!(pc_id = %id, "PC joined the party");
            Ok(true)
        }
    }

    /// Choose which active PC is speaking; `None` means the party at large.
    pub fn set_speaking_pc(&mut self, id: Option<&CharacterId>) -> Result<()> {
        if let Some(id) = id {
            self.roster.require_pc(id)?;
            if !self.is_pc_active(id) {
                self.active_pcs.push(id.clone());
            }
        }
        self.speaking_pc = id.cloned();
        Ok(())
    }

    pub fn speaking_pc(&self) -> Option<&CharacterId> {
        self.speaking_pc.as_ref()
    }

    /// Names of the active PCs, in the order they joined.
    pub fn active_pc_names(&self) -> Vec<String> {
        self.active_pcs
            .iter()
            .filter_map(|id| self.roster.get(id))
            .map(|pc| pc.name.clone())
            .collect()
    }

    /// Label for player lines: the speaking PC, else every active PC, else
    /// a generic label.
    pub fn speaker_label(&self) -> String {
        if let Some(pc) = self.speaking_pc.as_ref().and_then(|id| self.roster.get(id)) {
            return pc.name.clone();
        }
        let names = self.active_pc_names();
        if names.is_empty() {
            "Player(s)".to_string()
        } else {
            names.join(", ")
        }
    }

    // ------------------------------------------------------------------------
    // Dialogue
    // ------------------------------------------------------------------------

    /// Full history for an NPC in the scene.
    pub fn history(&self, npc_id: &CharacterId) -> &[String] {
        self.histories
            .get(npc_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The last `count` lines, oldest first.
    pub fn recent_history(&self, npc_id: &CharacterId, count: usize) -> &[String] {
        let history = self.history(npc_id);
        &history[history.len().saturating_sub(count)..]
    }

    /// Append a `"speaker: text"` line to one active NPC's history.
    pub fn record_line(&mut self, npc_id: &CharacterId, speaker: &str, text: &str) -> Result<()> {
        if !self.is_npc_active(npc_id) {
            return Err(CoreError::NotInScene(npc_id.clone()));
        }
        self.histories
            .entry(npc_id.clone())
            .or_default()
            .push(format!("{speaker}: {text}"));
        Ok(())
    }

    /// Append a player's line to every active NPC's history. Returns the
    /// speaker label used.
    pub fn record_player_utterance(&mut self, utterance: &str) -> String {
        let speaker = self.speaker_label();
        let line = format!("{speaker}: {utterance}");
        for npc in &self.active_npcs {
            self.histories
                .entry(npc.clone())
                .or_default()
                .push(line.clone());
        }
        speaker
    }

    /// Build the request for one active NPC.
    pub fn dialogue_request(
        &self,
        npc_id: &CharacterId,
        scene_context: &str,
        player_utterance: Option<&str>,
    ) -> Result<DialogueRequest> {
        self.roster.require_npc(npc_id)?;
        if !self.is_npc_active(npc_id) {
            return Err(CoreError::NotInScene(npc_id.clone()));
        }

        let scene_context = match scene_context.trim() {
            "" => DEFAULT_SCENE_CONTEXT.to_string(),
            context => context.to_string(),
        };
        Ok(DialogueRequest {
            scene_context,
            player_utterance: player_utterance
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            active_pcs: self.active_pc_names(),
            speaking_pc_id: self.speaking_pc.clone(),
            recent_dialogue_history: self
                .recent_history(npc_id, self.config.history_window)
                .to_vec(),
        })
    }

    /// Record the NPC's reply in its history.
    pub fn apply_response(&mut self, response: &DialogueResponse) -> Result<()> {
        let npc_id = CharacterId::from(response.npc_id.as_str());
        let name = self.roster.require_npc(&npc_id)?.name.clone();
        self.record_line(&npc_id, &name, &response.npc_dialogue)
    }

    /// Store one of the backend's memory suggestions on the NPC.
    pub fn accept_memory_suggestion(
        &mut self,
        npc_id: &CharacterId,
        suggestion: &str,
    ) -> Result<String> {
        self.roster
            .add_memory(npc_id, Memory::new(suggestion.trim(), "generic", "dialogue"))
    }

    // ------------------------------------------------------------------------
    // Party Damage
    // ------------------------------------------------------------------------

    pub fn target_ac(&self) -> i32 {
        self.target_ac
    }

    pub fn set_target_ac(&mut self, ac: i32) {
        self.target_ac = ac;
    }

    pub fn rounds_to_sustain(&self) -> u32 {
        self.rounds_to_sustain
    }

    /// Set rounds to sustain. Values below 1 become 1.
    pub fn set_rounds_to_sustain(&mut self, rounds: u32) {
        self.rounds_to_sustain = rounds.max(1);
    }

    pub fn is_attack_selected(&self, pc_id: &CharacterId, attack: &str) -> bool {
        self.selected_attacks
            .get(pc_id)
            .is_some_and(|set| set.contains(attack))
    }

    /// Include or exclude an attack from the party total. Returns whether
    /// it is selected afterwards.
    pub fn toggle_attack(&mut self, pc_id: &CharacterId, attack: &str) -> Result<bool> {
        self.roster.require_pc(pc_id)?;
        let set = self.selected_attacks.entry(pc_id.clone()).or_default();
        let selected = if set.remove(attack) {
            false
        } else {
            set.insert(attack.to_string());
            true
        };
        Ok(selected)
    }

    /// Damage table for every active PC. The total counts only selected
    /// attacks that have a damage die.
    ///
    /// Selection is by name, so when a PC carries several attacks with the
    /// same name only the first of them is selected.
    pub fn party_dpr(&self) -> PartyDpr {
        let mut rows = Vec::new();
        for pc in self.active_pcs.iter().filter_map(|id| self.roster.get(id)) {
            let mut counted = BTreeSet::new();
            for entry in rules::damage_table(pc, self.target_ac) {
                let selected = self.is_attack_selected(&pc.id, &entry.name)
                    && counted.insert(entry.name.clone());
                rows.push(PartyDprRow {
                    pc_id: pc.id.clone(),
                    pc_name: pc.name.clone(),
                    selected,
                    entry,
                });
            }
        }

        let total_dpr: f64 = rows
            .iter()
            .filter(|row| row.selected)
            .map(|row| row.entry.dpr_normal)
            .sum();
        let estimated_hp = (total_dpr * f64::from(self.rounds_to_sustain)).round() as i64;

        PartyDpr {
            target_ac: self.target_ac,
            rounds: self.rounds_to_sustain,
            rows,
            total_dpr,
            estimated_hp,
        }
    }
}

impl Default for SceneState {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}
