//! Canonical character records.
//!
//! A [`Character`] mirrors the JSON the backend serves: NPC profile fields at
//! the top level, a VTT-style `system` block with abilities, attributes,
//! skills and traits, and an `items` list. After normalization every
//! substructure is present, so sheet code can use plain field access.
//!
//! Fields the schema does not name are kept in `extra` maps and written back
//! out unchanged.

use crate::dice::DamageDice;
use crate::normalize::{
    lenient, lenient_bool, lenient_int, lenient_map, lenient_number, lenient_properties,
    lenient_seq,
};
use crate::rules;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Opaque character identifier, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// Mint a fresh identifier for a record that arrived without one.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CharacterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Player character or non-player character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CharacterKind {
    #[serde(rename = "PC", alias = "Player Character")]
    Pc,
    #[default]
    #[serde(rename = "NPC", alias = "Non-Player Character")]
    Npc,
}

impl fmt::Display for CharacterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterKind::Pc => write!(f, "PC"),
            CharacterKind::Npc => write!(f, "NPC"),
        }
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// Score used for any ability the record does not carry.
pub const DEFAULT_ABILITY_SCORE: i32 = 10;

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    /// Three-letter key used in `system.abilities`.
    pub fn key(&self) -> &'static str {
        match self {
            Ability::Strength => "str",
            Ability::Dexterity => "dex",
            Ability::Constitution => "con",
            Ability::Intelligence => "int",
            Ability::Wisdom => "wis",
            Ability::Charisma => "cha",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    /// Parse a key such as `"dex"`, `"DEX"` or `"Dexterity"`.
    pub fn from_key(key: &str) -> Option<Ability> {
        let key = key.trim().to_lowercase();
        let prefix = key.get(..3)?;
        Ability::all().into_iter().find(|a| a.key() == prefix)
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

// ============================================================================
// Skills
// ============================================================================

/// D&D 5e skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    Acrobatics,
    AnimalHandling,
    Arcana,
    Athletics,
    Deception,
    History,
    Insight,
    Intimidation,
    Investigation,
    Medicine,
    Nature,
    Perception,
    Performance,
    Persuasion,
    Religion,
    SleightOfHand,
    Stealth,
    Survival,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    /// Three-letter key used in `system.skills`.
    pub fn code(&self) -> &'static str {
        match self {
            Skill::Acrobatics => "acr",
            Skill::AnimalHandling => "ani",
            Skill::Arcana => "arc",
            Skill::Athletics => "ath",
            Skill::Deception => "dec",
            Skill::History => "his",
            Skill::Insight => "ins",
            Skill::Intimidation => "itm",
            Skill::Investigation => "inv",
            Skill::Medicine => "med",
            Skill::Nature => "nat",
            Skill::Perception => "prc",
            Skill::Performance => "prf",
            Skill::Persuasion => "per",
            Skill::Religion => "rel",
            Skill::SleightOfHand => "slt",
            Skill::Stealth => "ste",
            Skill::Survival => "sur",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Acrobatics => "Acrobatics",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Arcana => "Arcana",
            Skill::Athletics => "Athletics",
            Skill::Deception => "Deception",
            Skill::History => "History",
            Skill::Insight => "Insight",
            Skill::Intimidation => "Intimidation",
            Skill::Investigation => "Investigation",
            Skill::Medicine => "Medicine",
            Skill::Nature => "Nature",
            Skill::Perception => "Perception",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
            Skill::Religion => "Religion",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Survival => "Survival",
        }
    }

    pub fn from_code(code: &str) -> Option<Skill> {
        Skill::all().into_iter().find(|s| s.code() == code)
    }

    pub fn all() -> [Skill; 18] {
        [
            Skill::Acrobatics,
            Skill::AnimalHandling,
            Skill::Arcana,
            Skill::Athletics,
            Skill::Deception,
            Skill::History,
            Skill::Insight,
            Skill::Intimidation,
            Skill::Investigation,
            Skill::Medicine,
            Skill::Nature,
            Skill::Perception,
            Skill::Performance,
            Skill::Persuasion,
            Skill::Religion,
            Skill::SleightOfHand,
            Skill::Stealth,
            Skill::Survival,
        ]
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.ability().abbreviation())
    }
}

/// Proficiency level for skills, stored on the wire as a multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProficiencyLevel {
    #[default]
    None,
    Half,
    Proficient,
    Expertise,
}

impl ProficiencyLevel {
    /// Map a stored multiplier (0, 0.5, 1, 2) to a level.
    ///
    /// Any other value is not a recognised level and yields `None`.
    pub fn from_multiplier(multiplier: f64) -> Option<ProficiencyLevel> {
        if multiplier == 0.0 {
            Some(ProficiencyLevel::None)
        } else if multiplier == 0.5 {
            Some(ProficiencyLevel::Half)
        } else if multiplier == 1.0 {
            Some(ProficiencyLevel::Proficient)
        } else if multiplier == 2.0 {
            Some(ProficiencyLevel::Expertise)
        } else {
            None
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            ProficiencyLevel::None => 0.0,
            ProficiencyLevel::Half => 0.5,
            ProficiencyLevel::Proficient => 1.0,
            ProficiencyLevel::Expertise => 2.0,
        }
    }

    pub fn bonus(&self, proficiency_bonus: i32) -> i32 {
        match self {
            ProficiencyLevel::None => 0,
            ProficiencyLevel::Half => proficiency_bonus.div_euclid(2),
            ProficiencyLevel::Proficient => proficiency_bonus,
            ProficiencyLevel::Expertise => proficiency_bonus.saturating_mul(2),
        }
    }
}

// ============================================================================
// Sheet Data
// ============================================================================

/// One entry of `system.abilities`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityEntry {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    /// Saving throw proficiency (0 or 1 on the wire).
    #[serde(
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub proficient: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AbilityEntry {
    pub fn with_score(score: i32) -> Self {
        Self {
            value: Some(score),
            ..Default::default()
        }
    }
}

/// One entry of `system.skills`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillEntry {
    /// Proficiency multiplier: 0, 0.5, 1 or 2.
    #[serde(
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<f64>,
    /// Overrides the skill's default ability.
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ability: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPoints {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub temp: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmorClassData {
    /// Explicit AC override.
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub flat: Option<i32>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub calc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Movement {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub walk: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitiativeData {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ability: Option<String>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub bonus: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `system.attributes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    #[serde(deserialize_with = "lenient")]
    pub hp: HitPoints,
    #[serde(deserialize_with = "lenient")]
    pub ac: ArmorClassData,
    #[serde(deserialize_with = "lenient")]
    pub movement: Movement,
    #[serde(deserialize_with = "lenient")]
    pub init: InitiativeData,
    #[serde(deserialize_with = "lenient")]
    pub spell: Map<String, Value>,
    /// Spellcasting ability key; empty means none.
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub spellcasting: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Details {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Details {
    /// A free-text detail such as `race`, `alignment` or `background`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// A trait list such as languages or weapon proficiencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitSet {
    #[serde(deserialize_with = "lenient_seq")]
    pub value: Vec<String>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Traits {
    #[serde(deserialize_with = "lenient")]
    pub languages: TraitSet,
    #[serde(rename = "armorProf", deserialize_with = "lenient")]
    pub armor_prof: TraitSet,
    #[serde(rename = "weaponProf", deserialize_with = "lenient")]
    pub weapon_prof: TraitSet,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `system` block of a character sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetData {
    #[serde(deserialize_with = "lenient_map")]
    pub abilities: BTreeMap<String, AbilityEntry>,
    #[serde(deserialize_with = "lenient")]
    pub attributes: Attributes,
    #[serde(deserialize_with = "lenient")]
    pub details: Details,
    #[serde(deserialize_with = "lenient_map")]
    pub skills: BTreeMap<String, SkillEntry>,
    #[serde(deserialize_with = "lenient")]
    pub traits: Traits,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Equipment
// ============================================================================

/// Armor categories, read from an item's `system.type.value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmorType {
    Light,
    Medium,
    Heavy,
    Natural,
    Shield,
}

impl ArmorType {
    pub fn from_type_value(value: &str) -> Option<ArmorType> {
        match value.trim().to_lowercase().as_str() {
            "light" => Some(ArmorType::Light),
            "medium" => Some(ArmorType::Medium),
            "heavy" => Some(ArmorType::Heavy),
            "natural" => Some(ArmorType::Natural),
            "shield" => Some(ArmorType::Shield),
            _ => None,
        }
    }

    /// Largest DEX modifier this armor lets through, when the item itself
    /// does not say.
    pub fn default_dex_cap(&self) -> Option<i32> {
        match self {
            ArmorType::Medium => Some(2),
            ArmorType::Heavy => Some(0),
            ArmorType::Light | ArmorType::Natural | ArmorType::Shield => None,
        }
    }
}

/// Weapon properties per D&D 5e, keyed by their VTT codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponProperty {
    Finesse,
    Light,
    Heavy,
    TwoHanded,
    Versatile,
    Thrown,
    Ammunition,
    Loading,
    Reach,
    Other(String),
}

impl WeaponProperty {
    pub fn from_code(code: &str) -> WeaponProperty {
        match code.trim().to_lowercase().as_str() {
            "fin" | "finesse" => WeaponProperty::Finesse,
            "lgt" | "light" => WeaponProperty::Light,
            "hvy" | "heavy" => WeaponProperty::Heavy,
            "two" | "two-handed" | "twohanded" => WeaponProperty::TwoHanded,
            "ver" | "versatile" => WeaponProperty::Versatile,
            "thr" | "thrown" => WeaponProperty::Thrown,
            "amm" | "ammunition" => WeaponProperty::Ammunition,
            "lod" | "loading" => WeaponProperty::Loading,
            "rch" | "reach" => WeaponProperty::Reach,
            other => WeaponProperty::Other(other.to_string()),
        }
    }
}

/// Structured damage descriptor, `system.damage.base`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageBase {
    /// Die size.
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub denomination: Option<i32>,
    /// Die count.
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
    /// Flat bonus; may be a number, a numeric string or a formula.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DamageBase {
    /// The flat bonus when it is a plain integer, otherwise 0.
    pub fn flat_bonus(&self) -> i32 {
        self.bonus.as_ref().and_then(value_as_int).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDamage {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub base: Option<DamageBase>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemDamage {
    /// First formula of the legacy `parts` list, e.g. `"1d8 + @mod"`.
    pub fn first_part(&self) -> Option<&str> {
        self.extra
            .get("parts")?
            .as_array()?
            .first()?
            .as_array()?
            .first()?
            .as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemArmor {
    /// Base AC (or the bonus, for shields).
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    /// DEX cap; absent means the armor type decides.
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub dex: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemType {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `system` block of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemData {
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub damage: Option<ItemDamage>,
    #[serde(deserialize_with = "lenient_properties")]
    pub properties: Vec<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub equipped: bool,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub armor: Option<ItemArmor>,
    #[serde(
        rename = "type",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub item_type: Option<ItemType>,
    #[serde(
        rename = "actionType",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub action_type: Option<String>,
    /// See [`Item::is_off_hand`].
    #[serde(
        rename = "offHand",
        deserialize_with = "lenient_bool",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub off_hand: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An equipment or weapon entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub item_type: String,
    #[serde(deserialize_with = "lenient")]
    pub system: ItemData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// A weapon entry with a structured damage descriptor.
    pub fn weapon(name: impl Into<String>, dice: DamageDice) -> Self {
        let base = DamageBase {
            denomination: i32::try_from(dice.sides).ok(),
            number: i32::try_from(dice.count).ok(),
            bonus: (dice.bonus != 0).then(|| Value::from(dice.bonus)),
            extra: Map::new(),
        };
        Self {
            name: name.into(),
            item_type: "weapon".to_string(),
            system: ItemData {
                damage: Some(ItemDamage {
                    base: Some(base),
                    extra: Map::new(),
                }),
                ..Default::default()
            },
            extra: Map::new(),
        }
    }

    /// A piece of armor or a shield.
    pub fn armor(name: impl Into<String>, armor_type: ArmorType, value: i32) -> Self {
        let type_value = match armor_type {
            ArmorType::Light => "light",
            ArmorType::Medium => "medium",
            ArmorType::Heavy => "heavy",
            ArmorType::Natural => "natural",
            ArmorType::Shield => "shield",
        };
        Self {
            name: name.into(),
            item_type: "equipment".to_string(),
            system: ItemData {
                armor: Some(ItemArmor {
                    value: Some(value),
                    ..Default::default()
                }),
                item_type: Some(ItemType {
                    value: Some(type_value.to_string()),
                    extra: Map::new(),
                }),
                ..Default::default()
            },
            extra: Map::new(),
        }
    }

    /// The implicit 1d4 finesse attack every character has.
    pub fn unarmed_strike() -> Self {
        Self::weapon("Unarmed Strike", DamageDice::new(1, 4))
            .with_properties(vec!["fin".to_string()])
    }

    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.system.properties = properties;
        self
    }

    pub fn with_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.system.action_type = Some(action_type.into());
        self
    }

    pub fn with_dex_cap(mut self, cap: i32) -> Self {
        self.system.armor.get_or_insert_with(ItemArmor::default).dex = Some(cap);
        self
    }

    pub fn equipped(mut self) -> Self {
        self.system.equipped = true;
        self
    }

    pub fn off_hand(mut self) -> Self {
        self.system.off_hand = true;
        self
    }

    pub fn is_weapon(&self) -> bool {
        self.item_type.eq_ignore_ascii_case("weapon")
    }

    pub fn is_equipped(&self) -> bool {
        self.system.equipped
    }

    /// Off-hand attacks add the ability modifier only when it is positive.
    pub fn is_off_hand(&self) -> bool {
        self.system.off_hand
    }

    pub fn properties(&self) -> impl Iterator<Item = WeaponProperty> + '_ {
        self.system
            .properties
            .iter()
            .map(|p| WeaponProperty::from_code(p))
    }

    pub fn has_property(&self, property: &WeaponProperty) -> bool {
        self.properties().any(|p| &p == property)
    }

    pub fn is_finesse(&self) -> bool {
        self.has_property(&WeaponProperty::Finesse)
    }

    /// Ranged weapon attack, ranged weapon category or ammunition.
    pub fn is_ranged(&self) -> bool {
        let ranged_action = self.system.action_type.as_deref() == Some("rwak");
        let ranged_category = self
            .system
            .item_type
            .as_ref()
            .and_then(|t| t.value.as_deref())
            .is_some_and(|v| v.ends_with('R'));
        ranged_action || ranged_category || self.has_property(&WeaponProperty::Ammunition)
    }

    /// Usable damage dice, or `None` when the entry has no damage die.
    ///
    /// The structured descriptor wins; the legacy formula list is the
    /// fallback.
    pub fn damage_dice(&self) -> Option<DamageDice> {
        let damage = self.system.damage.as_ref()?;
        if let Some(base) = &damage.base {
            if let Some(sides) = base.denomination.and_then(|d| u32::try_from(d).ok()) {
                if sides == 0 {
                    return None;
                }
                let count = base
                    .number
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(1);
                return Some(DamageDice::new(count, sides).with_bonus(base.flat_bonus()));
            }
        }
        damage
            .first_part()
            .and_then(|formula| DamageDice::parse(formula).ok())
    }

    pub fn armor_type(&self) -> Option<ArmorType> {
        self.system
            .item_type
            .as_ref()
            .and_then(|t| t.value.as_deref())
            .and_then(ArmorType::from_type_value)
    }

    /// Base AC of body armor, or bonus of a shield.
    pub fn armor_value(&self) -> Option<i32> {
        self.system.armor.as_ref().and_then(|a| a.value)
    }

    /// DEX cap: the item's own value, else the armor type's default.
    pub fn dex_cap(&self) -> Option<i32> {
        self.system
            .armor
            .as_ref()
            .and_then(|a| a.dex)
            .or_else(|| self.armor_type().and_then(|t| t.default_dex_cap()))
    }
}

// ============================================================================
// NPC Profile Data
// ============================================================================

/// A persistent NPC memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Memory {
    #[serde(deserialize_with = "lenient")]
    pub memory_id: String,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub content: String,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub source: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Memory {
    pub fn new(
        content: impl Into<String>,
        kind: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            content: content.into(),
            kind: kind.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            memory_id: Uuid::new_v4().to_string(),
            timestamp: None,
            content: String::new(),
            kind: "generic".to_string(),
            source: "dialogue".to_string(),
            extra: Map::new(),
        }
    }
}

/// How an NPC regards a given PC.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum FactionStanding {
    Threatening,
    Dubious,
    Apprehensive,
    #[default]
    Indifferent,
    Amiable,
    Kindly,
    Warmly,
    Ally,
}

impl FactionStanding {
    /// Slider order, most hostile first.
    pub fn all() -> [FactionStanding; 8] {
        [
            FactionStanding::Threatening,
            FactionStanding::Dubious,
            FactionStanding::Apprehensive,
            FactionStanding::Indifferent,
            FactionStanding::Amiable,
            FactionStanding::Kindly,
            FactionStanding::Warmly,
            FactionStanding::Ally,
        ]
    }
}

// ============================================================================
// Character
// ============================================================================

/// A canonical PC or NPC record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    #[serde(rename = "_id", deserialize_with = "lenient")]
    pub id: CharacterId,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(rename = "character_type", deserialize_with = "lenient")]
    pub kind: CharacterKind,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resolved character level, always positive.
    #[serde(deserialize_with = "lenient")]
    pub level: i32,
    /// Attached for PCs only.
    #[serde(
        rename = "proficiencyBonus",
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub proficiency: Option<i32>,

    #[serde(deserialize_with = "lenient")]
    pub system: SheetData,
    #[serde(deserialize_with = "lenient")]
    pub vtt_flags: Map<String, Value>,
    #[serde(deserialize_with = "lenient_seq")]
    pub items: Vec<Item>,

    #[serde(deserialize_with = "lenient_seq")]
    pub memories: Vec<Memory>,
    #[serde(deserialize_with = "lenient_seq")]
    pub personality_traits: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub ideals: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub bonds: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub flaws: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub motivations: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub associated_history_files: Vec<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub linked_lore_ids: Vec<String>,
    /// PC id → standing.
    #[serde(deserialize_with = "lenient_map")]
    pub pc_faction_standings: BTreeMap<String, FactionStanding>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gm_notes: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            id: CharacterId::new(),
            name: String::new(),
            kind: CharacterKind::Npc,
            description: None,
            level: 1,
            proficiency: None,
            system: SheetData::default(),
            vtt_flags: Map::new(),
            items: Vec::new(),
            memories: Vec::new(),
            personality_traits: Vec::new(),
            ideals: Vec::new(),
            bonds: Vec::new(),
            flaws: Vec::new(),
            motivations: Vec::new(),
            associated_history_files: Vec::new(),
            linked_lore_ids: Vec::new(),
            pc_faction_standings: BTreeMap::new(),
            gm_notes: None,
            extra: Map::new(),
        }
    }
}

impl Character {
    pub fn new(name: impl Into<String>, kind: CharacterKind) -> Self {
        let mut character = Self {
            name: name.into(),
            kind,
            ..Default::default()
        };
        character.set_level(1);
        character
    }

    /// Parse a raw JSON record and normalize it.
    pub fn from_json_str(json: &str) -> crate::error::Result<Self> {
        let raw: Value = serde_json::from_str(json)?;
        Ok(crate::normalize::normalize(raw))
    }

    /// Serialize back to the wire shape.
    pub fn to_json(&self) -> crate::error::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_pc(&self) -> bool {
        self.kind == CharacterKind::Pc
    }

    pub fn is_npc(&self) -> bool {
        self.kind == CharacterKind::Npc
    }

    /// Set the level and refresh the attached proficiency bonus.
    pub fn set_level(&mut self, level: i32) {
        self.level = level.max(1);
        self.system.details.level = Some(self.level);
        self.proficiency = self
            .is_pc()
            .then(|| rules::proficiency_bonus(self.level));
    }

    pub fn set_ability_score(&mut self, ability: Ability, score: i32) {
        self.system
            .abilities
            .entry(ability.key().to_string())
            .or_default()
            .value = Some(score);
    }

    pub fn set_skill(&mut self, skill: Skill, level: ProficiencyLevel) {
        self.system
            .skills
            .entry(skill.code().to_string())
            .or_default()
            .value = Some(level.multiplier());
    }

    pub fn ability_score(&self, ability: Ability) -> i32 {
        self.system
            .abilities
            .get(ability.key())
            .and_then(|e| e.value)
            .unwrap_or(DEFAULT_ABILITY_SCORE)
    }

    pub fn ability_modifier(&self, ability: Ability) -> i32 {
        rules::ability_modifier(self.ability_score(ability))
    }

    /// The attached bonus for PCs, otherwise derived from level.
    pub fn proficiency_bonus(&self) -> i32 {
        self.proficiency
            .unwrap_or_else(|| rules::proficiency_bonus(self.level))
    }

    pub fn is_proficient_in_save(&self, ability: Ability) -> bool {
        self.system
            .abilities
            .get(ability.key())
            .and_then(|e| e.proficient)
            .is_some_and(|p| p > 0.0)
    }

    pub fn saving_throw(&self, ability: Ability) -> i32 {
        rules::saving_throw_bonus(
            self.ability_score(ability),
            self.is_proficient_in_save(ability),
            self.proficiency_bonus(),
        )
    }

    /// Stored multiplier for a skill, 0 when absent.
    pub fn skill_multiplier(&self, skill: Skill) -> f64 {
        self.system
            .skills
            .get(skill.code())
            .and_then(|e| e.value)
            .unwrap_or(0.0)
    }

    /// The ability a skill rolls with, honouring a per-character override.
    pub fn skill_ability(&self, skill: Skill) -> Ability {
        self.system
            .skills
            .get(skill.code())
            .and_then(|e| e.ability.as_deref())
            .and_then(Ability::from_key)
            .unwrap_or_else(|| skill.ability())
    }

    pub fn skill_bonus(&self, skill: Skill) -> i32 {
        rules::skill_bonus(
            self.ability_score(self.skill_ability(skill)),
            self.skill_multiplier(skill),
            self.proficiency_bonus(),
        )
    }

    pub fn passive_skill(&self, skill: Skill) -> i32 {
        rules::passive_skill(
            self.ability_score(self.skill_ability(skill)),
            self.skill_multiplier(skill),
            self.proficiency_bonus(),
        )
    }

    /// Initiative ability (DEX unless overridden) plus any flat bonus.
    pub fn initiative(&self) -> i32 {
        let init = &self.system.attributes.init;
        let ability = init
            .ability
            .as_deref()
            .and_then(Ability::from_key)
            .unwrap_or(Ability::Dexterity);
        rules::initiative(self.ability_score(ability)).saturating_add(init.bonus.unwrap_or(0))
    }

    /// Walking speed in feet.
    pub fn speed(&self) -> i32 {
        self.system.attributes.movement.walk.unwrap_or(30)
    }

    pub fn spellcasting_ability(&self) -> Option<Ability> {
        self.system
            .attributes
            .spellcasting
            .as_deref()
            .and_then(Ability::from_key)
    }

    pub fn spell_save_dc(&self) -> Option<i32> {
        let ability = self.spellcasting_ability()?;
        Some(rules::spell_save_dc(
            self.ability_score(ability),
            self.proficiency_bonus(),
        ))
    }

    pub fn spell_attack_bonus(&self) -> Option<i32> {
        let ability = self.spellcasting_ability()?;
        Some(rules::spell_attack_bonus(
            self.ability_score(ability),
            self.proficiency_bonus(),
        ))
    }

    pub fn armor_class(&self) -> i32 {
        rules::armor_class(self)
    }

    /// Unarmed Strike followed by every weapon that has a damage die.
    pub fn attacks(&self) -> Vec<Item> {
        std::iter::once(Item::unarmed_strike())
            .chain(
                self.items
                    .iter()
                    .filter(|i| i.is_weapon() && i.damage_dice().is_some())
                    .cloned(),
            )
            .collect()
    }

    /// Find an attack by name, including the implicit Unarmed Strike.
    pub fn find_attack(&self, name: &str) -> Option<Item> {
        self.attacks().into_iter().find(|a| a.name == name)
    }
}

/// Read an integer from a JSON number or a numeric string like `"+2"`.
pub(crate) fn value_as_int(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.strip_prefix('+').unwrap_or(s).parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_from_key() {
        assert_eq!(Ability::from_key("dex"), Some(Ability::Dexterity));
        assert_eq!(Ability::from_key("WIS"), Some(Ability::Wisdom));
        assert_eq!(Ability::from_key("Charisma"), Some(Ability::Charisma));
        assert_eq!(Ability::from_key(""), None);
        assert_eq!(Ability::from_key("xyz"), None);
    }

    #[test]
    fn test_skill_codes_round_trip() {
        for skill in Skill::all() {
            assert_eq!(Skill::from_code(skill.code()), Some(skill));
        }
        assert_eq!(Skill::Perception.ability(), Ability::Wisdom);
        assert_eq!(Skill::Athletics.to_string(), "Athletics (STR)");
    }

    #[test]
    fn test_proficiency_level_multiplier() {
        assert_eq!(
            ProficiencyLevel::from_multiplier(0.5),
            Some(ProficiencyLevel::Half)
        );
        assert_eq!(
            ProficiencyLevel::from_multiplier(2.0),
            Some(ProficiencyLevel::Expertise)
        );
        assert_eq!(ProficiencyLevel::from_multiplier(1.5), None);

        assert_eq!(ProficiencyLevel::Half.bonus(3), 1);
        assert_eq!(ProficiencyLevel::Expertise.bonus(3), 6);
        assert_eq!(ProficiencyLevel::None.bonus(3), 0);
    }

    #[test]
    fn test_missing_ability_defaults_to_ten() {
        let character = Character::new("Blank", CharacterKind::Npc);
        for ability in Ability::all() {
            assert_eq!(character.ability_score(ability), 10);
            assert_eq!(character.ability_modifier(ability), 0);
        }
        assert_eq!(character.skill_multiplier(Skill::Stealth), 0.0);
    }

    #[test]
    fn test_set_level_attaches_bonus_for_pcs_only() {
        let mut pc = Character::new("Vex", CharacterKind::Pc);
        pc.set_level(5);
        assert_eq!(pc.proficiency, Some(3));

        let mut npc = Character::new("Mattrim", CharacterKind::Npc);
        npc.set_level(5);
        assert_eq!(npc.proficiency, None);
        assert_eq!(npc.proficiency_bonus(), 3);
    }

    #[test]
    fn test_skill_ability_override() {
        let mut character = Character::new("Test", CharacterKind::Pc);
        character.set_ability_score(Ability::Strength, 18);
        character.set_ability_score(Ability::Charisma, 8);
        character.set_skill(Skill::Intimidation, ProficiencyLevel::Proficient);
        // 8 CHA (-1) + 2
        assert_eq!(character.skill_bonus(Skill::Intimidation), 1);

        character
            .system
            .skills
            .get_mut("itm")
            .unwrap()
            .ability = Some("str".to_string());
        // 18 STR (+4) + 2
        assert_eq!(character.skill_bonus(Skill::Intimidation), 6);
        assert_eq!(character.passive_skill(Skill::Intimidation), 16);
    }

    #[test]
    fn test_saving_throw_proficiency() {
        let mut character = Character::new("Test", CharacterKind::Pc);
        character.set_ability_score(Ability::Constitution, 14);
        assert_eq!(character.saving_throw(Ability::Constitution), 2);

        character
            .system
            .abilities
            .get_mut("con")
            .unwrap()
            .proficient = Some(1.0);
        assert_eq!(character.saving_throw(Ability::Constitution), 4);
    }

    #[test]
    fn test_initiative_and_speed() {
        let mut character = Character::new("Test", CharacterKind::Pc);
        character.set_ability_score(Ability::Dexterity, 16);
        assert_eq!(character.initiative(), 3);
        assert_eq!(character.speed(), 30);

        character.system.attributes.init.bonus = Some(2);
        character.system.attributes.movement.walk = Some(25);
        assert_eq!(character.initiative(), 5);
        assert_eq!(character.speed(), 25);

        character.set_ability_score(Ability::Dexterity, 30);
        character.system.attributes.init.bonus = Some(i32::MAX);
        assert_eq!(character.initiative(), i32::MAX);
    }

    #[test]
    fn test_spellcasting() {
        let mut character = Character::new("Test", CharacterKind::Pc);
        assert_eq!(character.spell_save_dc(), None);
        assert_eq!(character.spell_attack_bonus(), None);

        character.set_ability_score(Ability::Intelligence, 16);
        character.system.attributes.spellcasting = Some("int".to_string());
        character.set_level(5);
        assert_eq!(character.spell_save_dc(), Some(14));
        assert_eq!(character.spell_attack_bonus(), Some(6));

        character.system.attributes.spellcasting = Some(String::new());
        assert_eq!(character.spellcasting_ability(), None);
    }

    #[test]
    fn test_item_damage_dice() {
        let longsword = Item::weapon("Longsword", DamageDice::new(1, 8));
        assert_eq!(longsword.damage_dice(), Some(DamageDice::new(1, 8)));

        let mut legacy = Item::weapon("Club", DamageDice::new(1, 4));
        legacy.system.damage = Some(ItemDamage {
            base: None,
            extra: serde_json::from_value(serde_json::json!({
                "parts": [["1d6 + @mod", "bludgeoning"]]
            }))
            .unwrap(),
        });
        assert_eq!(legacy.damage_dice(), Some(DamageDice::new(1, 6)));

        let rope = Item {
            name: "Rope".to_string(),
            item_type: "loot".to_string(),
            ..Default::default()
        };
        assert_eq!(rope.damage_dice(), None);

        let mut broken = Item::weapon("Broken", DamageDice::new(1, 8));
        broken
            .system
            .damage
            .as_mut()
            .unwrap()
            .base
            .as_mut()
            .unwrap()
            .denomination = Some(0);
        assert_eq!(broken.damage_dice(), None);
    }

    #[test]
    fn test_weapon_properties() {
        let rapier = Item::weapon("Rapier", DamageDice::new(1, 8))
            .with_properties(vec!["fin".to_string()]);
        assert!(rapier.is_finesse());
        assert!(!rapier.is_ranged());

        let bow = Item::weapon("Longbow", DamageDice::new(1, 8)).with_action_type("rwak");
        assert!(bow.is_ranged());

        let crossbow = Item::weapon("Light Crossbow", DamageDice::new(1, 8))
            .with_properties(vec!["amm".to_string(), "lod".to_string()]);
        assert!(crossbow.is_ranged());
        assert!(crossbow.has_property(&WeaponProperty::Loading));
    }

    #[test]
    fn test_attacks_start_with_unarmed_strike() {
        let mut character = Character::new("Test", CharacterKind::Pc);
        character
            .items
            .push(Item::weapon("Dagger", DamageDice::new(1, 4)));
        character.items.push(Item::armor("Leather", ArmorType::Light, 11));

        let attacks = character.attacks();
        assert_eq!(attacks.len(), 2);
        assert_eq!(attacks[0].name, "Unarmed Strike");
        assert!(attacks[0].is_finesse());
        assert_eq!(attacks[1].name, "Dagger");
        assert!(character.find_attack("Leather").is_none());
    }

    #[test]
    fn test_value_as_int() {
        assert_eq!(value_as_int(&serde_json::json!(3)), Some(3));
        assert_eq!(value_as_int(&serde_json::json!(3.0)), Some(3));
        assert_eq!(value_as_int(&serde_json::json!(3.5)), None);
        assert_eq!(value_as_int(&serde_json::json!("+2")), Some(2));
        assert_eq!(value_as_int(&serde_json::json!("@mod")), None);
        assert_eq!(value_as_int(&serde_json::json!(null)), None);
    }
}
