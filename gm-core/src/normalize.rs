//! Raw character JSON to canonical [`Character`].
//!
//! Records come from several importers and from hand edits, so any field may
//! be missing, `null`, a numeric string or simply the wrong shape. The
//! `lenient*` deserializers below resolve all of those to defaults; the
//! [`normalize`] entry point adds the record-level fixes (ids, legacy
//! `vtt_data`, PC markers, level resolution).

use crate::character::{value_as_int, Character, CharacterId, CharacterKind};
use crate::rules;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// Lenient Deserializers
// ============================================================================

fn coerce<T: DeserializeOwned + Default>(value: Value) -> T {
    if value.is_null() {
        return T::default();
    }
    match serde_json::from_value(value) {
        Ok(v) => v,
        Err(err) => {
            debug!(%err, "wrong-shaped field replaced by its default");
            T::default()
        }
    }
}

/// Any shape mismatch resolves to `T::default()`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(coerce(Value::deserialize(deserializer)?))
}

/// Integer from a JSON number or numeric string.
pub(crate) fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let int = value_as_int(&value);
    if int.is_none() {
        debug!(%value, "expected an integer");
    }
    Ok(int)
}

/// Float from a JSON number or numeric string.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.strip_prefix('+')
                .unwrap_or(s)
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
        }
        _ => None,
    };
    if number.is_none() {
        debug!(%value, "expected a number");
    }
    Ok(number)
}

pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// List whose wrong-shaped elements are dropped.
pub(crate) fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => {
            let total = items.len();
            let kept: Vec<T> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
            if kept.len() < total {
                debug!(dropped = total - kept.len(), "dropped wrong-shaped list elements");
            }
            kept
        }
        Value::Null => Vec::new(),
        other => {
            debug!(value = %other, "expected a list");
            Vec::new()
        }
    })
}

/// Map whose wrong-shaped entries are dropped.
pub(crate) fn lenient_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(key, item)| match serde_json::from_value(item) {
                Ok(v) => Some((key, v)),
                Err(err) => {
                    debug!(%key, %err, "dropped wrong-shaped map entry");
                    None
                }
            })
            .collect(),
        Value::Null => BTreeMap::new(),
        other => {
            debug!(value = %other, "expected an object");
            BTreeMap::new()
        }
    })
}

/// Weapon properties arrive either as `["fin", "lgt"]` or as
/// `{"fin": true, "lgt": false}`.
pub(crate) fn lenient_properties<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::Object(flags) => flags
            .into_iter()
            .filter(|(_, on)| on.as_bool().unwrap_or(false))
            .map(|(code, _)| code)
            .collect(),
        _ => Vec::new(),
    })
}

// ============================================================================
// Record-Level Normalization
// ============================================================================

/// Normalize a raw character record. Never fails.
///
/// Every substructure of the canonical schema is present afterwards, and
/// `normalize(to_json(normalize(x))) == normalize(x)`.
pub fn normalize(raw: Value) -> Character {
    let mut record = match raw {
        Value::Object(map) => map,
        other => {
            debug!(value = %other, "character record is not an object");
            Map::new()
        }
    };

    let id = resolve_id(record.remove("_id"));
    record.insert("_id".to_string(), Value::String(id.0.clone()));

    adopt_legacy_system(&mut record);

    let kind = resolve_kind(&record);
    record.insert(
        "character_type".to_string(),
        Value::String(kind.to_string()),
    );

    let level = resolve_level(&record);
    record.remove("level");
    record.remove("proficiencyBonus");

    let mut character = match serde_json::from_value::<Character>(Value::Object(record)) {
        Ok(character) => character,
        Err(err) => {
            warn!(%id, %err, "character record could not be read, using an empty sheet");
            Character {
                id: id.clone(),
                kind,
                ..Default::default()
            }
        }
    };

    character.level = level;
    character.proficiency = match character.kind {
        CharacterKind::Pc => Some(rules::proficiency_bonus(level)),
        CharacterKind::Npc => None,
    };
    character
}

fn resolve_id(raw: Option<Value>) -> CharacterId {
    let id = match raw {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(oid)) => oid.get("$oid").and_then(Value::as_str).map(str::to_string),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    match id.filter(|s| !s.trim().is_empty()) {
        Some(id) => CharacterId(id),
        None => {
            let id = CharacterId::new();
            debug!(%id, "record has no id, minted one");
            id
        }
    }
}

/// Use `vtt_data` as `system` when the record has no usable `system`.
fn adopt_legacy_system(record: &mut Map<String, Value>) {
    let has_system = matches!(record.get("system"), Some(Value::Object(_)));
    let has_legacy = matches!(record.get("vtt_data"), Some(Value::Object(_)));
    if !has_system && has_legacy {
        if let Some(legacy) = record.remove("vtt_data") {
            record.insert("system".to_string(), legacy);
        }
    }
}

fn is_pc_marker(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .is_some_and(|s| s.eq_ignore_ascii_case("PC") || s.eq_ignore_ascii_case("Player Character"))
}

fn resolve_kind(record: &Map<String, Value>) -> CharacterKind {
    if is_pc_marker(record.get("character_type")) || is_pc_marker(record.get("type")) {
        CharacterKind::Pc
    } else {
        CharacterKind::Npc
    }
}

/// First positive integer among, in order: the D&D Beyond importer's total
/// level, `system.details.level`, a leftover `vtt_data.details.level`, the
/// top-level `level`. Default 1.
fn resolve_level(record: &Map<String, Value>) -> i32 {
    let sources = [
        record.get("vtt_flags").and_then(|flags| {
            flags
                .get("ddbimporter")?
                .get("dndbeyond")?
                .get("totalLevels")
        }),
        record
            .get("system")
            .and_then(|system| system.get("details")?.get("level")),
        record
            .get("vtt_data")
            .and_then(|legacy| legacy.get("details")?.get("level")),
        record.get("level"),
    ];
    sources
        .into_iter()
        .flatten()
        .filter_map(value_as_int)
        .find(|level| *level > 0)
        .unwrap_or(1)
}
