//! D&D 5e derived statistics.
//!
//! Every function here is pure and total: no input makes it fail or panic.
//! Scores are raw ability scores (10 is average), `pb` is a proficiency
//! bonus.

use crate::character::{Ability, ArmorType, Character, Item, ProficiencyLevel};
use crate::dice::Advantage;
use serde::{Deserialize, Serialize};

// ============================================================================
// Ability Math
// ============================================================================

/// `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    score.saturating_sub(10).div_euclid(2)
}

/// Proficiency bonus by character level. Levels below 1 count as 1.
pub fn proficiency_bonus(level: i32) -> i32 {
    match level {
        i32::MIN..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

pub fn saving_throw_bonus(score: i32, proficient: bool, pb: i32) -> i32 {
    ability_modifier(score).saturating_add(if proficient { pb } else { 0 })
}

/// Modifier plus the proficiency share for a stored multiplier.
///
/// Half proficiency rounds down. A multiplier other than 0, 0.5, 1 or 2
/// adds nothing.
pub fn skill_bonus(score: i32, multiplier: f64, pb: i32) -> i32 {
    let proficiency = ProficiencyLevel::from_multiplier(multiplier)
        .map(|level| level.bonus(pb))
        .unwrap_or(0);
    ability_modifier(score).saturating_add(proficiency)
}

pub fn passive_skill(score: i32, multiplier: f64, pb: i32) -> i32 {
    skill_bonus(score, multiplier, pb).saturating_add(10)
}

pub fn spell_save_dc(score: i32, pb: i32) -> i32 {
    spell_attack_bonus(score, pb).saturating_add(8)
}

pub fn spell_attack_bonus(score: i32, pb: i32) -> i32 {
    ability_modifier(score).saturating_add(pb)
}

pub fn initiative(dexterity: i32) -> i32 {
    ability_modifier(dexterity)
}

// ============================================================================
// Movement and Endurance
// ============================================================================

/// Pounds a creature can carry.
pub fn carrying_capacity(strength: i32) -> i32 {
    strength.saturating_mul(15)
}

/// Pounds a creature can push, drag or lift.
pub fn push_drag_lift(strength: i32) -> i32 {
    strength.saturating_mul(30)
}

/// Feet covered by a long jump; a standing jump covers half.
pub fn long_jump(strength: i32, running: bool) -> i32 {
    if running {
        strength
    } else {
        strength.div_euclid(2)
    }
}

/// Feet covered by a high jump; a standing jump covers half.
pub fn high_jump(strength: i32, running: bool) -> i32 {
    let height = 3 + ability_modifier(strength);
    if running {
        height
    } else {
        height.div_euclid(2)
    }
}

/// Minutes a creature can hold its breath, never less than half a minute.
pub fn hold_breath_minutes(constitution: i32) -> f64 {
    f64::from(1 + ability_modifier(constitution)).max(0.5)
}

// ============================================================================
// Armor Class
// ============================================================================

/// Display AC.
///
/// An explicit `ac.flat` wins outright. Otherwise the best equipped body
/// armor (base plus capped DEX) or unarmored 10 + DEX, plus the best
/// equipped shield.
pub fn armor_class(character: &Character) -> i32 {
    if let Some(flat) = character.system.attributes.ac.flat {
        return flat;
    }

    let dex = character.ability_modifier(Ability::Dexterity);
    let equipped = || character.items.iter().filter(|i| i.is_equipped());

    let body = equipped()
        .filter(|i| i.armor_type().is_some_and(|t| t != ArmorType::Shield))
        .filter_map(|i| {
            let base = i.armor_value().filter(|v| *v > 0)?;
            Some(base.saturating_add(capped_dex(dex, i.dex_cap())))
        })
        .max();

    let shield = equipped()
        .filter(|i| i.armor_type() == Some(ArmorType::Shield))
        .map(|i| i.armor_value().unwrap_or(2))
        .max()
        .unwrap_or(0);

    body.unwrap_or(10 + dex).saturating_add(shield)
}

/// The cap only limits a bonus; a DEX penalty always applies.
fn capped_dex(dex: i32, cap: Option<i32>) -> i32 {
    match cap {
        Some(cap) => dex.min(cap),
        None => dex,
    }
}

// ============================================================================
// Damage Per Round
// ============================================================================

/// Expected damage output of one attack against one AC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEntry {
    pub name: String,
    /// Expected damage of a single hit.
    pub expected_damage: f64,
    pub attack_bonus: i32,
    /// Hit chance at a normal roll.
    pub hit_chance: f64,
    pub dpr_normal: f64,
    pub dpr_advantage: f64,
    pub dpr_disadvantage: f64,
}

impl DamageEntry {
    pub fn dpr(&self, mode: Advantage) -> f64 {
        match mode {
            Advantage::Normal => self.dpr_normal,
            Advantage::Advantage => self.dpr_advantage,
            Advantage::Disadvantage => self.dpr_disadvantage,
        }
    }
}

/// Chance to hit with a single d20: a natural 1 always misses and a
/// natural 20 always hits.
pub fn hit_chance(attack_bonus: i32, target_ac: i32) -> f64 {
    let needed = i64::from(target_ac) - i64::from(attack_bonus);
    ((21 - needed) as f64 / 20.0).clamp(0.05, 0.95)
}

/// Ability modifier used for an attack: STR, or the better of STR and DEX
/// for finesse and ranged weapons.
pub fn attack_modifier(character: &Character, attack: &Item) -> i32 {
    let strength = character.ability_modifier(Ability::Strength);
    if attack.is_finesse() || attack.is_ranged() {
        strength.max(character.ability_modifier(Ability::Dexterity))
    } else {
        strength
    }
}

/// DPR of `attack` against `target_ac`, or `None` when the entry has no
/// usable damage die. Proficiency is assumed for every weapon.
pub fn damage_per_round(
    character: &Character,
    attack: &Item,
    target_ac: i32,
) -> Option<DamageEntry> {
    let dice = attack.damage_dice()?;
    let modifier = attack_modifier(character, attack);
    let attack_bonus = modifier.saturating_add(character.proficiency_bonus());

    let damage_modifier = if attack.is_off_hand() {
        modifier.max(0)
    } else {
        modifier
    };
    let expected_damage = dice.average() + f64::from(damage_modifier);

    let p = hit_chance(attack_bonus, target_ac);
    Some(DamageEntry {
        name: attack.name.clone(),
        expected_damage,
        attack_bonus,
        hit_chance: p,
        dpr_normal: Advantage::Normal.apply(p) * expected_damage,
        dpr_advantage: Advantage::Advantage.apply(p) * expected_damage,
        dpr_disadvantage: Advantage::Disadvantage.apply(p) * expected_damage,
    })
}

/// DPR rows for every attack a character has, not-applicable ones dropped.
pub fn damage_table(character: &Character, target_ac: i32) -> Vec<DamageEntry> {
    character
        .attacks()
        .iter()
        .filter_map(|attack| damage_per_round(character, attack, target_ac))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterKind, Item};
    use crate::dice::DamageDice;

    const EPSILON: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn fighter(strength: i32, dexterity: i32) -> Character {
        let mut character = Character::new("Fighter", CharacterKind::Pc);
        character.set_ability_score(Ability::Strength, strength);
        character.set_ability_score(Ability::Dexterity, dexterity);
        character
    }

    #[test]
    fn test_ability_modifier() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(1), -5);
        assert_eq!(ability_modifier(20), 5);
        assert_eq!(ability_modifier(0), -5);
    }

    #[test]
    fn test_proficiency_bonus_breakpoints() {
        assert_eq!(proficiency_bonus(-2), 2);
        assert_eq!(proficiency_bonus(0), 2);
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(8), 3);
        assert_eq!(proficiency_bonus(9), 4);
        assert_eq!(proficiency_bonus(12), 4);
        assert_eq!(proficiency_bonus(13), 5);
        assert_eq!(proficiency_bonus(16), 5);
        assert_eq!(proficiency_bonus(17), 6);
        assert_eq!(proficiency_bonus(20), 6);
        assert_eq!(proficiency_bonus(30), 6);
    }

    #[test]
    fn test_skill_bonus() {
        assert_eq!(skill_bonus(14, 1.0, 2), 4);
        assert_eq!(skill_bonus(14, 0.5, 3), 3);
        assert_eq!(skill_bonus(14, 2.0, 3), 8);
        assert_eq!(skill_bonus(14, 0.0, 3), 2);
        assert_eq!(skill_bonus(14, 1.5, 3), 2);
        assert_eq!(passive_skill(14, 1.0, 2), 14);
    }

    #[test]
    fn test_spellcasting_and_saves() {
        assert_eq!(spell_save_dc(16, 3), 14);
        assert_eq!(spell_attack_bonus(16, 3), 6);
        assert_eq!(saving_throw_bonus(12, true, 2), 3);
        assert_eq!(saving_throw_bonus(12, false, 2), 1);
    }

    #[test]
    fn test_strength_derivations() {
        assert_eq!(carrying_capacity(15), 225);
        assert_eq!(push_drag_lift(15), 450);
        assert_eq!(long_jump(15, true), 15);
        assert_eq!(long_jump(15, false), 7);
        assert_eq!(high_jump(14, true), 5);
        assert_eq!(high_jump(14, false), 2);
        assert_eq!(initiative(16), 3);
    }

    #[test]
    fn test_hold_breath() {
        assert_eq!(hold_breath_minutes(10), 1.0);
        assert_eq!(hold_breath_minutes(16), 4.0);
        assert_eq!(hold_breath_minutes(6), 0.5);
        assert_eq!(hold_breath_minutes(1), 0.5);
    }

    #[test]
    fn test_hit_chance_clamps() {
        assert!(close(hit_chance(5, 15), 0.55));
        assert!(close(hit_chance(0, 40), 0.05));
        assert!(close(hit_chance(20, 2), 0.95));
        assert!(close(hit_chance(3, -10), 0.95));
        assert!(close(hit_chance(i32::MAX, i32::MIN), 0.95));
    }

    #[test]
    fn test_dpr_reference_scenario() {
        // STR 16 (+3), level 1 (+2): attack bonus +5, 1d8+3 per hit.
        let character = fighter(16, 10);
        let longsword = Item::weapon("Longsword", DamageDice::new(1, 8));

        let entry = damage_per_round(&character, &longsword, 15).unwrap();
        assert_eq!(entry.name, "Longsword");
        assert_eq!(entry.attack_bonus, 5);
        assert!(close(entry.expected_damage, 7.5));
        assert!(close(entry.hit_chance, 0.55));
        assert!(close(entry.dpr_normal, 4.125));
        assert!(close(entry.dpr_advantage, 5.98125));
        assert!(close(entry.dpr_disadvantage, 0.3025 * 7.5));
        assert!(close(entry.dpr(Advantage::Advantage), entry.dpr_advantage));
    }

    #[test]
    fn test_finesse_and_ranged_pick_better_ability() {
        let character = fighter(8, 18);
        let rapier = Item::weapon("Rapier", DamageDice::new(1, 8))
            .with_properties(vec!["fin".to_string()]);
        let bow = Item::weapon("Shortbow", DamageDice::new(1, 6)).with_action_type("rwak");
        let club = Item::weapon("Club", DamageDice::new(1, 4));

        assert_eq!(attack_modifier(&character, &rapier), 4);
        assert_eq!(attack_modifier(&character, &bow), 4);
        assert_eq!(attack_modifier(&character, &club), -1);

        let strong = fighter(18, 8);
        assert_eq!(attack_modifier(&strong, &rapier), 4);
    }

    #[test]
    fn test_off_hand_drops_negative_modifier() {
        let character = fighter(6, 10);
        let dagger = Item::weapon("Dagger", DamageDice::new(1, 4));
        let main = damage_per_round(&character, &dagger, 10).unwrap();
        let off = damage_per_round(&character, &dagger.clone().off_hand(), 10).unwrap();
        assert!(close(main.expected_damage, 0.5));
        assert!(close(off.expected_damage, 2.5));
    }

    #[test]
    fn test_weak_attack_keeps_negative_expected_damage() {
        // STR 1 (-5) on a 1d4 club: 2.5 - 5.
        let character = fighter(1, 10);
        let club = Item::weapon("Club", DamageDice::new(1, 4));
        let entry = damage_per_round(&character, &club, 10).unwrap();
        assert!(close(entry.expected_damage, -2.5));
        assert!(close(entry.dpr_normal, entry.hit_chance * -2.5));
    }

    #[test]
    fn test_flat_bonus_adds_to_damage() {
        let character = fighter(10, 10);
        let sword = Item::weapon("+1 Sword", DamageDice::new(1, 8).with_bonus(1));
        let entry = damage_per_round(&character, &sword, 10).unwrap();
        assert!(close(entry.expected_damage, 5.5));
    }

    #[test]
    fn test_no_damage_die_is_not_applicable() {
        let character = fighter(16, 10);
        let net = Item {
            name: "Net".to_string(),
            item_type: "weapon".to_string(),
            ..Default::default()
        };
        assert!(damage_per_round(&character, &net, 15).is_none());

        let mut table_owner = character.clone();
        table_owner.items.push(net);
        table_owner
            .items
            .push(Item::weapon("Longsword", DamageDice::new(1, 8)));
        let names: Vec<_> = damage_table(&table_owner, 15)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Unarmed Strike", "Longsword"]);
    }

    #[test]
    fn test_armor_class_unarmored() {
        assert_eq!(armor_class(&fighter(10, 14)), 12);
        assert_eq!(armor_class(&fighter(10, 8)), 9);
    }

    #[test]
    fn test_armor_class_flat_override_wins() {
        let mut character = fighter(10, 14);
        character
            .items
            .push(Item::armor("Plate", ArmorType::Heavy, 18).equipped());
        character.system.attributes.ac.flat = Some(21);
        assert_eq!(armor_class(&character), 21);
    }

    #[test]
    fn test_armor_class_dex_caps() {
        let mut light = fighter(10, 18);
        light
            .items
            .push(Item::armor("Studded Leather", ArmorType::Light, 12).equipped());
        assert_eq!(armor_class(&light), 16);

        let mut medium = fighter(10, 18);
        medium
            .items
            .push(Item::armor("Half Plate", ArmorType::Medium, 15).equipped());
        assert_eq!(armor_class(&medium), 17);

        let mut heavy = fighter(10, 8);
        heavy
            .items
            .push(Item::armor("Chain Mail", ArmorType::Heavy, 16).equipped());
        assert_eq!(armor_class(&heavy), 15);

        let mut nimble = fighter(10, 18);
        nimble
            .items
            .push(Item::armor("Splint", ArmorType::Heavy, 17).with_dex_cap(0).equipped());
        assert_eq!(armor_class(&nimble), 17);

        let mut explicit = fighter(10, 18);
        explicit
            .items
            .push(Item::armor("Odd Mail", ArmorType::Light, 13).with_dex_cap(1).equipped());
        assert_eq!(armor_class(&explicit), 14);
    }

    #[test]
    fn test_extreme_values_saturate() {
        let mut character = fighter(10, 30);
        character
            .items
            .push(Item::armor("Impossible Plate", ArmorType::Light, i32::MAX).equipped());
        character
            .items
            .push(Item::armor("Tower", ArmorType::Shield, i32::MAX).equipped());
        assert_eq!(armor_class(&character), i32::MAX);

        let mut huge = Item::weapon("Huge", DamageDice::new(1, 6));
        huge.system.damage = Some(crate::character::ItemDamage {
            base: None,
            extra: serde_json::from_value(serde_json::json!({
                "parts": [["1d6+2147483647+1", "bludgeoning"]]
            }))
            .unwrap(),
        });
        character.items.push(huge);
        let names: Vec<_> = damage_table(&character, 15)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Unarmed Strike"]);
    }

    #[test]
    fn test_armor_class_ignores_unequipped_and_adds_shield() {
        let mut character = fighter(10, 14);
        character
            .items
            .push(Item::armor("Plate", ArmorType::Heavy, 18));
        character
            .items
            .push(Item::armor("Leather", ArmorType::Light, 11).equipped());
        character
            .items
            .push(Item::armor("Chain Shirt", ArmorType::Medium, 13).equipped());
        // Leather 13, Chain Shirt 15: best wins.
        assert_eq!(armor_class(&character), 15);

        character
            .items
            .push(Item::armor("Shield", ArmorType::Shield, 2).equipped());
        assert_eq!(armor_class(&character), 17);

        let mut unarmored = fighter(10, 14);
        unarmored
            .items
            .push(Item::armor("Shield", ArmorType::Shield, 2).equipped());
        assert_eq!(armor_class(&unarmored), 14);
    }
}
