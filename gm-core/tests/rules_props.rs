//! Property-based tests for the rules engine
//!
//! Tests invariants:
//! - Ability modifier is floor((score - 10) / 2)
//! - Proficiency bonus never decreases with level and stays within 2..=6
//! - Hit chance stays within [0.05, 0.95] and falls as AC rises
//! - Passive scores are always ten more than the skill bonus
//! - No score or bonus makes a formula overflow

use gm_core::rules;
use proptest::prelude::*;

proptest! {
    /// Property: modifier matches the floored formula
    #[test]
    fn prop_modifier_is_floored_half(score in -100i32..200) {
        let expected = ((score - 10) as f64 / 2.0).floor() as i32;
        prop_assert_eq!(rules::ability_modifier(score), expected);
    }

    /// Property: proficiency bonus is monotone and bounded
    #[test]
    fn prop_proficiency_is_monotone(level in -20i32..40) {
        let here = rules::proficiency_bonus(level);
        let next = rules::proficiency_bonus(level + 1);
        prop_assert!(next >= here);
        prop_assert!((2..=6).contains(&here));
    }

    /// Property: hit chance is clamped and never rises with AC
    #[test]
    fn prop_hit_chance_clamped(bonus in -20i32..30, ac in -30i32..60) {
        let p = rules::hit_chance(bonus, ac);
        prop_assert!((0.05..=0.95).contains(&p));
        prop_assert!(rules::hit_chance(bonus, ac + 1) <= p);
    }

    /// Property: passive = 10 + skill bonus for every stored multiplier
    #[test]
    fn prop_passive_is_ten_plus_bonus(
        score in 1i32..=30,
        multiplier in prop::sample::select(vec![0.0, 0.5, 1.0, 2.0, 1.5, -1.0]),
        pb in 2i32..=6,
    ) {
        prop_assert_eq!(
            rules::passive_skill(score, multiplier, pb),
            10 + rules::skill_bonus(score, multiplier, pb)
        );
    }

    /// Property: expertise never loses to proficiency, proficiency never
    /// loses to half
    #[test]
    fn prop_multiplier_ordering(score in 1i32..=30, pb in 2i32..=6) {
        let none = rules::skill_bonus(score, 0.0, pb);
        let half = rules::skill_bonus(score, 0.5, pb);
        let full = rules::skill_bonus(score, 1.0, pb);
        let expert = rules::skill_bonus(score, 2.0, pb);
        prop_assert!(none <= half && half <= full && full <= expert);
    }

    /// Property: every formula accepts any score and bonus
    #[test]
    fn prop_formulas_are_total(
        score in any::<i32>(),
        pb in any::<i32>(),
        multiplier in prop::sample::select(vec![0.0, 0.5, 1.0, 2.0]),
    ) {
        let _ = rules::saving_throw_bonus(score, true, pb);
        let _ = rules::passive_skill(score, multiplier, pb);
        let _ = rules::spell_save_dc(score, pb);
        let _ = rules::carrying_capacity(score);
        let _ = rules::push_drag_lift(score);
        let _ = rules::long_jump(score, false);
        let _ = rules::high_jump(score, true);
        prop_assert!(rules::hold_breath_minutes(score) >= 0.5);
    }

    /// Property: strength derivations scale linearly
    #[test]
    fn prop_strength_derivations(strength in 1i32..=30) {
        prop_assert_eq!(rules::push_drag_lift(strength), 2 * rules::carrying_capacity(strength));
        prop_assert!(rules::long_jump(strength, false) <= rules::long_jump(strength, true));
        prop_assert!(rules::hold_breath_minutes(strength) >= 0.5);
    }
}

#[test]
fn test_reference_values() {
    assert_eq!(rules::ability_modifier(10), 0);
    assert_eq!(rules::ability_modifier(11), 0);
    assert_eq!(rules::ability_modifier(9), -1);
    assert_eq!(rules::skill_bonus(14, 1.0, 2), 4);
    assert_eq!(rules::skill_bonus(14, 0.5, 3), 3);
    assert_eq!(rules::spell_save_dc(16, 3), 14);
    for (level, bonus) in [(4, 2), (5, 3), (8, 3), (9, 4), (12, 4), (13, 5), (16, 5), (17, 6)] {
        assert_eq!(rules::proficiency_bonus(level), bonus, "level {level}");
    }
}
