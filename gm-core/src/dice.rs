//! Damage dice and attack-roll modes.
//!
//! Weapon records describe damage either as a structured descriptor
//! (die size, die count, flat bonus) or as a notation string such as
//! `"1d8 + @mod"`. Both end up as a [`DamageDice`], which only needs to
//! report its expected value: nothing here rolls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for damage notation parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Mixed die sizes are not supported: {0}")]
    MixedDice(String),
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Chance that at least one (or, with disadvantage, both) of the
    /// d20s succeeds, given the single-roll chance `p`.
    pub fn apply(self, p: f64) -> f64 {
        match self {
            Advantage::Normal => p,
            Advantage::Advantage => 1.0 - (1.0 - p).powi(2),
            Advantage::Disadvantage => p * p,
        }
    }
}

/// A damage roll of `count` dice with `sides` faces plus a flat bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageDice {
    pub count: u32,
    pub sides: u32,
    pub bonus: i32,
}

impl DamageDice {
    pub fn new(count: u32, sides: u32) -> Self {
        Self {
            count,
            sides,
            bonus: 0,
        }
    }

    pub fn with_bonus(mut self, bonus: i32) -> Self {
        self.bonus = bonus;
        self
    }

    /// Expected value of the roll, flat bonus included.
    pub fn average(&self) -> f64 {
        f64::from(self.count) * (f64::from(self.sides) + 1.0) / 2.0 + f64::from(self.bonus)
    }

    /// Parse a damage formula like `2d6+3` or `1d8 + @mod`.
    ///
    /// Roll-data references (`@mod`, `@prof`) are resolved by the caller,
    /// so they are skipped here. Only one die size may appear.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut dice: Option<(u32, u32)> = None;
        let mut bonus: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &notation, &mut dice, &mut bonus)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &notation, &mut dice, &mut bonus)?;
        }

        let (count, sides) = dice.ok_or(DiceError::NoDice)?;
        Ok(DamageDice {
            count,
            sides,
            bonus,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        notation: &str,
        dice: &mut Option<(u32, u32)>,
        bonus: &mut i32,
    ) -> Result<(), DiceError> {
        if s.starts_with('@') {
            return Ok(());
        }

        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let sides_str = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };
            let sides: u32 = sides_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            if sides == 0 {
                return Err(DiceError::InvalidDieSize(sides));
            }

            *dice = match *dice {
                None => Some((count, sides)),
                Some((n, existing)) if existing == sides => {
                    let total = n
                        .checked_add(count)
                        .ok_or_else(|| DiceError::InvalidNotation(notation.to_string()))?;
                    Some((total, sides))
                }
                Some(_) => return Err(DiceError::MixedDice(notation.to_string())),
            };
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *bonus = value
                .checked_mul(sign)
                .and_then(|v| bonus.checked_add(v))
                .ok_or_else(|| DiceError::InvalidNotation(notation.to_string()))?;
        }

        Ok(())
    }
}

impl FromStr for DamageDice {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DamageDice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.bonus {
            0 => Ok(()),
            b if b > 0 => write!(f, "+{b}"),
            b => write!(f, "{b}"),
        }
    }
}
