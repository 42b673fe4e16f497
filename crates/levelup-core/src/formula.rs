//! Experience and leveling formulas.
//!
//! Everything here is pure and deterministic. Levels grow logarithmically
//! with accumulated points, so each level costs more than the previous one:
//!
//! ```text
//! level = floor(10 * log2(points / 100 + 1)), clamped to [0, 199]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Difficulty assumed for habits that have not been assessed yet.
pub const DEFAULT_DIFFICULTY: i32 = 50;

/// Highest reachable level for both habits and expertise domains.
pub const MAX_LEVEL: i32 = 199;

/// Cap on the streak bonus added to a single award.
pub const MAX_STREAK_BONUS: i64 = 50;

const XP_PER_DIFFICULTY: i64 = 10;
const XP_PER_STREAK_DAY: i64 = 2;

/// Experience earned for one completion of a habit.
///
/// Unassessed habits (`None`) count as [`DEFAULT_DIFFICULTY`].
pub fn experience_points(difficulty_level: Option<i32>, streak_days: u32) -> i64 {
    let level = difficulty_level.unwrap_or(DEFAULT_DIFFICULTY).max(0) as i64;
    let base_xp = level * XP_PER_DIFFICULTY;
    let streak_bonus = (streak_days as i64 * XP_PER_STREAK_DAY).min(MAX_STREAK_BONUS);
    base_xp + streak_bonus
}

/// Level reached with `points` accumulated experience.
pub fn level_from_points(points: i64) -> i32 {
    if points <= 0 {
        return 0;
    }
    let raw = 10.0 * (points as f64 / 100.0 + 1.0).log2();
    (raw.floor() as i64).clamp(0, MAX_LEVEL as i64) as i32
}

/// Smallest point total whose level is at least `level`.
pub fn points_for_level(level: i32) -> i64 {
    if level <= 0 {
        return 0;
    }
    let level = level.min(MAX_LEVEL);
    // Closed form first, then nudge past float rounding at the boundary.
    let mut points = (100.0 * (2f64.powf(level as f64 / 10.0) - 1.0)).ceil() as i64;
    while points > 0 && level_from_points(points - 1) >= level {
        points -= 1;
    }
    while level_from_points(points) < level {
        points += 1;
    }
    points
}

/// Coarse label for a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTier {
    /// 0-29
    Beginner,
    /// 30-59
    Intermediate,
    /// 60-99
    Advanced,
    /// 100-149
    Expert,
    /// 150-199
    Master,
}

impl LevelTier {
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=29 => LevelTier::Beginner,
            30..=59 => LevelTier::Intermediate,
            60..=99 => LevelTier::Advanced,
            100..=149 => LevelTier::Expert,
            _ => LevelTier::Master,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelTier::Beginner => "beginner",
            LevelTier::Intermediate => "intermediate",
            LevelTier::Advanced => "advanced",
            LevelTier::Expert => "expert",
            LevelTier::Master => "master",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(LevelTier::Beginner),
            "intermediate" => Some(LevelTier::Intermediate),
            "advanced" => Some(LevelTier::Advanced),
            "expert" => Some(LevelTier::Expert),
            "master" => Some(LevelTier::Master),
            _ => None,
        }
    }
}

impl fmt::Display for LevelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
