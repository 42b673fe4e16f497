//! Habit level state as seen by the leveling engine.
//!
//! Habits are owned by the host application; this core only reads them and,
//! when a suggestion is accepted, writes a [`HabitPatch`] back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::formula::LevelTier;

/// How often a habit is expected to be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Completions expected over a window of `days` days (at least 1).
    pub fn expected_completions(&self, days: i64) -> i64 {
        let expected = match self {
            Frequency::Daily => days,
            Frequency::Weekly => days / 7,
            Frequency::Monthly => days / 30,
        };
        expected.max(1)
    }

    /// One step more frequent, if there is one.
    pub fn escalate(&self) -> Option<Frequency> {
        match self {
            Frequency::Monthly => Some(Frequency::Weekly),
            Frequency::Weekly => Some(Frequency::Daily),
            Frequency::Daily => None,
        }
    }

    /// One step less frequent, if there is one.
    pub fn deescalate(&self) -> Option<Frequency> {
        match self {
            Frequency::Daily => Some(Frequency::Weekly),
            Frequency::Weekly => Some(Frequency::Monthly),
            Frequency::Monthly => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A habit together with its level and workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub active: bool,
    /// `None` until the habit has been assessed.
    pub level: Option<i32>,
    pub level_tier: Option<LevelTier>,
    /// Effort per completion (e.g. 20 pushups, 2.5 km).
    pub workload_per_count: Option<f64>,
    pub workload_unit: Option<String>,
    pub duration_minutes: Option<u32>,
    pub frequency: Frequency,
    pub target_count: u32,
    /// Occupation domains this habit accrues expertise in.
    pub domain_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_assessed_at: Option<DateTime<Utc>>,
}

impl Habit {
    /// A new, unassessed daily habit.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            active: true,
            level: None,
            level_tier: None,
            workload_per_count: None,
            workload_unit: None,
            duration_minutes: None,
            frequency: Frequency::Daily,
            target_count: 1,
            domain_codes: Vec::new(),
            created_at: Utc::now(),
            last_assessed_at: None,
        }
    }

    /// Whole days since the habit was created.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

/// Partial update applied to a habit. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub level: Option<i32>,
    pub level_tier: Option<LevelTier>,
    pub last_assessed_at: Option<DateTime<Utc>>,
    pub workload_per_count: Option<f64>,
    pub duration_minutes: Option<u32>,
    pub frequency: Option<Frequency>,
    pub target_count: Option<u32>,
}

impl HabitPatch {
    /// Apply this patch to an in-memory habit.
    pub fn apply_to(&self, habit: &mut Habit) {
        if let Some(name) = &self.name {
            habit.name = name.clone();
        }
        if let Some(level) = self.level {
            habit.level = Some(level);
        }
        if let Some(tier) = self.level_tier {
            habit.level_tier = Some(tier);
        }
        if let Some(at) = self.last_assessed_at {
            habit.last_assessed_at = Some(at);
        }
        if let Some(workload) = self.workload_per_count {
            habit.workload_per_count = Some(workload);
        }
        if let Some(duration) = self.duration_minutes {
            habit.duration_minutes = Some(duration);
        }
        if let Some(frequency) = self.frequency {
            habit.frequency = frequency;
        }
        if let Some(target) = self.target_count {
            habit.target_count = target;
        }
    }
}
