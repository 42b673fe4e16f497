//! Habit level suggestions.
//!
//! A scan ([`detector`]) finds habits whose completion rate says the
//! difficulty is off, the [`planner`] proposes concrete workload changes,
//! and the [`lifecycle`] takes each suggestion from pending to accepted or
//! dismissed.

pub mod detector;
pub mod lifecycle;
pub mod planner;

pub use detector::{completion_rate, CandidateDetector};
pub use lifecycle::{AssessOutcome, RespondOutcome, Response, SuggestionLifecycle};
pub use planner::BabyStepPlanner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::habit::Frequency;
use crate::history::HistoryReason;

/// Direction of a suggested level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    LevelUp,
    LevelDown,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::LevelUp => "level_up",
            SuggestionType::LevelDown => "level_down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "level_up" => Some(SuggestionType::LevelUp),
            "level_down" => Some(SuggestionType::LevelDown),
            _ => None,
        }
    }
}

/// Lifecycle state. Accepted and dismissed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SuggestionStatus::Pending),
            "accepted" => Some(SuggestionStatus::Accepted),
            "dismissed" => Some(SuggestionStatus::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of one numeric workload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadChange {
    pub old: f64,
    pub new: f64,
    /// Signed: positive for increases.
    pub change_percent: i64,
}

/// Old and new value of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

/// Proposed workload delta. Fields the habit does not have are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_per_count: Option<WorkloadChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<ValueChange<Frequency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<ValueChange<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_count: Option<ValueChange<u32>>,
}

impl WorkloadChanges {
    pub fn is_empty(&self) -> bool {
        self.workload_per_count.is_none()
            && self.frequency.is_none()
            && self.duration.is_none()
            && self.target_count.is_none()
    }
}

/// Level-down remediation: a lighter workload plus a simpler name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BabyStepPlan {
    #[serde(flatten)]
    pub changes: WorkloadChanges,
    pub target_level: i32,
    pub simplified_name: String,
}

impl BabyStepPlan {
    /// History reason for accepting this plan.
    pub fn history_reason(&self) -> HistoryReason {
        if self.target_level <= 10 {
            HistoryReason::LevelDownBabyStepLv10
        } else {
            HistoryReason::LevelDownBabyStepLv50
        }
    }
}

/// What accepting a suggestion would change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedChanges {
    Increase(WorkloadChanges),
    BabyStep(BabyStepPlan),
}

impl ProposedChanges {
    pub fn workload(&self) -> &WorkloadChanges {
        match self {
            ProposedChanges::Increase(changes) => changes,
            ProposedChanges::BabyStep(plan) => &plan.changes,
        }
    }

    pub fn simplified_name(&self) -> Option<&str> {
        match self {
            ProposedChanges::Increase(_) => None,
            ProposedChanges::BabyStep(plan) => Some(&plan.simplified_name),
        }
    }

    pub fn history_reason(&self) -> HistoryReason {
        match self {
            ProposedChanges::Increase(_) => HistoryReason::LevelUpProgression,
            ProposedChanges::BabyStep(plan) => plan.history_reason(),
        }
    }
}

/// A reviewable proposal to change a habit's level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSuggestion {
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub habit_name: String,
    pub suggestion_type: SuggestionType,
    pub current_level: i32,
    pub target_level: i32,
    pub proposed_changes: ProposedChanges,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
    pub status: SuggestionStatus,
    pub responded_at: Option<DateTime<Utc>>,
}
