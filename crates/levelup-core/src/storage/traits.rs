//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to a database directly; it is handed
//! implementations of these traits. [`super::LevelingDb`] implements all of
//! them on SQLite.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::expertise::{AwardWrite, ExpertiseRecord, PointsCredit, UserExperience};
use crate::habit::{Habit, HabitPatch};
use crate::history::{HistoryQuery, LevelHistoryEntry};
use crate::suggestion::{LevelSuggestion, SuggestionStatus, SuggestionType};

/// Result of [`SuggestionStore::accept`].
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptWrite {
    /// Both writes landed; carries the patched habit.
    Applied(Habit),
    /// The suggestion was not pending. Carries its current status, `None`
    /// when it does not exist.
    NotPending(Option<SuggestionStatus>),
    /// The habit is gone; the suggestion stays pending.
    HabitMissing,
}

/// Read and patch habits owned by the host application.
pub trait HabitStore: Send + Sync {
    fn get_by_id(&self, habit_id: &str) -> Result<Option<Habit>, StoreError>;

    /// Habits that are active and have been assessed (level set).
    fn active_leveled_habits(&self, user_id: &str) -> Result<Vec<Habit>, StoreError>;

    /// Apply `patch` and return the updated habit, or `None` if it does not exist.
    fn update(&self, habit_id: &str, patch: &HabitPatch) -> Result<Option<Habit>, StoreError>;
}

/// Completion activity log.
pub trait ActivityStore: Send + Sync {
    /// Completions of `habit_id` with `start <= completed_at <= end`.
    fn count_completions_in_range(
        &self,
        habit_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError>;
}

/// Maps domain codes to display names.
pub trait DomainNameResolver: Send + Sync {
    /// Names for the known codes; unknown codes are simply absent.
    fn resolve(
        &self,
        domain_codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>>;
}

impl DomainNameResolver for HashMap<String, String> {
    fn resolve(
        &self,
        domain_codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(domain_codes
            .iter()
            .filter_map(|code| self.get(code).map(|name| (code.clone(), name.clone())))
            .collect())
    }
}

/// Expertise ledger persistence.
pub trait ExpertiseStore: Send + Sync {
    fn get(&self, user_id: &str, domain_code: &str) -> Result<Option<ExpertiseRecord>, StoreError>;

    /// All records of a user, highest level first.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<ExpertiseRecord>, StoreError>;

    /// Credit every share of one award and bump the user's aggregate counter
    /// as a single unit: either all of it is written or none of it.
    ///
    /// Per share: add points, recompute level and tier from the new total,
    /// bump the habit count and activity time, creating the record if absent.
    /// The aggregate counter is created with defaults if absent.
    fn apply_award(
        &self,
        user_id: &str,
        credits: &[PointsCredit],
        total: i64,
        at: DateTime<Utc>,
    ) -> Result<AwardWrite, StoreError>;

    fn user_experience(&self, user_id: &str) -> Result<Option<UserExperience>, StoreError>;
}

/// Insert-only level history.
pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: &LevelHistoryEntry) -> Result<(), StoreError>;

    /// Matching entries, newest first.
    fn query(&self, query: &HistoryQuery) -> Result<Vec<LevelHistoryEntry>, StoreError>;
}

/// Suggestion persistence.
pub trait SuggestionStore: Send + Sync {
    fn insert(&self, suggestion: &LevelSuggestion) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<LevelSuggestion>, StoreError>;

    /// Move a pending suggestion to `status`. Returns false if it was not pending.
    fn transition(
        &self,
        id: &str,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Mark a pending suggestion accepted and apply `patch` to `habit_id` as
    /// a single unit. Nothing is written unless the suggestion was still
    /// pending and the habit exists.
    fn accept(
        &self,
        id: &str,
        habit_id: &str,
        patch: &HabitPatch,
        at: DateTime<Utc>,
    ) -> Result<AcceptWrite, StoreError>;

    /// Pending suggestions of a user, newest first.
    fn list_pending_for_user(&self, user_id: &str) -> Result<Vec<LevelSuggestion>, StoreError>;

    fn has_pending(
        &self,
        habit_id: &str,
        suggestion_type: SuggestionType,
    ) -> Result<bool, StoreError>;
}
