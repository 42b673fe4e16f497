//! Suggestion lifecycle: `pending -> accepted | dismissed`.
//!
//! Scans, responses and manual assessments for one user run under that
//! user's lock, so a detection and an acceptance never interleave on the same
//! habits. The lock only covers one process: accepting relies on
//! [`SuggestionStore::accept`] to move the suggestion off `pending` and patch
//! the habit in one store transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::detector::CandidateDetector;
use super::{LevelSuggestion, SuggestionStatus, SuggestionType};
use crate::error::{Degradation, Result, ValidationError};
use crate::formula::{LevelTier, MAX_LEVEL};
use crate::habit::{Habit, HabitPatch};
use crate::history::{EntityType, HistoryReason, HistoryRecorder, LevelHistoryEntry};
use crate::locks::KeyedLocks;
use crate::storage::{AcceptWrite, HabitStore, RetryPolicy, SuggestionStore};

/// A user's answer to a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Accept,
    Dismiss,
}

/// Result of answering a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondOutcome {
    pub suggestion: LevelSuggestion,
    /// The habit after the patch; `None` when dismissed.
    pub habit: Option<Habit>,
    /// Other pending suggestions for the habit that were dismissed by this acceptance.
    pub superseded: Vec<String>,
    pub degraded: Vec<Degradation>,
}

/// Result of a manual assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessOutcome {
    pub habit: Habit,
    pub old_level: Option<i32>,
    /// Pending suggestions for the habit that were dismissed as stale.
    pub superseded: Vec<String>,
    pub degraded: Vec<Degradation>,
}

/// Drives suggestions from detection to a terminal state.
pub struct SuggestionLifecycle {
    detector: CandidateDetector,
    habits: Arc<dyn HabitStore>,
    suggestions: Arc<dyn SuggestionStore>,
    history: HistoryRecorder,
    locks: KeyedLocks,
    retry: RetryPolicy,
}

impl SuggestionLifecycle {
    pub fn new(
        detector: CandidateDetector,
        habits: Arc<dyn HabitStore>,
        suggestions: Arc<dyn SuggestionStore>,
        history: HistoryRecorder,
    ) -> Self {
        let retry = RetryPolicy::from_config(&detector.config().retry);
        Self {
            detector,
            habits,
            suggestions,
            history,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    pub fn detector(&self) -> &CandidateDetector {
        &self.detector
    }

    /// Detect candidates for `user_id` and persist them as pending.
    ///
    /// Habits that already have a pending suggestion of the same type are
    /// skipped. Level-ups come first, then level-downs.
    pub fn scan(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<LevelSuggestion>> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId.into());
        }

        self.locks.with_lock(user_id, || {
            let mut candidates = self.detector.detect_level_up_candidates(user_id, now)?;
            let downs = self.detector.detect_level_down_candidates(user_id, now)?;
            for down in &downs {
                if candidates.iter().any(|up| up.habit_id == down.habit_id) {
                    tracing::warn!(
                        "habit {} qualifies for both level up and level down",
                        down.habit_id
                    );
                }
            }
            candidates.extend(downs);

            let mut created = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let exists = self.retry.run("pending lookup", || {
                    self.suggestions
                        .has_pending(&candidate.habit_id, candidate.suggestion_type)
                })?;
                if exists {
                    continue;
                }
                self.retry
                    .run("suggestion insert", || self.suggestions.insert(&candidate))?;
                tracing::info!(
                    "suggested {} for habit {} ({} -> {})",
                    candidate.suggestion_type.as_str(),
                    candidate.habit_id,
                    candidate.current_level,
                    candidate.target_level
                );
                created.push(candidate);
            }
            Ok(created)
        })
    }

    /// Pending suggestions for `user_id`, newest first.
    pub fn pending(&self, user_id: &str) -> Result<Vec<LevelSuggestion>> {
        Ok(self.retry.run("pending list", || {
            self.suggestions.list_pending_for_user(user_id)
        })?)
    }

    /// Answer a pending suggestion.
    pub fn respond(&self, suggestion_id: &str, response: Response) -> Result<RespondOutcome> {
        self.respond_at(suggestion_id, response, Utc::now())
    }

    /// [`SuggestionLifecycle::respond`] with an explicit timestamp.
    pub fn respond_at(
        &self,
        suggestion_id: &str,
        response: Response,
        now: DateTime<Utc>,
    ) -> Result<RespondOutcome> {
        let user_id = self.load_pending(suggestion_id)?.user_id;

        self.locks.with_lock(&user_id, || {
            // Re-read under the lock: another response may have landed meanwhile.
            let suggestion = self.load_pending(suggestion_id)?;
            match response {
                Response::Dismiss => self.dismiss(suggestion, now),
                Response::Accept => self.accept(suggestion, now),
            }
        })
    }

    fn load_pending(&self, suggestion_id: &str) -> Result<LevelSuggestion> {
        let suggestion = self
            .retry
            .run("suggestion read", || self.suggestions.get(suggestion_id))?
            .ok_or_else(|| ValidationError::UnknownSuggestion(suggestion_id.to_string()))?;
        if suggestion.status.is_terminal() {
            return Err(ValidationError::SuggestionNotPending {
                id: suggestion.id,
                status: suggestion.status,
            }
            .into());
        }
        Ok(suggestion)
    }

    fn transition(
        &self,
        suggestion: &mut LevelSuggestion,
        status: SuggestionStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.retry.run("suggestion transition", || {
            self.suggestions.transition(&suggestion.id, status, now)
        })?;
        if !changed {
            // Lost a race with another responder.
            let current = self
                .retry
                .run("suggestion read", || self.suggestions.get(&suggestion.id))?
                .map_or(SuggestionStatus::Dismissed, |s| s.status);
            return Err(ValidationError::SuggestionNotPending {
                id: suggestion.id.clone(),
                status: current,
            }
            .into());
        }
        suggestion.status = status;
        suggestion.responded_at = Some(now);
        Ok(())
    }

    fn dismiss(&self, mut suggestion: LevelSuggestion, now: DateTime<Utc>) -> Result<RespondOutcome> {
        self.transition(&mut suggestion, SuggestionStatus::Dismissed, now)?;
        tracing::info!("dismissed suggestion {}", suggestion.id);
        Ok(RespondOutcome {
            suggestion,
            habit: None,
            superseded: Vec::new(),
            degraded: Vec::new(),
        })
    }

    fn accept(&self, mut suggestion: LevelSuggestion, now: DateTime<Utc>) -> Result<RespondOutcome> {
        let snapshot = self
            .retry
            .run("habit read", || self.habits.get_by_id(&suggestion.habit_id))?
            .ok_or_else(|| ValidationError::UnknownHabit(suggestion.habit_id.clone()))?;

        if suggestion.suggestion_type == SuggestionType::LevelUp
            && self.detector.config().suggestions.revalidate_cooldown_on_accept
        {
            if let Some(days) = self.detector.days_since_last_change(&snapshot.id, now)? {
                let cooldown_days = self.detector.config().level_up.cooldown_days;
                if days < cooldown_days {
                    return Err(ValidationError::CooldownActive {
                        habit_id: snapshot.id.clone(),
                        days_since_change: days,
                        cooldown_days,
                    }
                    .into());
                }
            }
        }

        if snapshot.level != Some(suggestion.current_level) {
            tracing::warn!(
                "habit {} changed level since detection ({:?} vs {})",
                snapshot.id,
                snapshot.level,
                suggestion.current_level
            );
        }

        let patch = build_patch(&suggestion, now);
        let write = self.retry.run("suggestion accept", || {
            self.suggestions
                .accept(&suggestion.id, &snapshot.id, &patch, now)
        })?;
        let habit = match write {
            AcceptWrite::Applied(habit) => habit,
            // Lost a race with another responder, possibly in another process.
            AcceptWrite::NotPending(Some(status)) => {
                return Err(ValidationError::SuggestionNotPending {
                    id: suggestion.id,
                    status,
                }
                .into())
            }
            AcceptWrite::NotPending(None) => {
                return Err(ValidationError::UnknownSuggestion(suggestion.id).into())
            }
            AcceptWrite::HabitMissing => {
                return Err(ValidationError::UnknownHabit(snapshot.id).into())
            }
        };
        suggestion.status = SuggestionStatus::Accepted;
        suggestion.responded_at = Some(now);

        let mut degraded = Vec::new();
        let superseded = self.dismiss_stale(
            &suggestion.user_id,
            &suggestion.habit_id,
            Some(suggestion.id.as_str()),
            now,
            &mut degraded,
        );

        let entry = LevelHistoryEntry::new(
            EntityType::Habit,
            &snapshot.id,
            snapshot.level,
            suggestion.target_level,
            suggestion.proposed_changes.history_reason(),
            now,
        )
        .with_workload_delta(suggestion.proposed_changes.workload().clone());
        if let Some(d) = self.history.record_lenient(&entry) {
            degraded.push(d);
        }

        tracing::info!(
            "accepted suggestion {}: habit {} level {:?} -> {}",
            suggestion.id,
            habit.id,
            snapshot.level,
            suggestion.target_level
        );

        Ok(RespondOutcome {
            suggestion,
            habit: Some(habit),
            superseded,
            degraded,
        })
    }

    /// Set a habit's level by hand, outside the suggestion flow.
    ///
    /// The first level a habit gets is recorded as `initial_assessment`, any
    /// later one as `re_assessment`. Pending suggestions for the habit were
    /// computed against the old level and are dismissed.
    pub fn assess(&self, habit_id: &str, level: i32, now: DateTime<Utc>) -> Result<AssessOutcome> {
        if !(0..=MAX_LEVEL).contains(&level) {
            return Err(ValidationError::InvalidValue {
                field: "level".to_string(),
                message: format!("level must be between 0 and {MAX_LEVEL}, got {level}"),
            }
            .into());
        }
        let user_id = self.load_habit(habit_id)?.user_id;

        self.locks.with_lock(&user_id, || {
            let snapshot = self.load_habit(habit_id)?;
            let patch = HabitPatch {
                level: Some(level),
                level_tier: Some(LevelTier::from_level(level)),
                last_assessed_at: Some(now),
                ..Default::default()
            };
            let habit = self
                .retry
                .run("habit update", || self.habits.update(habit_id, &patch))?
                .ok_or_else(|| ValidationError::UnknownHabit(habit_id.to_string()))?;

            let mut degraded = Vec::new();
            let superseded = self.dismiss_stale(&habit.user_id, habit_id, None, now, &mut degraded);

            let reason = if snapshot.level.is_some() {
                HistoryReason::ReAssessment
            } else {
                HistoryReason::InitialAssessment
            };
            let entry =
                LevelHistoryEntry::new(EntityType::Habit, habit_id, snapshot.level, level, reason, now);
            if let Some(d) = self.history.record_lenient(&entry) {
                degraded.push(d);
            }

            tracing::info!(
                "assessed habit {}: level {:?} -> {} ({})",
                habit_id,
                snapshot.level,
                level,
                reason
            );
            Ok(AssessOutcome {
                habit,
                old_level: snapshot.level,
                superseded,
                degraded,
            })
        })
    }

    fn load_habit(&self, habit_id: &str) -> Result<Habit> {
        Ok(self
            .retry
            .run("habit read", || self.habits.get_by_id(habit_id))?
            .ok_or_else(|| ValidationError::UnknownHabit(habit_id.to_string()))?)
    }

    /// Dismiss the pending suggestions of `habit_id`, except `keep`.
    fn dismiss_stale(
        &self,
        user_id: &str,
        habit_id: &str,
        keep: Option<&str>,
        now: DateTime<Utc>,
        degraded: &mut Vec<Degradation>,
    ) -> Vec<String> {
        let pending = match self
            .retry
            .run("pending list", || self.suggestions.list_pending_for_user(user_id))
        {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("failed to list pending suggestions for {}: {}", habit_id, e);
                degraded.push(Degradation::SupersedeFailed {
                    habit_id: habit_id.to_string(),
                    reason: e.to_string(),
                });
                return Vec::new();
            }
        };

        let mut superseded = Vec::new();
        for other in pending
            .into_iter()
            .filter(|s| s.habit_id == habit_id && Some(s.id.as_str()) != keep)
        {
            match self.retry.run("suggestion transition", || {
                self.suggestions
                    .transition(&other.id, SuggestionStatus::Dismissed, now)
            }) {
                Ok(true) => superseded.push(other.id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("failed to supersede suggestion {}: {}", other.id, e);
                    degraded.push(Degradation::SupersedeFailed {
                        habit_id: habit_id.to_string(),
                        reason: format!("suggestion {}: {}", other.id, e),
                    });
                }
            }
        }
        superseded
    }
}

/// Habit changes implied by accepting `suggestion`.
fn build_patch(suggestion: &LevelSuggestion, now: DateTime<Utc>) -> HabitPatch {
    let changes = suggestion.proposed_changes.workload();
    HabitPatch {
        name: suggestion
            .proposed_changes
            .simplified_name()
            .map(str::to_string),
        level: Some(suggestion.target_level),
        level_tier: Some(LevelTier::from_level(suggestion.target_level)),
        last_assessed_at: Some(now),
        workload_per_count: changes.workload_per_count.as_ref().map(|c| c.new),
        duration_minutes: changes.duration.map(|c| c.new),
        frequency: changes.frequency.map(|c| c.new),
        target_count: changes.target_count.map(|c| c.new),
    }
}
