//! Level-up and level-down candidate detection.
//!
//! Two independent gates run over a user's active, assessed habits:
//!
//! - **level up**: completion rate over the last 30 days >= 0.9 and at least
//!   30 days since the habit's last recorded level change (no history counts
//!   as infinitely long ago). Target is the current level + 15, capped at 199.
//! - **level down**: completion rate over the last 14 days < 0.5 and the habit
//!   is at least 14 days old. Target is half the current level, floored.
//!
//! Thresholds come from [`LevelingConfig`]. Detection is read-only.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::planner::BabyStepPlanner;
use super::{LevelSuggestion, ProposedChanges, SuggestionStatus, SuggestionType};
use crate::error::Result;
use crate::formula::MAX_LEVEL;
use crate::habit::Habit;
use crate::history::{EntityType, HistoryRecorder};
use crate::storage::{ActivityStore, HabitStore, LevelingConfig, RetryPolicy};

/// Fraction of expected completions achieved in `[start, end]`, capped at 1.0.
pub fn completion_rate(
    activities: &dyn ActivityStore,
    habit: &Habit,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<f64> {
    let completed = activities.count_completions_in_range(&habit.id, start, end)?;
    Ok(rate(completed, habit, (end - start).num_days()))
}

fn rate(completed: u32, habit: &Habit, window_days: i64) -> f64 {
    let expected = habit.frequency.expected_completions(window_days);
    (completed as f64 / expected as f64).min(1.0)
}

/// Scans habits for level-change candidates.
pub struct CandidateDetector {
    habits: Arc<dyn HabitStore>,
    activities: Arc<dyn ActivityStore>,
    history: HistoryRecorder,
    planner: BabyStepPlanner,
    config: LevelingConfig,
    retry: RetryPolicy,
}

impl CandidateDetector {
    pub fn new(
        habits: Arc<dyn HabitStore>,
        activities: Arc<dyn ActivityStore>,
        history: HistoryRecorder,
        config: LevelingConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            habits,
            activities,
            history,
            planner: BabyStepPlanner::new(),
            config,
            retry,
        }
    }

    pub fn config(&self) -> &LevelingConfig {
        &self.config
    }

    /// Completion rate of `habit` over the `window_days` days ending at `now`.
    pub fn rate_over(&self, habit: &Habit, window_days: i64, now: DateTime<Utc>) -> Result<f64> {
        let start = now - Duration::days(window_days);
        let completed = self.retry.run("completion count", || {
            self.activities
                .count_completions_in_range(&habit.id, start, now)
        })?;
        Ok(rate(completed, habit, window_days))
    }

    /// Whole days since the habit's last recorded level change, or `None`
    /// if it never changed.
    pub fn days_since_last_change(&self, habit_id: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        Ok(self
            .history
            .last_change_for(EntityType::Habit, habit_id)?
            .map(|entry| (now - entry.assessed_at).num_days()))
    }

    /// Whether the level-up cooldown has elapsed for `habit_id`.
    pub fn cooldown_elapsed(&self, habit_id: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .days_since_last_change(habit_id, now)?
            .map_or(true, |days| days >= self.config.level_up.cooldown_days))
    }

    /// Habits ready for more difficulty.
    pub fn detect_level_up_candidates(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LevelSuggestion>> {
        let cfg = &self.config.level_up;
        let mut suggestions = Vec::new();

        for habit in self.leveled_habits(user_id)? {
            let Some(current) = habit.level else { continue };
            let target = (current + cfg.level_step).min(MAX_LEVEL);
            if target <= current {
                continue;
            }

            let rate = self.rate_over(&habit, cfg.window_days, now)?;
            if rate < cfg.min_completion_rate {
                continue;
            }
            if !self.cooldown_elapsed(&habit.id, now)? {
                tracing::debug!("habit {} qualifies on rate but is in cooldown", habit.id);
                continue;
            }

            let changes = self.planner.plan_increase(&habit, current, target);
            let reason = format!(
                "Completed {:.0}% over the last {} days",
                rate * 100.0,
                cfg.window_days
            );
            suggestions.push(suggestion(
                &habit,
                SuggestionType::LevelUp,
                current,
                target,
                ProposedChanges::Increase(changes),
                reason,
                now,
            ));
        }

        Ok(suggestions)
    }

    /// Habits that need a baby step.
    pub fn detect_level_down_candidates(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LevelSuggestion>> {
        let cfg = &self.config.level_down;
        let mut suggestions = Vec::new();

        for habit in self.leveled_habits(user_id)? {
            let Some(current) = habit.level else { continue };
            let target = (current as f64 * cfg.level_factor).floor() as i32;
            if target >= current {
                continue;
            }
            if habit.age_days(now) < cfg.min_habit_age_days {
                continue;
            }

            let rate = self.rate_over(&habit, cfg.window_days, now)?;
            if rate >= cfg.max_completion_rate {
                continue;
            }

            let plan = self.planner.plan_decrease(&habit, current, target);
            let reason = format!(
                "Completed {:.0}% over the last {} days",
                rate * 100.0,
                cfg.window_days
            );
            suggestions.push(suggestion(
                &habit,
                SuggestionType::LevelDown,
                current,
                target,
                ProposedChanges::BabyStep(plan),
                reason,
                now,
            ));
        }

        Ok(suggestions)
    }

    fn leveled_habits(&self, user_id: &str) -> Result<Vec<Habit>> {
        let habits = self
            .retry
            .run("leveled habits", || self.habits.active_leveled_habits(user_id))?;
        Ok(habits
            .into_iter()
            .filter(|h| h.active && h.level.is_some())
            .collect())
    }
}

fn suggestion(
    habit: &Habit,
    suggestion_type: SuggestionType,
    current_level: i32,
    target_level: i32,
    proposed_changes: ProposedChanges,
    reason: String,
    now: DateTime<Utc>,
) -> LevelSuggestion {
    LevelSuggestion {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: habit.user_id.clone(),
        habit_id: habit.id.clone(),
        habit_name: habit.name.clone(),
        suggestion_type,
        current_level,
        target_level,
        proposed_changes,
        reason,
        detected_at: now,
        status: SuggestionStatus::Pending,
        responded_at: None,
    }
}
