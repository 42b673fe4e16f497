//! Integration tests for level suggestions.
//!
//! Covers detection against real completion logs, the accept and dismiss
//! paths, competing suggestions for one habit and cooldown handling.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use levelup_core::error::StoreError;
use levelup_core::storage::{AcceptWrite, HabitStore, HistoryStore, SuggestionStore};
use levelup_core::{
    Collaborators, CoreError, EntityType, Frequency, Habit, HabitPatch, HistoryQuery,
    HistoryReason, LevelHistoryEntry, LevelSuggestion, LevelTier, LevelingConfig, LevelingDb,
    LevelingEngine, ProposedChanges, Response, SuggestionStatus, SuggestionType, ValidationError,
};

/// Suggestion store where another process dismisses the suggestion right
/// before this one's accept reaches the database.
struct DismissedElsewhere {
    db: Arc<LevelingDb>,
}

impl SuggestionStore for DismissedElsewhere {
    fn insert(&self, suggestion: &LevelSuggestion) -> Result<(), StoreError> {
        self.db.insert(suggestion)
    }

    fn get(&self, id: &str) -> Result<Option<LevelSuggestion>, StoreError> {
        SuggestionStore::get(self.db.as_ref(), id)
    }

    fn transition(
        &self,
        id: &str,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.db.transition(id, status, at)
    }

    fn accept(
        &self,
        id: &str,
        habit_id: &str,
        patch: &HabitPatch,
        at: DateTime<Utc>,
    ) -> Result<AcceptWrite, StoreError> {
        self.db.transition(id, SuggestionStatus::Dismissed, at)?;
        self.db.accept(id, habit_id, patch, at)
    }

    fn list_pending_for_user(&self, user_id: &str) -> Result<Vec<LevelSuggestion>, StoreError> {
        self.db.list_pending_for_user(user_id)
    }

    fn has_pending(
        &self,
        habit_id: &str,
        suggestion_type: SuggestionType,
    ) -> Result<bool, StoreError> {
        self.db.has_pending(habit_id, suggestion_type)
    }
}

struct Fixture {
    db: Arc<LevelingDb>,
    engine: LevelingEngine,
    now: DateTime<Utc>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(LevelingConfig::default())
    }

    fn with_config(config: LevelingConfig) -> Self {
        let db = Arc::new(LevelingDb::open_memory().unwrap());
        let engine = LevelingEngine::with_database(db.clone(), config);
        Self {
            db,
            engine,
            // Storage keeps microseconds; whole seconds compare cleanly.
            now: Utc::now().trunc_subsecs(0),
        }
    }

    fn habit(&self, name: &str, level: i32, age_days: i64) -> Habit {
        let mut habit = Habit::new("alice", name);
        habit.level = Some(level);
        habit.level_tier = Some(LevelTier::from_level(level));
        habit.created_at = self.now - Duration::days(age_days);
        habit
    }

    fn insert(&self, habit: &Habit) {
        self.db.insert_habit(habit).unwrap();
    }

    /// One completion per day for the last `days` days.
    fn complete_daily(&self, habit: &Habit, days: i64) {
        for day in 0..days {
            self.db
                .record_completion(&habit.id, self.now - Duration::days(day) - Duration::hours(1))
                .unwrap();
        }
    }

    fn scan(&self) -> Vec<levelup_core::LevelSuggestion> {
        self.engine.suggestions().scan("alice", self.now).unwrap()
    }

    fn respond(
        &self,
        id: &str,
        response: Response,
    ) -> levelup_core::error::Result<levelup_core::RespondOutcome> {
        self.engine.suggestions().respond_at(id, response, self.now)
    }
}

#[test]
fn test_consistent_habit_gets_level_up_suggestion() {
    let f = Fixture::new();
    let mut habit = f.habit("Pushups", 50, 60);
    habit.workload_per_count = Some(20.0);
    habit.workload_unit = Some("reps".into());
    f.insert(&habit);
    f.complete_daily(&habit, 28);

    let created = f.scan();
    assert_eq!(created.len(), 1);
    let suggestion = &created[0];
    assert_eq!(suggestion.suggestion_type, SuggestionType::LevelUp);
    assert_eq!(suggestion.current_level, 50);
    assert_eq!(suggestion.target_level, 65);
    assert_eq!(suggestion.status, SuggestionStatus::Pending);

    let workload = suggestion
        .proposed_changes
        .workload()
        .workload_per_count
        .clone()
        .unwrap();
    assert_eq!(workload.new, 26.0);
    assert_eq!(workload.change_percent, 30);

    let pending = f.engine.pending_suggestions("alice").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, suggestion.id);
}

#[test]
fn test_struggling_habit_gets_baby_step() {
    let f = Fixture::new();
    let mut habit = f.habit("Meditate", 40, 30);
    habit.duration_minutes = Some(30);
    f.insert(&habit);
    f.complete_daily(&habit, 3);

    let created = f.scan();
    assert_eq!(created.len(), 1);
    let suggestion = &created[0];
    assert_eq!(suggestion.suggestion_type, SuggestionType::LevelDown);
    assert_eq!(suggestion.target_level, 20);
    match &suggestion.proposed_changes {
        ProposedChanges::BabyStep(plan) => {
            assert_eq!(plan.simplified_name, "Meditate (baby step)");
            assert_eq!(plan.changes.duration.unwrap().new, 15);
        }
        other => panic!("expected a baby step, got {other:?}"),
    }
}

#[test]
fn test_young_habit_is_not_leveled_down() {
    let f = Fixture::new();
    let habit = f.habit("Journal", 40, 5);
    f.insert(&habit);

    assert!(f.scan().is_empty());
}

#[test]
fn test_middling_rate_yields_nothing() {
    let f = Fixture::new();
    let habit = f.habit("Stretch", 40, 60);
    f.insert(&habit);
    // 20 of 30 days is below the level-up bar; every one of the last 14 days is above the level-down bar
    f.complete_daily(&habit, 20);

    assert!(f.scan().is_empty());
}

#[test]
fn test_unassessed_and_inactive_habits_are_ignored() {
    let f = Fixture::new();
    let mut unassessed = f.habit("New habit", 0, 60);
    unassessed.level = None;
    let mut inactive = f.habit("Paused", 50, 60);
    inactive.active = false;
    for habit in [&unassessed, &inactive] {
        f.insert(habit);
        f.complete_daily(habit, 30);
    }

    assert!(f.scan().is_empty());
}

#[test]
fn test_weekly_habit_rate_uses_expected_completions() {
    let f = Fixture::new();
    let mut habit = f.habit("Long run", 50, 60);
    habit.frequency = Frequency::Weekly;
    f.insert(&habit);
    // 30 days expect 4 weekly completions
    for week in 0..4 {
        f.db
            .record_completion(&habit.id, f.now - Duration::days(week * 7 + 1))
            .unwrap();
    }

    let created = f.scan();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].suggestion_type, SuggestionType::LevelUp);
    // No workload fields: frequency steps up instead
    let changes = created[0].proposed_changes.workload();
    assert_eq!(changes.frequency.unwrap().new, Frequency::Daily);
}

#[test]
fn test_recent_level_change_blocks_level_up() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    f.db.append(&LevelHistoryEntry::new(
        EntityType::Habit,
        &habit.id,
        Some(35),
        50,
        HistoryReason::LevelUpProgression,
        f.now - Duration::days(10),
    ))
    .unwrap();

    assert!(f.scan().is_empty());
}

#[test]
fn test_rescan_does_not_duplicate_pending() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);

    assert_eq!(f.scan().len(), 1);
    assert!(f.scan().is_empty());
    assert_eq!(f.engine.pending_suggestions("alice").unwrap().len(), 1);
}

#[test]
fn test_accept_level_up_patches_habit_and_records_history() {
    let f = Fixture::new();
    let mut habit = f.habit("Pushups", 50, 60);
    habit.workload_per_count = Some(20.0);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    let outcome = f.respond(&suggestion.id, Response::Accept).unwrap();
    assert_eq!(outcome.suggestion.status, SuggestionStatus::Accepted);
    assert!(outcome.degraded.is_empty());

    let updated = f.db.get_by_id(&habit.id).unwrap().unwrap();
    assert_eq!(updated.level, Some(65));
    assert_eq!(updated.level_tier, Some(LevelTier::Advanced));
    assert_eq!(updated.workload_per_count, Some(26.0));
    assert_eq!(updated.name, "Pushups");
    assert!(updated.last_assessed_at.is_some());
    assert_eq!(outcome.habit, Some(updated));

    let history = f
        .engine
        .history(&HistoryQuery::for_entity(EntityType::Habit, &habit.id))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_level, Some(50));
    assert_eq!(history[0].new_level, 65);
    assert_eq!(history[0].reason, HistoryReason::LevelUpProgression);
    let delta = history[0].workload_delta.clone().unwrap();
    assert_eq!(delta.workload_per_count.unwrap().new, 26.0);

    // The accepted change starts a cooldown.
    assert!(f.scan().is_empty());
    assert!(f.engine.pending_suggestions("alice").unwrap().is_empty());
}

#[test]
fn test_accept_baby_step_renames_habit() {
    let f = Fixture::new();
    let mut habit = f.habit("Meditate", 16, 30);
    habit.duration_minutes = Some(20);
    f.insert(&habit);

    let suggestion = f.scan().remove(0);
    assert_eq!(suggestion.target_level, 8);
    f.respond(&suggestion.id, Response::Accept).unwrap();

    let updated = f.db.get_by_id(&habit.id).unwrap().unwrap();
    assert_eq!(updated.name, "Meditate (first step)");
    assert_eq!(updated.level, Some(8));
    assert_eq!(updated.duration_minutes, Some(10));

    let history = f
        .engine
        .history(&HistoryQuery::for_entity(EntityType::Habit, &habit.id))
        .unwrap();
    assert_eq!(history[0].reason, HistoryReason::LevelDownBabyStepLv10);
}

#[test]
fn test_dismiss_leaves_habit_untouched() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    let outcome = f.respond(&suggestion.id, Response::Dismiss).unwrap();
    assert_eq!(outcome.suggestion.status, SuggestionStatus::Dismissed);
    assert!(outcome.suggestion.responded_at.is_some());
    assert!(outcome.habit.is_none());

    assert_eq!(f.db.get_by_id(&habit.id).unwrap().unwrap().level, Some(50));
    assert!(f
        .engine
        .history(&HistoryQuery::for_entity(EntityType::Habit, &habit.id))
        .unwrap()
        .is_empty());
}

#[test]
fn test_second_response_is_rejected() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    f.respond(&suggestion.id, Response::Accept).unwrap();
    let err = f.respond(&suggestion.id, Response::Accept).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::SuggestionNotPending {
            status: SuggestionStatus::Accepted,
            ..
        })
    ));
    assert_eq!(f.db.get_by_id(&habit.id).unwrap().unwrap().level, Some(65));

    let err = f.respond("missing", Response::Dismiss).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnknownSuggestion(_))
    ));
}

#[test]
fn test_accepting_one_suggestion_supersedes_the_other() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let up = f.scan().remove(0);

    let mut down = up.clone();
    down.id = "competing".into();
    down.suggestion_type = SuggestionType::LevelDown;
    down.target_level = 25;
    f.db.insert(&down).unwrap();

    let outcome = f.respond(&up.id, Response::Accept).unwrap();
    assert_eq!(outcome.superseded, vec!["competing".to_string()]);
    let stored = SuggestionStore::get(f.db.as_ref(), "competing").unwrap().unwrap();
    assert_eq!(stored.status, SuggestionStatus::Dismissed);
}

#[test]
fn test_cooldown_rechecked_on_accept_when_enabled() {
    let mut config = LevelingConfig::default();
    config.suggestions.revalidate_cooldown_on_accept = true;
    let f = Fixture::with_config(config);
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    // A level change lands between detection and acceptance.
    f.db.append(&LevelHistoryEntry::new(
        EntityType::Habit,
        &habit.id,
        Some(50),
        50,
        HistoryReason::ReAssessment,
        f.now - Duration::days(1),
    ))
    .unwrap();

    let err = f.respond(&suggestion.id, Response::Accept).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::CooldownActive { .. })
    ));
    let stored = SuggestionStore::get(f.db.as_ref(), &suggestion.id).unwrap().unwrap();
    assert_eq!(stored.status, SuggestionStatus::Pending);
}

#[test]
fn test_accept_losing_to_another_responder_changes_nothing() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    let mut collaborators = Collaborators::from_database(f.db.clone());
    collaborators.suggestions = Arc::new(DismissedElsewhere { db: f.db.clone() });
    let engine = LevelingEngine::new(collaborators, LevelingConfig::default());

    let err = engine
        .suggestions()
        .respond_at(&suggestion.id, Response::Accept, f.now)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::SuggestionNotPending {
            status: SuggestionStatus::Dismissed,
            ..
        })
    ));

    let unchanged = f.db.get_by_id(&habit.id).unwrap().unwrap();
    assert_eq!(unchanged.level, Some(50));
    assert_eq!(unchanged.last_assessed_at, habit.last_assessed_at);
    assert!(f
        .engine
        .history(&HistoryQuery::for_entity(EntityType::Habit, &habit.id))
        .unwrap()
        .is_empty());
}

#[test]
fn test_manual_assessment_dismisses_stale_suggestions() {
    let f = Fixture::new();
    let habit = f.habit("Pushups", 50, 60);
    f.insert(&habit);
    f.complete_daily(&habit, 30);
    let suggestion = f.scan().remove(0);

    let outcome = f.engine.suggestions().assess(&habit.id, 40, f.now).unwrap();
    assert_eq!(outcome.old_level, Some(50));
    assert_eq!(outcome.habit.level, Some(40));
    assert_eq!(outcome.superseded, vec![suggestion.id.clone()]);
    assert!(outcome.degraded.is_empty());

    let stored = SuggestionStore::get(f.db.as_ref(), &suggestion.id).unwrap().unwrap();
    assert_eq!(stored.status, SuggestionStatus::Dismissed);

    let history = f
        .engine
        .history(&HistoryQuery::for_entity(EntityType::Habit, &habit.id))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, HistoryReason::ReAssessment);

    // The assessment counts as a level change for the cooldown.
    assert!(f.scan().is_empty());
}
