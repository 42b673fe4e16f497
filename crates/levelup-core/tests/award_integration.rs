//! Integration tests for the experience award workflow.
//!
//! Exercises the full path from a habit completion to the expertise ledger,
//! the user total and the domain level history, including degraded runs
//! where a side store fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};

use levelup_core::error::StoreError;
use levelup_core::history::domain_entity_id;
use levelup_core::expertise::{AwardWrite, PointsCredit};
use levelup_core::storage::{DomainNameResolver, ExpertiseStore, HistoryStore};
use levelup_core::{
    Collaborators, CoreError, Degradation, EntityType, ExpertiseRecord, Habit, HistoryQuery,
    HistoryReason, LevelHistoryEntry, LevelTier, LevelingConfig, LevelingDb, LevelingEngine,
    UserExperience, ValidationError,
};

fn seeded_db() -> (Arc<LevelingDb>, Habit) {
    let db = Arc::new(LevelingDb::open_memory().unwrap());
    db.upsert_domain("2411", "Accountants").unwrap();
    db.upsert_domain("2631", "Economists").unwrap();
    db.upsert_domain("2421", "Management analysts").unwrap();

    let mut habit = Habit::new("alice", "Reconcile ledgers");
    habit.level = Some(30);
    habit.domain_codes = vec!["2411".into(), "2631".into(), "2421".into()];
    db.insert_habit(&habit).unwrap();
    (db, habit)
}

struct FailingHistory;

impl HistoryStore for FailingHistory {
    fn append(&self, _entry: &LevelHistoryEntry) -> Result<(), StoreError> {
        Err(StoreError::QueryFailed("disk full".into()))
    }

    fn query(&self, _query: &HistoryQuery) -> Result<Vec<LevelHistoryEntry>, StoreError> {
        Ok(Vec::new())
    }
}

/// Expertise store whose first `failures` award writes fail outright.
struct FailingWrites {
    db: Arc<LevelingDb>,
    failures: AtomicUsize,
}

impl ExpertiseStore for FailingWrites {
    fn get(&self, user_id: &str, domain_code: &str) -> Result<Option<ExpertiseRecord>, StoreError> {
        ExpertiseStore::get(self.db.as_ref(), user_id, domain_code)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<ExpertiseRecord>, StoreError> {
        self.db.list_for_user(user_id)
    }

    fn apply_award(
        &self,
        user_id: &str,
        credits: &[PointsCredit],
        total: i64,
        at: DateTime<Utc>,
    ) -> Result<AwardWrite, StoreError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::QueryFailed("disk full".into()));
        }
        self.db.apply_award(user_id, credits, total, at)
    }

    fn user_experience(&self, user_id: &str) -> Result<Option<UserExperience>, StoreError> {
        self.db.user_experience(user_id)
    }
}

struct OfflineNames;

impl DomainNameResolver for OfflineNames {
    fn resolve(
        &self,
        _domain_codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
        Err("catalog offline".into())
    }
}

#[test]
fn test_award_splits_points_across_domains() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());

    let outcome = engine
        .award("alice", &habit.id, &habit.domain_codes, 100)
        .unwrap();

    assert_eq!(outcome.total_points_awarded, 100);
    assert!(!outcome.is_degraded());
    let points: Vec<i64> = outcome
        .domain_updates
        .iter()
        .map(|u| u.points_awarded)
        .collect();
    assert_eq!(points, vec![34, 33, 33]);
    assert_eq!(outcome.domain_updates[0].domain_name, "Accountants");

    // 34 points: 10 * log2(1.34) = 4.2, 33 points: 4.1
    assert_eq!(outcome.level_changes.len(), 3);
    assert!(outcome.level_changes.iter().all(|c| c.old_level == 0 && c.new_level == 4));

    let total = engine.user_experience("alice").unwrap().unwrap();
    assert_eq!(total.total_experience, 100);
    assert_eq!(total.awards_count, 1);
}

#[test]
fn test_repeated_awards_accumulate_and_level_up() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());
    let codes = vec!["2411".to_string()];

    engine.award("alice", &habit.id, &codes, 100).unwrap();
    let outcome = engine.award("alice", &habit.id, &codes, 200).unwrap();

    let update = &outcome.domain_updates[0];
    assert_eq!(update.experience_points, 300);
    assert_eq!(update.expertise_level, 20);
    assert_eq!(update.expertise_tier, LevelTier::Beginner);
    assert_eq!(outcome.level_changes[0].old_level, 10);

    let history = engine
        .history(&HistoryQuery::for_entity(
            EntityType::Domain,
            domain_entity_id("alice", "2411"),
        ))
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].old_level, Some(10));
    assert_eq!(history[0].new_level, 20);
    assert!(history.iter().all(|e| e.reason == HistoryReason::ExpertiseGain));
}

#[test]
fn test_award_without_level_change_writes_no_history() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());
    let codes = vec!["2411".to_string()];

    engine.award("alice", &habit.id, &codes, 100).unwrap();
    let outcome = engine.award("alice", &habit.id, &codes, 1).unwrap();
    assert!(outcome.level_changes.is_empty());

    let history = engine
        .history(&HistoryQuery::for_entity(EntityType::Domain, "alice:2411"))
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[test]
fn test_award_with_no_domains_credits_general() {
    let (db, mut habit) = seeded_db();
    habit.domain_codes.clear();
    db.insert_habit(&habit).unwrap();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());

    let outcome = engine.award_completion("alice", &habit.id, 5).unwrap();
    // Level 30 habit: 300 base + 10 streak bonus
    assert_eq!(outcome.total_points_awarded, 310);
    assert_eq!(outcome.domain_updates.len(), 1);
    assert_eq!(outcome.domain_updates[0].domain_code, "general");
    assert_eq!(outcome.domain_updates[0].domain_name, "General");

    let records = engine.expertise("alice").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].experience_points, 310);
}

#[test]
fn test_zero_experience_award_touches_activity_only() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());

    let outcome = engine
        .award("alice", &habit.id, &["2411".to_string()], 0)
        .unwrap();
    assert!(outcome.level_changes.is_empty());
    let records = engine.expertise("alice").unwrap();
    assert_eq!(records[0].experience_points, 0);
    assert_eq!(records[0].habit_count, 1);
}

#[test]
fn test_award_validation_rejects_before_writing() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());
    let codes = habit.domain_codes.clone();

    let err = engine.award("alice", &habit.id, &codes, -5).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::NegativeExperience(-5))
    ));

    let err = engine.award("", &habit.id, &codes, 10).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::EmptyUserId)));

    let err = engine.award("alice", "missing", &codes, 10).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnknownHabit(_))
    ));

    let err = engine.award("mallory", &habit.id, &codes, 10).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::HabitOwnership { .. })
    ));

    assert!(engine.expertise("alice").unwrap().is_empty());
    assert!(engine.user_experience("alice").unwrap().is_none());
}

#[test]
fn test_history_failure_degrades_but_keeps_points() {
    let (db, habit) = seeded_db();
    let mut collaborators = Collaborators::from_database(db);
    collaborators.history = Arc::new(FailingHistory);
    let engine = LevelingEngine::new(collaborators, LevelingConfig::default());

    let outcome = engine
        .award("alice", &habit.id, &["2411".to_string()], 300)
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(outcome.level_changes.len(), 1);
    assert!(matches!(
        &outcome.degraded[0],
        Degradation::HistoryNotRecorded { entity_id, .. } if entity_id == "alice:2411"
    ));
    assert_eq!(engine.expertise("alice").unwrap()[0].experience_points, 300);
}

#[test]
fn test_name_lookup_failure_falls_back_to_codes() {
    let (db, habit) = seeded_db();
    let mut collaborators = Collaborators::from_database(db);
    collaborators.domain_names = Arc::new(OfflineNames);
    let engine = LevelingEngine::new(collaborators, LevelingConfig::default());

    let outcome = engine
        .award("alice", &habit.id, &["2411".to_string()], 50)
        .unwrap();
    assert!(matches!(
        outcome.degraded.as_slice(),
        [Degradation::DomainNamesUnavailable { .. }]
    ));
    assert_eq!(outcome.domain_updates[0].domain_name, "2411");
}

#[test]
fn test_concurrent_awards_lose_no_points() {
    let (db, habit) = seeded_db();
    let engine = LevelingEngine::with_database(db, LevelingConfig::default());
    let codes = vec!["2411".to_string(), "2631".to_string()];

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..10 {
                    engine.award("alice", &habit.id, &codes, 10).unwrap();
                }
            });
        }
    });

    let records = engine.expertise("alice").unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.experience_points, 400);
        assert_eq!(record.habit_count, 80);
        assert_eq!(record.expertise_level, levelup_core::level_from_points(400));
    }
    let total = engine.user_experience("alice").unwrap().unwrap();
    assert_eq!(total.total_experience, 800);
    assert_eq!(total.awards_count, 80);
}

#[test]
fn test_failed_award_leaves_nothing_and_retries_cleanly() {
    let (db, habit) = seeded_db();
    let mut collaborators = Collaborators::from_database(db.clone());
    collaborators.expertise = Arc::new(FailingWrites {
        db,
        failures: AtomicUsize::new(1),
    });
    let engine = LevelingEngine::new(collaborators, LevelingConfig::default());

    let err = engine
        .award("alice", &habit.id, &habit.domain_codes, 100)
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(StoreError::QueryFailed(_))));
    assert!(engine.expertise("alice").unwrap().is_empty());
    assert!(engine.user_experience("alice").unwrap().is_none());

    let outcome = engine
        .award("alice", &habit.id, &habit.domain_codes, 100)
        .unwrap();
    let points: Vec<i64> = outcome
        .domain_updates
        .iter()
        .map(|u| u.experience_points)
        .collect();
    assert_eq!(points, [34, 33, 33]);
    let total = engine.user_experience("alice").unwrap().unwrap();
    assert_eq!(total.total_experience, 100);
    assert_eq!(total.awards_count, 1);
}
