//! Top-level facade wiring the engine components together.
//!
//! Hosts either pass their own [`Collaborators`] or hand over a
//! [`LevelingDb`], which implements every store on SQLite.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::expertise::{AwardCoordinator, AwardOutcome, ExpertiseLedger, ExpertiseRecord, UserExperience};
use crate::history::{HistoryQuery, HistoryRecorder, LevelHistoryEntry};
use crate::storage::{
    ActivityStore, DomainNameResolver, ExpertiseStore, HabitStore, HistoryStore, LevelingConfig,
    LevelingDb, RetryPolicy, SuggestionStore,
};
use crate::suggestion::{
    AssessOutcome, CandidateDetector, LevelSuggestion, RespondOutcome, Response, SuggestionLifecycle,
};

/// The stores the engine reads and writes.
#[derive(Clone)]
pub struct Collaborators {
    pub habits: Arc<dyn HabitStore>,
    pub activities: Arc<dyn ActivityStore>,
    pub domain_names: Arc<dyn DomainNameResolver>,
    pub expertise: Arc<dyn ExpertiseStore>,
    pub history: Arc<dyn HistoryStore>,
    pub suggestions: Arc<dyn SuggestionStore>,
}

impl Collaborators {
    /// Every collaborator backed by the same database.
    pub fn from_database(db: Arc<LevelingDb>) -> Self {
        Self {
            habits: db.clone(),
            activities: db.clone(),
            domain_names: db.clone(),
            expertise: db.clone(),
            history: db.clone(),
            suggestions: db,
        }
    }
}

/// Experience awards, level suggestions and the level history behind one handle.
pub struct LevelingEngine {
    awards: AwardCoordinator,
    lifecycle: SuggestionLifecycle,
    history: HistoryRecorder,
}

impl LevelingEngine {
    pub fn new(collaborators: Collaborators, config: LevelingConfig) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let history = HistoryRecorder::new(collaborators.history.clone(), retry);

        let ledger = ExpertiseLedger::new(collaborators.expertise.clone(), retry);
        let awards = AwardCoordinator::new(
            collaborators.habits.clone(),
            collaborators.domain_names.clone(),
            ledger,
            history.clone(),
            retry,
        );

        let detector = CandidateDetector::new(
            collaborators.habits.clone(),
            collaborators.activities.clone(),
            history.clone(),
            config,
        );
        let lifecycle = SuggestionLifecycle::new(
            detector,
            collaborators.habits,
            collaborators.suggestions,
            history.clone(),
        );

        Self {
            awards,
            lifecycle,
            history,
        }
    }

    pub fn with_database(db: Arc<LevelingDb>, config: LevelingConfig) -> Self {
        Self::new(Collaborators::from_database(db), config)
    }

    pub fn awards(&self) -> &AwardCoordinator {
        &self.awards
    }

    pub fn suggestions(&self) -> &SuggestionLifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &LevelingConfig {
        self.lifecycle.detector().config()
    }

    // ── Expertise ────────────────────────────────────────────────────

    pub fn award(
        &self,
        user_id: &str,
        habit_id: &str,
        domain_codes: &[String],
        xp: i64,
    ) -> Result<AwardOutcome> {
        self.awards.award(user_id, habit_id, domain_codes, xp)
    }

    pub fn award_completion(
        &self,
        user_id: &str,
        habit_id: &str,
        streak_days: u32,
    ) -> Result<AwardOutcome> {
        self.awards.award_completion(user_id, habit_id, streak_days)
    }

    /// A user's expertise records, highest level first.
    pub fn expertise(&self, user_id: &str) -> Result<Vec<ExpertiseRecord>> {
        self.awards.ledger().records_for_user(user_id)
    }

    pub fn user_experience(&self, user_id: &str) -> Result<Option<UserExperience>> {
        self.awards.ledger().user_experience(user_id)
    }

    // ── Suggestions ──────────────────────────────────────────────────

    pub fn scan(&self, user_id: &str) -> Result<Vec<LevelSuggestion>> {
        self.lifecycle.scan(user_id, Utc::now())
    }

    pub fn scan_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<LevelSuggestion>> {
        self.lifecycle.scan(user_id, now)
    }

    pub fn pending_suggestions(&self, user_id: &str) -> Result<Vec<LevelSuggestion>> {
        self.lifecycle.pending(user_id)
    }

    pub fn respond(&self, suggestion_id: &str, response: Response) -> Result<RespondOutcome> {
        self.lifecycle.respond(suggestion_id, response)
    }

    /// Set a habit's level by hand; see [`SuggestionLifecycle::assess`].
    pub fn assess(&self, habit_id: &str, level: i32) -> Result<AssessOutcome> {
        self.lifecycle.assess(habit_id, level, Utc::now())
    }

    // ── History ──────────────────────────────────────────────────────

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<LevelHistoryEntry>> {
        self.history.query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::LevelTier;
    use crate::habit::Habit;
    use crate::history::EntityType;

    #[test]
    fn database_engine_awards_and_reads_back() {
        let db = Arc::new(LevelingDb::open_memory().unwrap());
        let mut habit = Habit::new("u1", "Bookkeeping drills");
        habit.level = Some(50);
        habit.domain_codes = vec!["2411".into()];
        db.insert_habit(&habit).unwrap();
        db.upsert_domain("2411", "Accountants").unwrap();

        let engine = LevelingEngine::with_database(db, LevelingConfig::default());
        let outcome = engine.award_completion("u1", &habit.id, 0).unwrap();
        assert_eq!(outcome.total_points_awarded, 500);

        let records = engine.expertise("u1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain_name, "Accountants");
        assert_eq!(engine.user_experience("u1").unwrap().unwrap().total_experience, 500);

        // 500 points is level 25: a domain level change is recorded.
        let entries = engine
            .history(&HistoryQuery::for_entity(EntityType::Domain, "u1:2411"))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].new_level, 25);
    }

    #[test]
    fn fresh_user_has_nothing_pending() {
        let db = Arc::new(LevelingDb::open_memory().unwrap());
        let engine = LevelingEngine::with_database(db, LevelingConfig::default());
        assert!(engine.scan("nobody").unwrap().is_empty());
        assert!(engine.pending_suggestions("nobody").unwrap().is_empty());
        assert_eq!(engine.config().level_up.level_step, 15);
    }

    #[test]
    fn assess_records_initial_then_re_assessment() {
        use crate::error::{CoreError, ValidationError};
        use crate::history::HistoryReason;

        let db = Arc::new(LevelingDb::open_memory().unwrap());
        let habit = Habit::new("u1", "Stretching");
        db.insert_habit(&habit).unwrap();
        let engine = LevelingEngine::with_database(db, LevelingConfig::default());

        let first = engine.assess(&habit.id, 20).unwrap();
        assert_eq!(first.old_level, None);
        assert_eq!(first.habit.level, Some(20));
        assert!(first.habit.last_assessed_at.is_some());
        let second = engine.assess(&habit.id, 35).unwrap();
        assert_eq!(second.old_level, Some(20));
        assert_eq!(second.habit.level_tier, Some(LevelTier::from_level(35)));

        let entries = engine
            .history(&HistoryQuery::for_entity(EntityType::Habit, habit.id.as_str()))
            .unwrap();
        let reasons: Vec<_> = entries.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            [HistoryReason::ReAssessment, HistoryReason::InitialAssessment]
        );

        assert!(matches!(
            engine.assess(&habit.id, 200),
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));
        assert!(matches!(
            engine.assess("missing", 10),
            Err(CoreError::Validation(ValidationError::UnknownHabit(_)))
        ));
    }
}
