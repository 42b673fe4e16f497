//! Awarding experience for a habit completion.
//!
//! One award runs validate -> resolve names -> distribute -> credit all
//! domains and the user's total in one store transaction -> audit level
//! changes. Validation failures abort before anything is written. Name
//! resolution and audit writes degrade instead of failing; the ledger write
//! is authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::distribution::distribute;
use super::ledger::{ExpertiseLedger, ExpertiseRecord, PointsCredit};
use crate::error::{Degradation, Result, ValidationError};
use crate::formula::{experience_points, LevelTier};
use crate::habit::Habit;
use crate::history::{domain_entity_id, EntityType, HistoryReason, HistoryRecorder, LevelHistoryEntry};
use crate::storage::{DomainNameResolver, HabitStore, RetryPolicy};

/// Ledger state of one domain after an award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainUpdate {
    pub domain_code: String,
    pub domain_name: String,
    pub points_awarded: i64,
    pub proportion: f64,
    pub experience_points: i64,
    pub expertise_level: i32,
    pub expertise_tier: LevelTier,
}

/// An expertise level that moved because of an award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub domain_code: String,
    pub domain_name: String,
    pub old_level: i32,
    pub new_level: i32,
    pub new_tier: LevelTier,
}

/// Everything an award did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardOutcome {
    pub total_points_awarded: i64,
    pub domain_updates: Vec<DomainUpdate>,
    pub level_changes: Vec<LevelChange>,
    /// Non-fatal failures; empty on a clean run.
    pub degraded: Vec<Degradation>,
}

impl AwardOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Runs the award workflow.
pub struct AwardCoordinator {
    habits: Arc<dyn HabitStore>,
    names: Arc<dyn DomainNameResolver>,
    ledger: ExpertiseLedger,
    history: HistoryRecorder,
    retry: RetryPolicy,
}

impl AwardCoordinator {
    pub fn new(
        habits: Arc<dyn HabitStore>,
        names: Arc<dyn DomainNameResolver>,
        ledger: ExpertiseLedger,
        history: HistoryRecorder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            habits,
            names,
            ledger,
            history,
            retry,
        }
    }

    pub fn ledger(&self) -> &ExpertiseLedger {
        &self.ledger
    }

    /// Award `xp` for a completion of `habit_id`, split over `domain_codes`.
    pub fn award(
        &self,
        user_id: &str,
        habit_id: &str,
        domain_codes: &[String],
        xp: i64,
    ) -> Result<AwardOutcome> {
        self.award_at(user_id, habit_id, domain_codes, xp, Utc::now())
    }

    /// Award for a completion, deriving XP from the habit's level and the
    /// streak and using the habit's own domains.
    pub fn award_completion(
        &self,
        user_id: &str,
        habit_id: &str,
        streak_days: u32,
    ) -> Result<AwardOutcome> {
        let habit = self.validated_habit(user_id, habit_id)?;
        let xp = experience_points(habit.level, streak_days);
        self.award_at(user_id, habit_id, &habit.domain_codes, xp, Utc::now())
    }

    /// [`AwardCoordinator::award`] with an explicit timestamp.
    pub fn award_at(
        &self,
        user_id: &str,
        habit_id: &str,
        domain_codes: &[String],
        xp: i64,
        now: DateTime<Utc>,
    ) -> Result<AwardOutcome> {
        if xp < 0 {
            return Err(ValidationError::NegativeExperience(xp).into());
        }
        if domain_codes.iter().any(|code| code.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "domain_codes".to_string(),
                message: "domain codes must not be blank".to_string(),
            }
            .into());
        }
        self.validated_habit(user_id, habit_id)?;

        let mut degraded = Vec::new();
        let names = self.resolve_names(domain_codes, &mut degraded);
        let shares = distribute(xp, domain_codes, &names);

        let credits: Vec<PointsCredit> = shares
            .iter()
            .map(|share| PointsCredit {
                user_id: user_id.to_string(),
                domain_code: share.domain_code.clone(),
                domain_name: share.domain_name.clone(),
                points: share.points,
                at: now,
            })
            .collect();
        let write = self.ledger.credit_award(user_id, &credits, xp, now)?;

        // History is written after the ledger commits and never rolls it back.
        let mut domain_updates = Vec::with_capacity(shares.len());
        let mut level_changes = Vec::new();
        for (share, update) in shares.into_iter().zip(write.updates) {
            if update.level_changed() {
                let change = level_change(&update.record, update.old_level);
                let entry = LevelHistoryEntry::new(
                    EntityType::Domain,
                    domain_entity_id(user_id, &change.domain_code),
                    Some(change.old_level),
                    change.new_level,
                    HistoryReason::ExpertiseGain,
                    now,
                );
                if let Some(d) = self.history.record_lenient(&entry) {
                    degraded.push(d);
                }
                tracing::info!(
                    "user {} reached level {} in {} ({})",
                    user_id,
                    change.new_level,
                    change.domain_name,
                    change.new_tier
                );
                level_changes.push(change);
            }

            domain_updates.push(DomainUpdate {
                domain_code: share.domain_code,
                domain_name: update.record.domain_name,
                points_awarded: share.points,
                proportion: share.proportion,
                experience_points: update.record.experience_points,
                expertise_level: update.record.expertise_level,
                expertise_tier: update.record.expertise_tier,
            });
        }

        Ok(AwardOutcome {
            total_points_awarded: xp,
            domain_updates,
            level_changes,
            degraded,
        })
    }

    fn validated_habit(&self, user_id: &str, habit_id: &str) -> Result<Habit> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId.into());
        }
        let habit = self
            .retry
            .run("habit read", || self.habits.get_by_id(habit_id))?
            .ok_or_else(|| ValidationError::UnknownHabit(habit_id.to_string()))?;
        if habit.user_id != user_id {
            return Err(ValidationError::HabitOwnership {
                habit_id: habit_id.to_string(),
                user_id: user_id.to_string(),
            }
            .into());
        }
        Ok(habit)
    }

    fn resolve_names(
        &self,
        domain_codes: &[String],
        degraded: &mut Vec<Degradation>,
    ) -> HashMap<String, String> {
        if domain_codes.is_empty() {
            return HashMap::new();
        }
        match self.names.resolve(domain_codes) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("domain name lookup failed, using codes: {}", e);
                degraded.push(Degradation::DomainNamesUnavailable {
                    reason: e.to_string(),
                });
                HashMap::new()
            }
        }
    }
}

fn level_change(record: &ExpertiseRecord, old_level: i32) -> LevelChange {
    LevelChange {
        domain_code: record.domain_code.clone(),
        domain_name: record.domain_name.clone(),
        old_level,
        new_level: record.expertise_level,
        new_tier: record.expertise_tier,
    }
}
