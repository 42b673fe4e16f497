//! Per-(user, domain) expertise ledger.
//!
//! The ledger stores points; levels and tiers are always derived from them
//! with [`level_from_points`]. Crediting is an increment-then-recompute that
//! the store performs atomically for all domains of an award together with
//! the user's total, serialized per (user, domain) key by [`KeyedLocks`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::formula::{level_from_points, points_for_level, LevelTier, MAX_LEVEL};
use crate::locks::KeyedLocks;
use crate::storage::{ExpertiseStore, RetryPolicy};

/// Accumulated expertise of one user in one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseRecord {
    pub user_id: String,
    pub domain_code: String,
    pub domain_name: String,
    pub experience_points: i64,
    pub expertise_level: i32,
    pub expertise_tier: LevelTier,
    pub habit_count: i64,
    pub last_activity_at: DateTime<Utc>,
}

impl ExpertiseRecord {
    /// Progress from the current level towards the next one.
    pub fn progress(&self) -> LevelProgress {
        LevelProgress::for_points(self.experience_points)
    }
}

/// Where a point total sits between two levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: i32,
    pub points_into_level: i64,
    /// `None` at the maximum level.
    pub points_to_next_level: Option<i64>,
}

impl LevelProgress {
    pub fn for_points(points: i64) -> Self {
        let points = points.max(0);
        let level = level_from_points(points);
        let floor = points_for_level(level);
        let points_to_next_level = if level >= MAX_LEVEL {
            None
        } else {
            Some(points_for_level(level + 1) - points)
        };
        Self {
            level,
            points_into_level: points - floor,
            points_to_next_level,
        }
    }
}

/// The user's aggregate experience across all domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserExperience {
    pub user_id: String,
    pub total_experience: i64,
    pub awards_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Points credited to one ledger key.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsCredit {
    pub user_id: String,
    pub domain_code: String,
    pub domain_name: String,
    pub points: i64,
    pub at: DateTime<Utc>,
}

/// Result of crediting points: the record after the write and the values before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub record: ExpertiseRecord,
    pub old_points: i64,
    /// Level before the credit; 0 for a newly created record.
    pub old_level: i32,
    pub created: bool,
}

impl LedgerUpdate {
    pub fn level_changed(&self) -> bool {
        self.record.expertise_level != self.old_level
    }
}

/// Everything one award wrote: a ledger update per share and the user's new total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardWrite {
    pub updates: Vec<LedgerUpdate>,
    pub user: UserExperience,
}

/// Service over an [`ExpertiseStore`].
pub struct ExpertiseLedger {
    store: Arc<dyn ExpertiseStore>,
    locks: KeyedLocks,
    retry: RetryPolicy,
}

impl ExpertiseLedger {
    pub fn new(store: Arc<dyn ExpertiseStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    /// Credit all `credits` and add `total` to the user's aggregate counter.
    ///
    /// The store writes everything in one transaction, so a failed award
    /// leaves no points behind and can simply be retried.
    pub fn credit_award(
        &self,
        user_id: &str,
        credits: &[PointsCredit],
        total: i64,
        at: DateTime<Utc>,
    ) -> Result<AwardWrite> {
        let keys: Vec<String> = credits
            .iter()
            .map(|c| format!("{}:{}", c.user_id, c.domain_code))
            .collect();
        let write = self.locks.with_locks(&keys, || {
            self.retry.run("expertise award", || {
                self.store.apply_award(user_id, credits, total, at)
            })
        })?;
        for update in &write.updates {
            debug_assert!(update.record.expertise_level >= update.old_level);
            tracing::debug!(
                "credited {}:{}: {} -> {} points (level {} -> {})",
                user_id,
                update.record.domain_code,
                update.old_points,
                update.record.experience_points,
                update.old_level,
                update.record.expertise_level
            );
        }
        Ok(write)
    }

    pub fn record(&self, user_id: &str, domain_code: &str) -> Result<Option<ExpertiseRecord>> {
        Ok(self
            .retry
            .run("expertise read", || self.store.get(user_id, domain_code))?)
    }

    /// All of a user's records, highest level first.
    pub fn records_for_user(&self, user_id: &str) -> Result<Vec<ExpertiseRecord>> {
        Ok(self
            .retry
            .run("expertise list", || self.store.list_for_user(user_id))?)
    }

    pub fn user_experience(&self, user_id: &str) -> Result<Option<UserExperience>> {
        Ok(self
            .retry
            .run("user total read", || self.store.user_experience(user_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_within_level() {
        let progress = LevelProgress::for_points(150);
        assert_eq!(progress.level, level_from_points(150));
        assert_eq!(
            progress.points_into_level,
            150 - points_for_level(progress.level)
        );
        let next = progress.points_to_next_level.unwrap();
        assert!(next > 0);
        assert_eq!(level_from_points(150 + next), progress.level + 1);
    }

    #[test]
    fn progress_at_zero_and_max() {
        let zero = LevelProgress::for_points(0);
        assert_eq!(zero.level, 0);
        assert_eq!(zero.points_into_level, 0);
        assert_eq!(zero.points_to_next_level, Some(points_for_level(1)));

        let max = LevelProgress::for_points(points_for_level(MAX_LEVEL) + 5);
        assert_eq!(max.level, MAX_LEVEL);
        assert_eq!(max.points_to_next_level, None);
    }
}
