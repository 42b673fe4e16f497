//! Append-only audit trail of level changes.
//!
//! Every change to a habit level or an expertise level is written here
//! once and never modified. The recorder deliberately exposes no update or
//! delete operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Degradation, Result};
use crate::storage::{HistoryStore, RetryPolicy};
use crate::suggestion::WorkloadChanges;

/// What a history entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Habit,
    Domain,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Habit => "habit",
            EntityType::Domain => "domain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "habit" => Some(EntityType::Habit),
            "domain" => Some(EntityType::Domain),
            _ => None,
        }
    }
}

/// Why a level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryReason {
    InitialAssessment,
    ReAssessment,
    LevelUpProgression,
    #[serde(rename = "level_down_baby_step_lv50")]
    LevelDownBabyStepLv50,
    #[serde(rename = "level_down_baby_step_lv10")]
    LevelDownBabyStepLv10,
    ExpertiseGain,
}

impl HistoryReason {
    pub const ALL: [HistoryReason; 6] = [
        HistoryReason::InitialAssessment,
        HistoryReason::ReAssessment,
        HistoryReason::LevelUpProgression,
        HistoryReason::LevelDownBabyStepLv50,
        HistoryReason::LevelDownBabyStepLv10,
        HistoryReason::ExpertiseGain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryReason::InitialAssessment => "initial_assessment",
            HistoryReason::ReAssessment => "re_assessment",
            HistoryReason::LevelUpProgression => "level_up_progression",
            HistoryReason::LevelDownBabyStepLv50 => "level_down_baby_step_lv50",
            HistoryReason::LevelDownBabyStepLv10 => "level_down_baby_step_lv10",
            HistoryReason::ExpertiseGain => "expertise_gain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for HistoryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse grouping of reasons used by history filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    LevelUp,
    LevelDown,
    ReAssessment,
}

impl ReasonCategory {
    pub fn reasons(&self) -> &'static [HistoryReason] {
        match self {
            ReasonCategory::LevelUp => &[HistoryReason::LevelUpProgression],
            ReasonCategory::LevelDown => &[
                HistoryReason::LevelDownBabyStepLv50,
                HistoryReason::LevelDownBabyStepLv10,
            ],
            ReasonCategory::ReAssessment => {
                &[HistoryReason::ReAssessment, HistoryReason::InitialAssessment]
            }
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "level_up" => Some(ReasonCategory::LevelUp),
            "level_down" => Some(ReasonCategory::LevelDown),
            "re_assessment" => Some(ReasonCategory::ReAssessment),
            _ => None,
        }
    }
}

/// One immutable level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelHistoryEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub old_level: Option<i32>,
    pub new_level: i32,
    pub reason: HistoryReason,
    pub workload_delta: Option<WorkloadChanges>,
    pub assessed_at: DateTime<Utc>,
}

impl LevelHistoryEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        old_level: Option<i32>,
        new_level: i32,
        reason: HistoryReason,
        assessed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            entity_id: entity_id.into(),
            old_level,
            new_level,
            reason,
            workload_delta: None,
            assessed_at,
        }
    }

    pub fn with_workload_delta(mut self, delta: WorkloadChanges) -> Self {
        self.workload_delta = Some(delta);
        self
    }
}

/// Entity id used for domain entries: one ledger per user and domain.
pub fn domain_entity_id(user_id: &str, domain_code: &str) -> String {
    format!("{user_id}:{domain_code}")
}

/// Filter for reading the audit trail. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound on `assessed_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `assessed_at`.
    pub to: Option<DateTime<Utc>>,
    pub category: Option<ReasonCategory>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn for_entity(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.into()),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn in_category(mut self, category: ReasonCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Writes and reads the level-change audit trail.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    retry: RetryPolicy,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Append an entry.
    pub fn record(&self, entry: &LevelHistoryEntry) -> Result<()> {
        self.retry
            .run("history append", || self.store.append(entry))?;
        tracing::debug!(
            "recorded {} {} level {:?} -> {} ({})",
            entry.entity_type.as_str(),
            entry.entity_id,
            entry.old_level,
            entry.new_level,
            entry.reason
        );
        Ok(())
    }

    /// Append an entry, reporting failure as a degradation instead of an error.
    ///
    /// Used after the primary mutation has committed: the audit trail may
    /// have a gap, the mutation stands.
    pub fn record_lenient(&self, entry: &LevelHistoryEntry) -> Option<Degradation> {
        match self.record(entry) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "failed to record level history for {} {}: {}",
                    entry.entity_type.as_str(),
                    entry.entity_id,
                    e
                );
                Some(Degradation::HistoryNotRecorded {
                    entity_id: entry.entity_id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Entries matching `query`, newest first.
    pub fn query(&self, query: &HistoryQuery) -> Result<Vec<LevelHistoryEntry>> {
        Ok(self.retry.run("history query", || self.store.query(query))?)
    }

    /// Most recent entry for one entity, if any.
    pub fn last_change_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<LevelHistoryEntry>> {
        let query = HistoryQuery::for_entity(entity_type, entity_id).limit(1);
        Ok(self.query(&query)?.into_iter().next())
    }
}
