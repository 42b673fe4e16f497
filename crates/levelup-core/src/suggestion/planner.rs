//! Workload proposals for level changes.
//!
//! The percentage a level moves is applied to the habit's workload. Each
//! numeric field the habit has (workload per count, duration) is scaled by
//! that percentage. A habit with neither gets its frequency stepped once
//! instead, and if the frequency is already at its limit the target count
//! is scaled. Fields the habit does not have never appear in a proposal.

use crate::habit::Habit;

use super::{BabyStepPlan, ValueChange, WorkloadChange, WorkloadChanges};

const BABY_STEP_SUFFIX: &str = " (baby step)";
const FIRST_STEP_SUFFIX: &str = " (first step)";

/// Computes increase and decrease proposals.
#[derive(Debug, Clone, Copy, Default)]
pub struct BabyStepPlanner;

impl BabyStepPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Proposal for raising `habit` from `current_level` to `target_level`.
    pub fn plan_increase(
        &self,
        habit: &Habit,
        current_level: i32,
        target_level: i32,
    ) -> WorkloadChanges {
        let percent = change_percent(current_level, target_level - current_level);
        let factor = 1.0 + percent as f64 / 100.0;

        let mut changes = WorkloadChanges {
            workload_per_count: habit.workload_per_count.map(|old| WorkloadChange {
                old,
                new: (old * factor).round(),
                change_percent: percent,
            }),
            duration: habit.duration_minutes.map(|old| ValueChange {
                old,
                new: (old as f64 * factor).round() as u32,
            }),
            ..Default::default()
        };

        if changes.workload_per_count.is_none() && changes.duration.is_none() {
            match habit.frequency.escalate() {
                Some(new) => {
                    changes.frequency = Some(ValueChange {
                        old: habit.frequency,
                        new,
                    })
                }
                None => {
                    changes.target_count = Some(ValueChange {
                        old: habit.target_count,
                        new: (habit.target_count as f64 * factor).round() as u32,
                    })
                }
            }
        }

        tracing::debug!(
            "increase plan for {}: level {} -> {} (+{}%)",
            habit.id,
            current_level,
            target_level,
            percent
        );
        changes
    }

    /// Baby-step plan for lowering `habit` from `current_level` to `target_level`.
    pub fn plan_decrease(
        &self,
        habit: &Habit,
        current_level: i32,
        target_level: i32,
    ) -> BabyStepPlan {
        let percent = change_percent(current_level, current_level - target_level);
        let factor = 1.0 - percent as f64 / 100.0;

        let mut changes = WorkloadChanges {
            workload_per_count: habit.workload_per_count.map(|old| WorkloadChange {
                old,
                new: (old * factor).round().max(1.0),
                change_percent: -percent,
            }),
            duration: habit.duration_minutes.map(|old| ValueChange {
                old,
                new: ((old as f64 * factor).round() as u32).max(1),
            }),
            ..Default::default()
        };

        if changes.workload_per_count.is_none() && changes.duration.is_none() {
            match habit.frequency.deescalate() {
                Some(new) => {
                    changes.frequency = Some(ValueChange {
                        old: habit.frequency,
                        new,
                    })
                }
                None => {
                    changes.target_count = Some(ValueChange {
                        old: habit.target_count,
                        new: ((habit.target_count as f64 * factor).round() as u32).max(1),
                    })
                }
            }
        }

        tracing::debug!(
            "baby step plan for {}: level {} -> {} (-{}%)",
            habit.id,
            current_level,
            target_level,
            percent
        );

        BabyStepPlan {
            changes,
            target_level,
            simplified_name: simplified_name(&habit.name, target_level),
        }
    }
}

/// `round(delta / current * 100)`, with level 0 treated as 1.
fn change_percent(current_level: i32, delta: i32) -> i64 {
    let base = current_level.max(1) as f64;
    (delta as f64 / base * 100.0).round() as i64
}

/// Display name for a down-levelled habit. Re-simplifying does not stack suffixes.
pub fn simplified_name(name: &str, target_level: i32) -> String {
    let base = name
        .strip_suffix(BABY_STEP_SUFFIX)
        .or_else(|| name.strip_suffix(FIRST_STEP_SUFFIX))
        .unwrap_or(name)
        .trim_end();
    let suffix = if target_level <= 10 {
        FIRST_STEP_SUFFIX
    } else {
        BABY_STEP_SUFFIX
    };
    format!("{base}{suffix}")
}
