//! Host-side records the engine reads: habits, completions and domain names.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use levelup_core::{Frequency, Habit, LevelTier, LevelingDb};
use serde_json::json;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit
    Add {
        /// Owning user id
        user: String,
        /// Habit name
        name: String,
        /// Assessed difficulty level (unassessed habits are never scanned)
        #[arg(long)]
        level: Option<i32>,
        /// daily, weekly or monthly
        #[arg(long, default_value = "daily", value_parser = parse_frequency)]
        frequency: Frequency,
        /// Completions per period
        #[arg(long, default_value_t = 1)]
        target: u32,
        /// Workload per completion (e.g. 20 for "20 pushups")
        #[arg(long)]
        workload: Option<f64>,
        /// Unit of --workload
        #[arg(long, requires = "workload")]
        unit: Option<String>,
        /// Duration in minutes
        #[arg(long)]
        duration: Option<u32>,
        /// Domain code (repeatable)
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    /// Log a completion
    Complete {
        /// Habit id
        id: String,
        /// Completion time, RFC 3339 (default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Set a habit's level by hand (recorded as an assessment)
    Assess {
        /// Habit id
        id: String,
        /// New level, 0-199
        level: i32,
    },
    /// List a user's habits
    List {
        /// User id
        user: String,
    },
}

#[derive(Subcommand)]
pub enum DomainAction {
    /// Register or rename a domain
    Set {
        /// Domain code
        code: String,
        /// Display name
        name: String,
    },
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    Frequency::parse(s).ok_or_else(|| format!("unknown frequency '{s}' (expected daily, weekly or monthly)"))
}

pub fn run(action: HabitAction) -> CommandResult {
    let db = LevelingDb::open()?;
    match action {
        HabitAction::Add {
            user,
            name,
            level,
            frequency,
            target,
            workload,
            unit,
            duration,
            domains,
        } => {
            let mut habit = Habit::new(user, name);
            habit.level = level;
            habit.level_tier = level.map(LevelTier::from_level);
            habit.last_assessed_at = level.map(|_| Utc::now());
            habit.frequency = frequency;
            habit.target_count = target;
            habit.workload_per_count = workload;
            habit.workload_unit = unit;
            habit.duration_minutes = duration;
            habit.domain_codes = domains;
            db.insert_habit(&habit)?;
            print_json(&habit)
        }
        HabitAction::Complete { id, at } => {
            let at = at.unwrap_or_else(Utc::now);
            let row = db.record_completion(&id, at)?;
            print_json(&json!({ "habit_id": id, "completion": row, "completed_at": at }))
        }
        HabitAction::Assess { id, level } => {
            let (_db, engine) = open_engine()?;
            let outcome = engine.assess(&id, level)?;
            for degradation in &outcome.degraded {
                tracing::warn!("assess degraded: {:?}", degradation);
            }
            print_json(&outcome)
        }
        HabitAction::List { user } => print_json(&db.habits_for_user(&user)?),
    }
}

pub fn run_domain(action: DomainAction) -> CommandResult {
    let db = LevelingDb::open()?;
    match action {
        DomainAction::Set { code, name } => {
            db.upsert_domain(&code, &name)?;
            println!("ok");
        }
    }
    Ok(())
}
