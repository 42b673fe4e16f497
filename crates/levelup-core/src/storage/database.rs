//! SQLite-backed storage for habits, activity, expertise, history and suggestions.
//!
//! [`LevelingDb`] implements every collaborator trait the engine consumes, so
//! a single handle can be shared (behind an `Arc`) by all components.
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC, which keeps
//! lexicographic comparison in SQL equal to chronological comparison.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::StoreError;
use crate::expertise::{AwardWrite, ExpertiseRecord, LedgerUpdate, PointsCredit, UserExperience};
use crate::formula::{level_from_points, LevelTier};
use crate::habit::{Frequency, Habit, HabitPatch};
use crate::history::{EntityType, HistoryQuery, HistoryReason, LevelHistoryEntry};
use crate::suggestion::{LevelSuggestion, SuggestionStatus, SuggestionType};

use super::traits::{
    AcceptWrite, ActivityStore, DomainNameResolver, ExpertiseStore, HabitStore, HistoryStore,
    SuggestionStore,
};
use super::{data_dir, migrations};

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

const HABIT_COLUMNS: &str = "id, user_id, name, active, level, level_tier, workload_per_count,
     workload_unit, duration_minutes, frequency, target_count, domain_codes, created_at,
     last_assessed_at";

const EXPERTISE_COLUMNS: &str = "user_id, domain_code, domain_name, experience_points,
     expertise_level, expertise_tier, habit_count, last_activity_at";

const HISTORY_COLUMNS: &str =
    "id, entity_type, entity_id, old_level, new_level, reason, workload_delta, assessed_at";

const SUGGESTION_COLUMNS: &str = "id, user_id, habit_id, habit_name, suggestion_type,
     current_level, target_level, proposed_changes, reason, detected_at, status, responded_at";

/// SQLite database for the leveling engine.
///
/// The connection sits behind a mutex so the handle is `Send + Sync` and can
/// be shared across threads.
pub struct LevelingDb {
    conn: Mutex<Connection>,
}

impl LevelingDb {
    /// Open the database at `~/.config/levelup/levelup.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_path(&dir.join("levelup.db"))
    }

    /// Open (or create) the database at `path`.
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        tracing::debug!(
            "leveling database ready (schema v{})",
            migrations::get_schema_version(&conn)
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("failed to lock connection".into()))
    }

    // ── Host-side helpers ────────────────────────────────────────────

    /// Insert or replace a habit.
    pub fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        let codes = serde_json::to_string(&habit.domain_codes)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO habits
                (id, user_id, name, active, level, level_tier, workload_per_count,
                 workload_unit, duration_minutes, frequency, target_count, domain_codes,
                 created_at, last_assessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                habit.id,
                habit.user_id,
                habit.name,
                habit.active,
                habit.level,
                habit.level_tier.map(|t| t.as_str()),
                habit.workload_per_count,
                habit.workload_unit,
                habit.duration_minutes,
                habit.frequency.as_str(),
                habit.target_count,
                codes,
                format_timestamp(habit.created_at),
                habit.last_assessed_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    /// All habits of a user, oldest first.
    pub fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let habits = stmt
            .query_map(params![user_id], row_to_habit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    /// Log a completion of `habit_id` at `at`. Returns the row id.
    pub fn record_completion(&self, habit_id: &str, at: DateTime<Utc>) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO habit_completions (habit_id, status, completed_at) VALUES (?1, 'complete', ?2)",
            params![habit_id, format_timestamp(at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Register or rename a domain.
    pub fn upsert_domain(&self, code: &str, name: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO domains (code, name) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET name = excluded.name",
            params![code, name],
        )?;
        Ok(())
    }
}

// ── HabitStore ───────────────────────────────────────────────────────

impl HabitStore for LevelingDb {
    fn get_by_id(&self, habit_id: &str) -> Result<Option<Habit>, StoreError> {
        let conn = self.conn()?;
        let habit = conn
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
                params![habit_id],
                row_to_habit,
            )
            .optional()?;
        Ok(habit)
    }

    fn active_leveled_habits(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE user_id = ?1 AND active = 1 AND level IS NOT NULL
             ORDER BY created_at, rowid"
        ))?;
        let habits = stmt
            .query_map(params![user_id], row_to_habit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    fn update(&self, habit_id: &str, patch: &HabitPatch) -> Result<Option<Habit>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let habit = patch_habit(&tx, habit_id, patch)?;
        tx.commit()?;
        Ok(habit)
    }
}

// ── ActivityStore ────────────────────────────────────────────────────

impl ActivityStore for LevelingDb {
    fn count_completions_in_range(
        &self,
        habit_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM habit_completions
             WHERE habit_id = ?1 AND status = 'complete'
               AND completed_at >= ?2 AND completed_at <= ?3",
            params![habit_id, format_timestamp(start), format_timestamp(end)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ── DomainNameResolver ───────────────────────────────────────────────

impl DomainNameResolver for LevelingDb {
    fn resolve(
        &self,
        domain_codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
        if domain_codes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; domain_codes.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT code, name FROM domains WHERE code IN ({placeholders})"
        ))?;
        let names = stmt
            .query_map(params_from_iter(domain_codes.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(names)
    }
}

// ── ExpertiseStore ───────────────────────────────────────────────────

impl ExpertiseStore for LevelingDb {
    fn get(&self, user_id: &str, domain_code: &str) -> Result<Option<ExpertiseRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {EXPERTISE_COLUMNS} FROM expertise_records
                     WHERE user_id = ?1 AND domain_code = ?2"
                ),
                params![user_id, domain_code],
                row_to_expertise,
            )
            .optional()?;
        Ok(record)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<ExpertiseRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXPERTISE_COLUMNS} FROM expertise_records
             WHERE user_id = ?1
             ORDER BY expertise_level DESC, experience_points DESC, domain_code"
        ))?;
        let records = stmt
            .query_map(params![user_id], row_to_expertise)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn apply_award(
        &self,
        user_id: &str,
        credits: &[PointsCredit],
        total: i64,
        at: DateTime<Utc>,
    ) -> Result<AwardWrite, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updates = credits
            .iter()
            .map(|credit| credit_points(&tx, credit))
            .collect::<Result<Vec<_>, _>>()?;
        let user = increment_user_total(&tx, user_id, total, at)?;
        tx.commit()?;
        Ok(AwardWrite { updates, user })
    }

    fn user_experience(&self, user_id: &str) -> Result<Option<UserExperience>, StoreError> {
        let conn = self.conn()?;
        let experience = conn
            .query_row(
                "SELECT user_id, total_experience, awards_count, updated_at
                 FROM user_experience WHERE user_id = ?1",
                params![user_id],
                row_to_user_experience,
            )
            .optional()?;
        Ok(experience)
    }
}

// ── HistoryStore ─────────────────────────────────────────────────────

impl HistoryStore for LevelingDb {
    fn append(&self, entry: &LevelHistoryEntry) -> Result<(), StoreError> {
        let delta = entry
            .workload_delta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn()?.execute(
            "INSERT INTO level_history
                (id, entity_type, entity_id, old_level, new_level, reason, workload_delta, assessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.entity_type.as_str(),
                entry.entity_id,
                entry.old_level,
                entry.new_level,
                entry.reason.as_str(),
                delta,
                format_timestamp(entry.assessed_at),
            ],
        )?;
        Ok(())
    }

    fn query(&self, query: &HistoryQuery) -> Result<Vec<LevelHistoryEntry>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(entity_type) = query.entity_type {
            values.push(Value::Text(entity_type.as_str().to_string()));
            clauses.push(format!("entity_type = ?{}", values.len()));
        }
        if let Some(entity_id) = &query.entity_id {
            values.push(Value::Text(entity_id.clone()));
            clauses.push(format!("entity_id = ?{}", values.len()));
        }
        if let Some(from) = query.from {
            values.push(Value::Text(format_timestamp(from)));
            clauses.push(format!("assessed_at >= ?{}", values.len()));
        }
        if let Some(to) = query.to {
            values.push(Value::Text(format_timestamp(to)));
            clauses.push(format!("assessed_at <= ?{}", values.len()));
        }
        if let Some(category) = query.category {
            let mut slots = Vec::new();
            for reason in category.reasons() {
                values.push(Value::Text(reason.as_str().to_string()));
                slots.push(format!("?{}", values.len()));
            }
            clauses.push(format!("reason IN ({})", slots.join(", ")));
        }

        let mut sql = format!("SELECT {HISTORY_COLUMNS} FROM level_history");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY assessed_at DESC, rowid DESC");
        if let Some(limit) = query.limit {
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(values), row_to_history)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── SuggestionStore ──────────────────────────────────────────────────

impl SuggestionStore for LevelingDb {
    fn insert(&self, suggestion: &LevelSuggestion) -> Result<(), StoreError> {
        let changes = serde_json::to_string(&suggestion.proposed_changes)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn()?.execute(
            "INSERT INTO level_suggestions
                (id, user_id, habit_id, habit_name, suggestion_type, current_level, target_level,
                 proposed_changes, reason, detected_at, status, responded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                suggestion.id,
                suggestion.user_id,
                suggestion.habit_id,
                suggestion.habit_name,
                suggestion.suggestion_type.as_str(),
                suggestion.current_level,
                suggestion.target_level,
                changes,
                suggestion.reason,
                format_timestamp(suggestion.detected_at),
                suggestion.status.as_str(),
                suggestion.responded_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<LevelSuggestion>, StoreError> {
        let conn = self.conn()?;
        let suggestion = conn
            .query_row(
                &format!("SELECT {SUGGESTION_COLUMNS} FROM level_suggestions WHERE id = ?1"),
                params![id],
                row_to_suggestion,
            )
            .optional()?;
        Ok(suggestion)
    }

    fn transition(
        &self,
        id: &str,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE level_suggestions SET status = ?2, responded_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, status.as_str(), format_timestamp(at)],
        )?;
        Ok(changed == 1)
    }

    fn accept(
        &self,
        id: &str,
        habit_id: &str,
        patch: &HabitPatch,
        at: DateTime<Utc>,
    ) -> Result<AcceptWrite, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE level_suggestions SET status = 'accepted', responded_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, format_timestamp(at)],
        )?;
        if changed == 0 {
            let status = tx
                .query_row(
                    "SELECT status FROM level_suggestions WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map(|raw| parse_enum(0, &raw, SuggestionStatus::parse))
                .transpose()?;
            return Ok(AcceptWrite::NotPending(status));
        }

        // Dropping the transaction rolls the status change back.
        let Some(habit) = patch_habit(&tx, habit_id, patch)? else {
            return Ok(AcceptWrite::HabitMissing);
        };
        tx.commit()?;
        Ok(AcceptWrite::Applied(habit))
    }

    fn list_pending_for_user(&self, user_id: &str) -> Result<Vec<LevelSuggestion>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM level_suggestions
             WHERE user_id = ?1 AND status = 'pending'
             ORDER BY detected_at DESC, rowid DESC"
        ))?;
        let suggestions = stmt
            .query_map(params![user_id], row_to_suggestion)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(suggestions)
    }

    fn has_pending(
        &self,
        habit_id: &str,
        suggestion_type: SuggestionType,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM level_suggestions
                WHERE habit_id = ?1 AND suggestion_type = ?2 AND status = 'pending')",
            params![habit_id, suggestion_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

// ── Shared writes ────────────────────────────────────────────────────
// These run inside a caller's transaction.

fn patch_habit(
    conn: &Connection,
    habit_id: &str,
    patch: &HabitPatch,
) -> Result<Option<Habit>, StoreError> {
    let current = conn
        .query_row(
            &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
            params![habit_id],
            row_to_habit,
        )
        .optional()?;
    let Some(mut habit) = current else {
        return Ok(None);
    };

    patch.apply_to(&mut habit);
    conn.execute(
        "UPDATE habits SET name = ?2, level = ?3, level_tier = ?4, last_assessed_at = ?5,
             workload_per_count = ?6, duration_minutes = ?7, frequency = ?8, target_count = ?9
         WHERE id = ?1",
        params![
            habit.id,
            habit.name,
            habit.level,
            habit.level_tier.map(|t| t.as_str()),
            habit.last_assessed_at.map(format_timestamp),
            habit.workload_per_count,
            habit.duration_minutes,
            habit.frequency.as_str(),
            habit.target_count,
        ],
    )?;
    Ok(Some(habit))
}

/// Increment one ledger row, then recompute its level and tier from the new total.
fn credit_points(conn: &Connection, credit: &PointsCredit) -> Result<LedgerUpdate, StoreError> {
    let before: Option<(i64, i32)> = conn
        .query_row(
            "SELECT experience_points, expertise_level FROM expertise_records
             WHERE user_id = ?1 AND domain_code = ?2",
            params![credit.user_id, credit.domain_code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    // A name equal to the code means resolution fell back; keep the stored name.
    conn.execute(
        "INSERT INTO expertise_records
            (user_id, domain_code, domain_name, experience_points, expertise_level,
             expertise_tier, habit_count, last_activity_at)
         VALUES (?1, ?2, ?3, ?4, 0, 'beginner', 1, ?5)
         ON CONFLICT(user_id, domain_code) DO UPDATE SET
            experience_points = experience_points + excluded.experience_points,
            habit_count = habit_count + 1,
            last_activity_at = excluded.last_activity_at,
            domain_name = CASE
                WHEN excluded.domain_name = excluded.domain_code THEN domain_name
                ELSE excluded.domain_name
            END",
        params![
            credit.user_id,
            credit.domain_code,
            credit.domain_name,
            credit.points,
            format_timestamp(credit.at),
        ],
    )?;

    let points: i64 = conn.query_row(
        "SELECT experience_points FROM expertise_records
         WHERE user_id = ?1 AND domain_code = ?2",
        params![credit.user_id, credit.domain_code],
        |row| row.get(0),
    )?;
    let level = level_from_points(points);
    conn.execute(
        "UPDATE expertise_records SET expertise_level = ?3, expertise_tier = ?4
         WHERE user_id = ?1 AND domain_code = ?2",
        params![
            credit.user_id,
            credit.domain_code,
            level,
            LevelTier::from_level(level).as_str(),
        ],
    )?;

    let record = conn.query_row(
        &format!(
            "SELECT {EXPERTISE_COLUMNS} FROM expertise_records
             WHERE user_id = ?1 AND domain_code = ?2"
        ),
        params![credit.user_id, credit.domain_code],
        row_to_expertise,
    )?;

    let (old_points, old_level) = before.unwrap_or((0, 0));
    Ok(LedgerUpdate {
        record,
        old_points,
        old_level,
        created: before.is_none(),
    })
}

fn increment_user_total(
    conn: &Connection,
    user_id: &str,
    points: i64,
    at: DateTime<Utc>,
) -> Result<UserExperience, StoreError> {
    let experience = conn.query_row(
        "INSERT INTO user_experience (user_id, total_experience, awards_count, updated_at)
         VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            total_experience = total_experience + excluded.total_experience,
            awards_count = awards_count + 1,
            updated_at = excluded.updated_at
         RETURNING user_id, total_experience, awards_count, updated_at",
        params![user_id, points, format_timestamp(at)],
        row_to_user_experience,
    )?;
    Ok(experience)
}

// ── Row mapping ──────────────────────────────────────────────────────

/// Fixed-width UTC timestamp, e.g. `2026-03-01T08:00:00.000000Z`.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_enum<T>(idx: usize, raw: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value '{raw}'").into(),
        )
    })
}

fn row_to_habit(row: &rusqlite::Row) -> rusqlite::Result<Habit> {
    let level_tier: Option<String> = row.get(5)?;
    let frequency: String = row.get(9)?;
    let domain_codes: String = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(Habit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        level: row.get(4)?,
        level_tier: level_tier
            .map(|t| parse_enum(5, &t, LevelTier::parse))
            .transpose()?,
        workload_per_count: row.get(6)?,
        workload_unit: row.get(7)?,
        duration_minutes: row.get(8)?,
        frequency: parse_enum(9, &frequency, Frequency::parse)?,
        target_count: row.get(10)?,
        domain_codes: parse_json(11, &domain_codes)?,
        created_at: parse_timestamp(12, &created_at)?,
        last_assessed_at: parse_optional_timestamp(13, row.get(13)?)?,
    })
}

fn row_to_expertise(row: &rusqlite::Row) -> rusqlite::Result<ExpertiseRecord> {
    let tier: String = row.get(5)?;
    let last_activity_at: String = row.get(7)?;
    Ok(ExpertiseRecord {
        user_id: row.get(0)?,
        domain_code: row.get(1)?,
        domain_name: row.get(2)?,
        experience_points: row.get(3)?,
        expertise_level: row.get(4)?,
        expertise_tier: parse_enum(5, &tier, LevelTier::parse)?,
        habit_count: row.get(6)?,
        last_activity_at: parse_timestamp(7, &last_activity_at)?,
    })
}

fn row_to_user_experience(row: &rusqlite::Row) -> rusqlite::Result<UserExperience> {
    let updated_at: String = row.get(3)?;
    Ok(UserExperience {
        user_id: row.get(0)?,
        total_experience: row.get(1)?,
        awards_count: row.get(2)?,
        updated_at: parse_timestamp(3, &updated_at)?,
    })
}

fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<LevelHistoryEntry> {
    let entity_type: String = row.get(1)?;
    let reason: String = row.get(5)?;
    let workload_delta: Option<String> = row.get(6)?;
    let assessed_at: String = row.get(7)?;
    Ok(LevelHistoryEntry {
        id: row.get(0)?,
        entity_type: parse_enum(1, &entity_type, EntityType::parse)?,
        entity_id: row.get(2)?,
        old_level: row.get(3)?,
        new_level: row.get(4)?,
        reason: parse_enum(5, &reason, HistoryReason::parse)?,
        workload_delta: workload_delta.map(|d| parse_json(6, &d)).transpose()?,
        assessed_at: parse_timestamp(7, &assessed_at)?,
    })
}

fn row_to_suggestion(row: &rusqlite::Row) -> rusqlite::Result<LevelSuggestion> {
    let suggestion_type: String = row.get(4)?;
    let proposed_changes: String = row.get(7)?;
    let detected_at: String = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(LevelSuggestion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        habit_id: row.get(2)?,
        habit_name: row.get(3)?,
        suggestion_type: parse_enum(4, &suggestion_type, SuggestionType::parse)?,
        current_level: row.get(5)?,
        target_level: row.get(6)?,
        proposed_changes: parse_json(7, &proposed_changes)?,
        reason: row.get(8)?,
        detected_at: parse_timestamp(9, &detected_at)?,
        status: parse_enum(10, &status, SuggestionStatus::parse)?,
        responded_at: parse_optional_timestamp(11, row.get(11)?)?,
    })
}
