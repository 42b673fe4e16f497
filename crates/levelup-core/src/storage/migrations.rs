//! Database schema migrations for levelup.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {}", e);
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: base tables.
///
/// `habits`, `habit_completions` and `domains` belong to the host
/// application; the engine only reads them (and patches habit levels).
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            name               TEXT NOT NULL,
            active             INTEGER NOT NULL DEFAULT 1,
            level              INTEGER,
            level_tier         TEXT,
            workload_per_count REAL,
            workload_unit      TEXT,
            duration_minutes   INTEGER,
            frequency          TEXT NOT NULL DEFAULT 'daily',
            target_count       INTEGER NOT NULL DEFAULT 1,
            domain_codes       TEXT NOT NULL DEFAULT '[]',
            created_at         TEXT NOT NULL,
            last_assessed_at   TEXT
        );

        CREATE TABLE IF NOT EXISTS habit_completions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_id     TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'complete',
            completed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS domains (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS expertise_records (
            user_id           TEXT NOT NULL,
            domain_code       TEXT NOT NULL,
            domain_name       TEXT NOT NULL,
            experience_points INTEGER NOT NULL DEFAULT 0 CHECK (experience_points >= 0),
            expertise_level   INTEGER NOT NULL DEFAULT 0,
            expertise_tier    TEXT NOT NULL DEFAULT 'beginner',
            habit_count       INTEGER NOT NULL DEFAULT 0,
            last_activity_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, domain_code)
        );

        CREATE TABLE IF NOT EXISTS user_experience (
            user_id          TEXT PRIMARY KEY,
            total_experience INTEGER NOT NULL DEFAULT 0,
            awards_count     INTEGER NOT NULL DEFAULT 0,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS level_history (
            id             TEXT PRIMARY KEY,
            entity_type    TEXT NOT NULL,
            entity_id      TEXT NOT NULL,
            old_level      INTEGER,
            new_level      INTEGER NOT NULL,
            reason         TEXT NOT NULL,
            workload_delta TEXT,
            assessed_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS level_suggestions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            habit_id         TEXT NOT NULL,
            habit_name       TEXT NOT NULL,
            suggestion_type  TEXT NOT NULL,
            current_level    INTEGER NOT NULL,
            target_level     INTEGER NOT NULL,
            proposed_changes TEXT NOT NULL,
            reason           TEXT NOT NULL DEFAULT '',
            detected_at      TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'pending',
            responded_at     TEXT
        );",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: indexes.
///
/// - completion counts per habit and time range
/// - history reads per entity, newest first
/// - pending suggestion listings per user
/// - at most one pending suggestion per habit and direction
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_completions_habit_time
             ON habit_completions(habit_id, completed_at);
         CREATE INDEX IF NOT EXISTS idx_history_entity_time
             ON level_history(entity_type, entity_id, assessed_at);
         CREATE INDEX IF NOT EXISTS idx_history_time
             ON level_history(assessed_at);
         CREATE INDEX IF NOT EXISTS idx_suggestions_user_status
             ON level_suggestions(user_id, status);
         CREATE INDEX IF NOT EXISTS idx_habits_user
             ON habits(user_id, active);
         CREATE UNIQUE INDEX IF NOT EXISTS idx_suggestions_one_pending
             ON level_suggestions(habit_id, suggestion_type)
             WHERE status = 'pending';",
    )?;
    set_schema_version(conn, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn v2_limits_pending_suggestions_per_habit_and_type() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let insert = |id: &str, suggestion_type: &str, status: &str| {
            conn.execute(
                "INSERT INTO level_suggestions
                    (id, user_id, habit_id, habit_name, suggestion_type, current_level,
                     target_level, proposed_changes, detected_at, status)
                 VALUES (?1, 'u1', 'h1', 'Run', ?2, 50, 65, '{}', '2026-01-01T00:00:00.000000Z', ?3)",
                [id, suggestion_type, status],
            )
        };
        insert("s1", "level_up", "pending").unwrap();
        insert("s2", "level_down", "pending").unwrap();
        insert("s3", "level_up", "dismissed").unwrap();
        assert!(insert("s4", "level_up", "pending").is_err());
    }
}
