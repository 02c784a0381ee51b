use gatehouse_sql::SQLStore;

use crate::service::AccessError;

/// Initialize the SQLite schema for all access resources.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), AccessError> {
    let statements = [
        // Screens: registry of permission-checked surfaces
        "CREATE TABLE IF NOT EXISTS screens (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL UNIQUE,
            teacher_only INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",

        // Users: profile directory mirrored from authentication
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            profile TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_users_profile ON users(profile)",

        // Groups
        "CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",

        "CREATE TABLE IF NOT EXISTS group_members (
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id),
            FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id)",

        "CREATE TABLE IF NOT EXISTS group_grants (
            group_id TEXT NOT NULL,
            screen_id TEXT NOT NULL,
            operations TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (group_id, screen_id),
            FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
            FOREIGN KEY (screen_id) REFERENCES screens(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_group_grants_screen ON group_grants(screen_id)",

        // Whitelist: student/guardian allow-list
        "CREATE TABLE IF NOT EXISTS profile_whitelist (
            profile TEXT NOT NULL CHECK (profile IN ('student', 'guardian')),
            screen_id TEXT NOT NULL,
            operations TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (profile, screen_id),
            FOREIGN KEY (screen_id) REFERENCES screens(id)
        )",

        // Overrides: scalar columns, times in unix milliseconds
        "CREATE TABLE IF NOT EXISTS overrides (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            screen_id TEXT NOT NULL,
            operations TEXT NOT NULL,
            starts_at INTEGER NOT NULL,
            ends_at INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('ACTIVE', 'EXPIRED', 'REVOKED')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (starts_at <= ends_at),
            FOREIGN KEY (screen_id) REFERENCES screens(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_overrides_key ON overrides(user_id, screen_id, status)",

        // At most one ACTIVE window per (user, screen) at any instant
        "CREATE TRIGGER IF NOT EXISTS trg_overrides_no_overlap
            BEFORE INSERT ON overrides
            WHEN NEW.status = 'ACTIVE' AND EXISTS (
                SELECT 1 FROM overrides
                WHERE user_id = NEW.user_id
                  AND screen_id = NEW.screen_id
                  AND status = 'ACTIVE'
                  AND ends_at >= NEW.starts_at
                  AND starts_at <= NEW.ends_at
            )
        BEGIN
            SELECT RAISE(ABORT, 'overlapping active override');
        END",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])?;
    }

    Ok(())
}
