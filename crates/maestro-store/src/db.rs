use rusqlite::Connection;

use crate::error::Result;

/// Initialise the full schema. Safe to call on every startup — uses
/// `IF NOT EXISTS` throughout. Foreign keys cascade so deleting a project
/// removes every descendant row.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS projects (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            path        TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspaces (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            slug        TEXT NOT NULL,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(project_id, slug)
        );
        CREATE INDEX IF NOT EXISTS idx_workspaces_project
            ON workspaces(project_id);

        CREATE TABLE IF NOT EXISTS workspace_pages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            page_name    TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            added_at     TEXT NOT NULL,
            UNIQUE(workspace_id, page_name)
        );

        CREATE TABLE IF NOT EXISTS workspace_notes (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            text         TEXT NOT NULL,
            source       TEXT NOT NULL DEFAULT 'maestro',
            source_page  TEXT,
            added_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspace_highlights (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_page_id INTEGER NOT NULL REFERENCES workspace_pages(id) ON DELETE CASCADE,
            mission           TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'pending',
            bboxes            TEXT NOT NULL DEFAULT '[]',
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedule_events (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            start       TEXT NOT NULL,
            end         TEXT NOT NULL,
            type        TEXT NOT NULL DEFAULT 'phase',
            notes       TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_project
            ON schedule_events(project_id, start);

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_project
            ON messages(project_id, id);

        CREATE TABLE IF NOT EXISTS conversation_state (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id      TEXT NOT NULL UNIQUE REFERENCES projects(id) ON DELETE CASCADE,
            summary         TEXT NOT NULL DEFAULT '',
            total_exchanges INTEGER NOT NULL DEFAULT 0,
            compactions     INTEGER NOT NULL DEFAULT 0,
            last_compaction TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS experience_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            tool        TEXT NOT NULL,
            details     TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );",
    )?;
    Ok(())
}
