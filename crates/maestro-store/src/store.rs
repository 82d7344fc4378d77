use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use maestro_core::events::{Event, EventBus};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{ConversationState, ExperienceLogEntry, MessageRow, Project};

/// Thread-safe handle over the single SQLite database.
///
/// Wraps one connection in a `Mutex` — at most one transaction progresses at
/// a time, which matches the single-logical-writer model of the rest of the
/// system. Readers receive detached row structs, never live references.
pub struct Store {
    pub(crate) db: Mutex<Connection>,
    pub(crate) bus: EventBus,
}

/// Fixed-precision RFC 3339 so stored timestamps compare lexicographically
/// in chronological order.
pub(crate) fn now() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn new_project_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

pub(crate) fn new_event_id() -> String {
    format!("evt_{}", &Uuid::new_v4().simple().to_string()[..8])
}

impl Store {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &str, bus: EventBus) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            bus,
        })
    }

    /// In-memory database, used by tests and the interactive chat binary.
    pub fn open_in_memory(bus: EventBus) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            bus,
        })
    }

    pub(crate) fn emit(&self, event: Event) {
        // Fire-and-forget: emissions never roll back a transaction.
        self.bus.emit(event);
    }

    // ── Projects ─────────────────────────────────────────────────────────

    /// Idempotent by name: returns the existing project unchanged when one
    /// with this name already exists.
    pub fn get_or_create_project(&self, name: &str, path: &str) -> Result<Project> {
        let db = self.db.lock().unwrap();
        if let Some(existing) = query_project_by_name(&db, name)? {
            debug!(project_id = %existing.id, "project exists");
            return Ok(existing);
        }

        let id = new_project_id();
        let created = now();
        db.execute(
            "INSERT OR IGNORE INTO projects (id, name, path, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, path, created],
        )?;

        // Read back — covers the race where two callers insert the same name.
        let project = query_project_by_name(&db, name)?
            .ok_or_else(|| StoreError::precondition(format!("project '{name}' vanished")))?;
        info!(project_id = %project.id, %name, "project created");
        Ok(project)
    }

    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, name, path, created_at FROM projects WHERE id = ?1",
            [project_id],
            row_to_project,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deleting a project cascades to every descendant row.
    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
        if n == 0 {
            return Err(StoreError::precondition(format!(
                "Project '{project_id}' not found."
            )));
        }
        info!(%project_id, "project deleted");
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Append one conversation turn. Returns the assigned monotonic id and
    /// emits a `message` event.
    pub fn add_message(&self, project_id: &str, role: &str, content: &str) -> Result<i64> {
        let id = {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO messages (project_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![project_id, role, content, now()],
            )?;
            db.last_insert_rowid()
        };
        self.emit(Event::Message {
            role: role.to_string(),
            content: content.to_string(),
        });
        Ok(id)
    }

    /// All messages for a project in id order.
    pub fn get_messages(&self, project_id: &str) -> Result<Vec<MessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, project_id, role, content, created_at
             FROM messages WHERE project_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([project_id], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The latest `n` messages in id order.
    pub fn get_recent_messages(&self, project_id: &str, n: usize) -> Result<Vec<MessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, project_id, role, content, created_at
             FROM (SELECT * FROM messages WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![project_id, n as i64], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Paginated page for the REST surface: messages with id < `before`,
    /// newest first, at most `limit` rows.
    pub fn get_messages_page(
        &self,
        project_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        let db = self.db.lock().unwrap();
        let cutoff = before.unwrap_or(i64::MAX);
        let mut stmt = db.prepare(
            "SELECT id, project_id, role, content, created_at
             FROM messages WHERE project_id = ?1 AND id < ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![project_id, cutoff, limit as i64],
            row_to_message,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_messages(&self, project_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Compaction primitive: delete every message with id < `cutoff_id`.
    /// Returns the number of rows removed.
    pub fn delete_messages_before(&self, project_id: &str, cutoff_id: i64) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM messages WHERE project_id = ?1 AND id < ?2",
            rusqlite::params![project_id, cutoff_id],
        )?;
        Ok(n)
    }

    /// The compaction commit: deletion of old rows and the summary update
    /// happen in one transaction — an observer never sees deleted rows
    /// without the new summary. Emits a `compaction` event on success.
    pub fn compact_messages(
        &self,
        project_id: &str,
        cutoff_id: i64,
        new_summary: &str,
    ) -> Result<usize> {
        let deleted = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM messages WHERE project_id = ?1 AND id < ?2",
                rusqlite::params![project_id, cutoff_id],
            )?;
            tx.execute(
                "UPDATE conversation_state
                 SET summary = ?2, compactions = compactions + 1, last_compaction = ?3
                 WHERE project_id = ?1",
                rusqlite::params![project_id, new_summary, now()],
            )?;
            tx.commit()?;
            deleted
        };
        info!(%project_id, deleted, "conversation compacted");
        self.emit(Event::Compaction {
            deleted,
            summary_length: new_summary.len(),
        });
        Ok(deleted)
    }

    // ── Conversation state ───────────────────────────────────────────────

    pub fn get_or_create_conversation(&self, project_id: &str) -> Result<ConversationState> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO conversation_state (project_id, created_at)
             VALUES (?1, ?2)",
            rusqlite::params![project_id, now()],
        )?;
        let state = db.query_row(
            "SELECT project_id, summary, total_exchanges, compactions, last_compaction, created_at
             FROM conversation_state WHERE project_id = ?1",
            [project_id],
            row_to_conversation_state,
        )?;
        Ok(state)
    }

    /// Partial update: any combination of summary replacement, exchange bump
    /// and compaction bump.
    pub fn update_conversation_state(
        &self,
        project_id: &str,
        summary: Option<&str>,
        bump_exchanges: bool,
        bump_compactions: bool,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        if let Some(s) = summary {
            db.execute(
                "UPDATE conversation_state SET summary = ?2 WHERE project_id = ?1",
                rusqlite::params![project_id, s],
            )?;
        }
        if bump_exchanges {
            db.execute(
                "UPDATE conversation_state SET total_exchanges = total_exchanges + 1
                 WHERE project_id = ?1",
                [project_id],
            )?;
        }
        if bump_compactions {
            db.execute(
                "UPDATE conversation_state
                 SET compactions = compactions + 1, last_compaction = ?2
                 WHERE project_id = ?1",
                rusqlite::params![project_id, now()],
            )?;
        }
        Ok(())
    }

    // ── Experience log ───────────────────────────────────────────────────

    /// Append-only audit trail for learning-tool invocations.
    pub fn log_experience(&self, tool: &str, details: &serde_json::Value) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO experience_log (tool, details, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![tool, details.to_string(), now()],
        )?;
        Ok(())
    }

    pub fn list_experience(&self, limit: usize) -> Result<Vec<ExperienceLogEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tool, details, created_at FROM experience_log
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let details_text: String = row.get(2)?;
            Ok(ExperienceLogEntry {
                id: row.get(0)?,
                tool: row.get(1)?,
                details: serde_json::from_str(&details_text)
                    .unwrap_or(serde_json::Value::Null),
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

// ── Row mappers ──────────────────────────────────────────────────────────

fn query_project_by_name(db: &Connection, name: &str) -> Result<Option<Project>> {
    match db.query_row(
        "SELECT id, name, path, created_at FROM projects WHERE name = ?1",
        [name],
        row_to_project,
    ) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_conversation_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationState> {
    Ok(ConversationState {
        project_id: row.get(0)?,
        summary: row.get(1)?,
        total_exchanges: row.get(2)?,
        compactions: row.get(3)?,
        last_compaction: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory(EventBus::new()).unwrap()
    }

    #[test]
    fn project_creation_is_idempotent_by_name() {
        let store = test_store();
        let a = store.get_or_create_project("Dairy Queen", "/tmp/ks").unwrap();
        let b = store.get_or_create_project("Dairy Queen", "/elsewhere").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.path, "/tmp/ks");
    }

    #[test]
    fn message_ids_are_strictly_increasing_in_insert_order() {
        let store = test_store();
        let p = store.get_or_create_project("p", "").unwrap();
        store.add_message(&p.id, "user", "a").unwrap();
        store.add_message(&p.id, "assistant", "b").unwrap();
        store.add_message(&p.id, "user", "c").unwrap();

        let rows = store.get_messages(&p.id).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].id < rows[1].id && rows[1].id < rows[2].id);
        let contents: Vec<_> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        // created_at order agrees with id order
        assert!(rows[0].created_at <= rows[1].created_at);
        assert!(rows[1].created_at <= rows[2].created_at);
    }

    #[test]
    fn recent_messages_window_preserves_order() {
        let store = test_store();
        let p = store.get_or_create_project("p", "").unwrap();
        for i in 0..10 {
            store.add_message(&p.id, "user", &format!("m{i}")).unwrap();
        }
        let recent = store.get_recent_messages(&p.id, 3).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn compact_messages_deletes_and_bumps_atomically() {
        let store = test_store();
        let p = store.get_or_create_project("p", "").unwrap();
        store.get_or_create_conversation(&p.id).unwrap();
        let mut ids = Vec::new();
        for i in 0..30 {
            ids.push(store.add_message(&p.id, "user", &format!("m{i}")).unwrap());
        }
        let cutoff = ids[10];
        let deleted = store.compact_messages(&p.id, cutoff, "summary text").unwrap();
        assert_eq!(deleted, 10);
        assert_eq!(store.count_messages(&p.id).unwrap(), 20);

        let state = store.get_or_create_conversation(&p.id).unwrap();
        assert_eq!(state.summary, "summary text");
        assert_eq!(state.compactions, 1);
        assert!(state.last_compaction.is_some());
        // the 20 largest ids survive
        let remaining: Vec<i64> = store.get_messages(&p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(remaining, ids[10..].to_vec());
    }

    #[test]
    fn add_message_emits_message_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let store = Store::open_in_memory(bus).unwrap();
        let p = store.get_or_create_project("p", "").unwrap();
        store.add_message(&p.id, "user", "hello").unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["role"], "user");
        assert_eq!(event["content"], "hello");
    }

    #[test]
    fn experience_log_round_trip() {
        let store = test_store();
        store
            .log_experience("update_knowledge", &serde_json::json!({"page": "A111"}))
            .unwrap();
        let entries = store.list_experience(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool, "update_knowledge");
        assert_eq!(entries[0].details["page"], "A111");
    }
}
