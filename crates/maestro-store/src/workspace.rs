//! Workspace operations: the focused scopes of work the assistant maintains,
//! their page references, notes and highlight overlays.

use rusqlite::Connection;
use tracing::info;

use maestro_core::events::Event;

use crate::error::{Result, StoreError};
use crate::store::{now, Store};
use crate::types::{
    BBox, HighlightStatus, PageWithHighlights, Workspace, WorkspaceDetail, WorkspaceHighlight,
    WorkspaceNote, WorkspacePage, WorkspaceSummary,
};

/// Stable lowercase identifier derived from a title: alnum runs survive,
/// everything else collapses to single underscores.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_underscore = true;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "workspace".to_string()
    } else {
        slug
    }
}

impl Store {
    /// Create a workspace, or return the existing row unchanged when the
    /// slug is already taken for this project.
    pub fn create_workspace(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        slug: &str,
    ) -> Result<Workspace> {
        let (workspace, created) = {
            let db = self.db.lock().unwrap();
            if let Some(existing) = query_workspace(&db, project_id, slug)? {
                (existing, false)
            } else {
                let ts = now();
                db.execute(
                    "INSERT INTO workspaces
                     (project_id, slug, title, description, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
                    rusqlite::params![project_id, slug, title, description, ts],
                )?;
                let ws = query_workspace(&db, project_id, slug)?.ok_or_else(|| {
                    StoreError::precondition(format!("workspace '{slug}' vanished"))
                })?;
                (ws, true)
            }
        };
        if created {
            info!(%project_id, slug, "workspace created");
            self.emit(Event::Workspace {
                action: "created".into(),
                slug: slug.to_string(),
            });
        }
        Ok(workspace)
    }

    /// Resolve a user-supplied workspace reference to a stored slug.
    /// Tries exact slug, then the slugified query, then a case-insensitive
    /// title match, in that order.
    pub fn resolve_workspace_slug(&self, project_id: &str, query: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        if query_workspace(&db, project_id, query)?.is_some() {
            return Ok(Some(query.to_string()));
        }
        let slug = slugify(query);
        if query_workspace(&db, project_id, &slug)?.is_some() {
            return Ok(Some(slug));
        }
        match db.query_row(
            "SELECT slug FROM workspaces
             WHERE project_id = ?1 AND LOWER(title) = LOWER(?2)",
            rusqlite::params![project_id, query],
            |row| row.get::<_, String>(0),
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_workspaces(&self, project_id: &str) -> Result<Vec<WorkspaceSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT w.slug, w.title, w.description, w.status, w.created_at, w.updated_at,
                    (SELECT COUNT(*) FROM workspace_pages p WHERE p.workspace_id = w.id),
                    (SELECT COUNT(*) FROM workspace_notes n WHERE n.workspace_id = w.id)
             FROM workspaces w WHERE w.project_id = ?1 ORDER BY w.created_at",
        )?;
        let rows = stmt.query_map([project_id], |row| {
            Ok(WorkspaceSummary {
                slug: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
                page_count: row.get::<_, i64>(6)? as usize,
                note_count: row.get::<_, i64>(7)? as usize,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Full payload: metadata, pages with their highlights, notes.
    pub fn get_workspace(&self, project_id: &str, slug: &str) -> Result<Option<WorkspaceDetail>> {
        let db = self.db.lock().unwrap();
        let Some(workspace) = query_workspace(&db, project_id, slug)? else {
            return Ok(None);
        };

        let mut stmt = db.prepare(
            "SELECT id, workspace_id, page_name, description, added_at
             FROM workspace_pages WHERE workspace_id = ?1 ORDER BY added_at, id",
        )?;
        let pages: Vec<WorkspacePage> = stmt
            .query_map([workspace.id], row_to_page)?
            .filter_map(|r| r.ok())
            .collect();

        let mut pages_with_highlights = Vec::with_capacity(pages.len());
        for page in pages {
            let mut hstmt = db.prepare(
                "SELECT id, workspace_page_id, mission, status, bboxes, created_at
                 FROM workspace_highlights WHERE workspace_page_id = ?1 ORDER BY id",
            )?;
            let highlights: Vec<WorkspaceHighlight> = hstmt
                .query_map([page.id], row_to_highlight)?
                .filter_map(|r| r.ok())
                .collect();
            pages_with_highlights.push(PageWithHighlights { page, highlights });
        }

        let mut nstmt = db.prepare(
            "SELECT id, workspace_id, text, source, source_page, added_at
             FROM workspace_notes WHERE workspace_id = ?1 ORDER BY id",
        )?;
        let notes: Vec<WorkspaceNote> = nstmt
            .query_map([workspace.id], row_to_note)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(Some(WorkspaceDetail {
            workspace,
            pages: pages_with_highlights,
            notes,
        }))
    }

    // ── Pages ────────────────────────────────────────────────────────────

    pub fn add_page(
        &self,
        project_id: &str,
        slug: &str,
        page_name: &str,
        description: &str,
    ) -> Result<WorkspacePage> {
        let page = {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            if page_exists(&db, workspace.id, page_name)? {
                return Err(StoreError::precondition(format!(
                    "Page '{page_name}' is already in workspace '{slug}'."
                )));
            }
            db.execute(
                "INSERT INTO workspace_pages (workspace_id, page_name, description, added_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![workspace.id, page_name, description, now()],
            )?;
            touch_workspace(&db, workspace.id)?;
            query_page(&db, workspace.id, page_name)?.ok_or_else(|| {
                StoreError::precondition(format!("page '{page_name}' vanished"))
            })?
        };
        self.emit(Event::Workspace {
            action: "page_added".into(),
            slug: slug.to_string(),
        });
        Ok(page)
    }

    pub fn remove_page(&self, project_id: &str, slug: &str, page_name: &str) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            let n = db.execute(
                "DELETE FROM workspace_pages WHERE workspace_id = ?1 AND page_name = ?2",
                rusqlite::params![workspace.id, page_name],
            )?;
            if n == 0 {
                return Err(StoreError::precondition(format!(
                    "Page '{page_name}' is not in workspace '{slug}'."
                )));
            }
            touch_workspace(&db, workspace.id)?;
        }
        self.emit(Event::Workspace {
            action: "page_removed".into(),
            slug: slug.to_string(),
        });
        Ok(())
    }

    /// Set the free-form description on a workspace page.
    pub fn add_description(
        &self,
        project_id: &str,
        slug: &str,
        page_name: &str,
        description: &str,
    ) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            let n = db.execute(
                "UPDATE workspace_pages SET description = ?3
                 WHERE workspace_id = ?1 AND page_name = ?2",
                rusqlite::params![workspace.id, page_name, description],
            )?;
            if n == 0 {
                return Err(StoreError::precondition(format!(
                    "Page '{page_name}' is not in workspace '{slug}'."
                )));
            }
            touch_workspace(&db, workspace.id)?;
        }
        self.emit(Event::PageDescriptionUpdated {
            workspace_slug: slug.to_string(),
            page_name: page_name.to_string(),
        });
        Ok(())
    }

    // ── Notes ────────────────────────────────────────────────────────────

    pub fn add_note(
        &self,
        project_id: &str,
        slug: &str,
        text: &str,
        source: &str,
        source_page: Option<&str>,
    ) -> Result<WorkspaceNote> {
        if text.trim().is_empty() {
            return Err(StoreError::precondition("Note text is required."));
        }
        let note = {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            db.execute(
                "INSERT INTO workspace_notes (workspace_id, text, source, source_page, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![workspace.id, text, source, source_page, now()],
            )?;
            let id = db.last_insert_rowid();
            touch_workspace(&db, workspace.id)?;
            db.query_row(
                "SELECT id, workspace_id, text, source, source_page, added_at
                 FROM workspace_notes WHERE id = ?1",
                [id],
                row_to_note,
            )?
        };
        self.emit(Event::Workspace {
            action: "note_added".into(),
            slug: slug.to_string(),
        });
        Ok(note)
    }

    // ── Highlights ───────────────────────────────────────────────────────

    /// Create a pending highlight request on a workspace page and announce
    /// it to the dashboard.
    pub fn add_highlight(
        &self,
        project_id: &str,
        slug: &str,
        page_name: &str,
        mission: &str,
    ) -> Result<WorkspaceHighlight> {
        let highlight = {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            let page = query_page(&db, workspace.id, page_name)?.ok_or_else(|| {
                StoreError::precondition(format!(
                    "Page '{page_name}' is not in workspace '{slug}'."
                ))
            })?;
            db.execute(
                "INSERT INTO workspace_highlights
                 (workspace_page_id, mission, status, bboxes, created_at)
                 VALUES (?1, ?2, 'pending', '[]', ?3)",
                rusqlite::params![page.id, mission, now()],
            )?;
            let id = db.last_insert_rowid();
            touch_workspace(&db, workspace.id)?;
            query_highlight(&db, id)?.ok_or_else(|| {
                StoreError::precondition(format!("highlight '{id}' vanished"))
            })?
        };
        self.emit(Event::PageHighlightStarted {
            workspace_slug: slug.to_string(),
            page_name: page_name.to_string(),
            mission: mission.to_string(),
        });
        Ok(highlight)
    }

    /// `pending → complete` with a non-empty validated box set. Boxes are
    /// deduplicated at 4-decimal precision; out-of-range boxes are rejected.
    pub fn complete_highlight(&self, highlight_id: i64, bboxes: &[BBox]) -> Result<()> {
        let mut kept: Vec<BBox> = Vec::new();
        let mut seen: Vec<(i64, i64, i64, i64)> = Vec::new();
        for b in bboxes {
            let valid = b.x >= 0.0
                && b.y >= 0.0
                && b.w > 0.0
                && b.h > 0.0
                && b.x + b.w <= 1.0 + 1e-9
                && b.y + b.h <= 1.0 + 1e-9;
            if !valid {
                continue;
            }
            let key = (round4(b.x), round4(b.y), round4(b.w), round4(b.h));
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            kept.push(*b);
        }
        if kept.is_empty() {
            return Err(StoreError::precondition(
                "Highlight has no valid bounding boxes.",
            ));
        }

        let (slug, page_name) = {
            let db = self.db.lock().unwrap();
            let (slug, page_name) = highlight_context(&db, highlight_id)?;
            let current = require_highlight(&db, highlight_id)?;
            if current.status.is_terminal() {
                return Err(StoreError::precondition(format!(
                    "Highlight {} is already {}.",
                    highlight_id,
                    current.status.as_str()
                )));
            }
            db.execute(
                "UPDATE workspace_highlights SET status = 'complete', bboxes = ?2
                 WHERE id = ?1",
                rusqlite::params![highlight_id, serde_json::to_string(&kept)?],
            )?;
            (slug, page_name)
        };
        self.emit(Event::PageHighlightComplete {
            workspace_slug: slug,
            page_name,
            highlight_id,
            box_count: kept.len(),
        });
        Ok(())
    }

    /// `pending → failed`. Terminal rows do not transition further.
    pub fn fail_highlight(&self, highlight_id: i64) -> Result<()> {
        let (slug, page_name) = {
            let db = self.db.lock().unwrap();
            let (slug, page_name) = highlight_context(&db, highlight_id)?;
            let current = require_highlight(&db, highlight_id)?;
            if current.status.is_terminal() {
                return Err(StoreError::precondition(format!(
                    "Highlight {} is already {}.",
                    highlight_id,
                    current.status.as_str()
                )));
            }
            db.execute(
                "UPDATE workspace_highlights SET status = 'failed' WHERE id = ?1",
                [highlight_id],
            )?;
            (slug, page_name)
        };
        self.emit(Event::PageHighlightFailed {
            workspace_slug: slug,
            page_name,
            highlight_id,
        });
        Ok(())
    }

    pub fn get_highlight(&self, highlight_id: i64) -> Result<Option<WorkspaceHighlight>> {
        let db = self.db.lock().unwrap();
        query_highlight(&db, highlight_id)
    }

    pub fn remove_highlight(
        &self,
        project_id: &str,
        slug: &str,
        page_name: &str,
        highlight_id: i64,
    ) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            let workspace = require_workspace(&db, project_id, slug)?;
            let page = query_page(&db, workspace.id, page_name)?.ok_or_else(|| {
                StoreError::precondition(format!(
                    "Page '{page_name}' is not in workspace '{slug}'."
                ))
            })?;
            let n = db.execute(
                "DELETE FROM workspace_highlights WHERE id = ?1 AND workspace_page_id = ?2",
                rusqlite::params![highlight_id, page.id],
            )?;
            if n == 0 {
                return Err(StoreError::precondition(format!(
                    "Highlight {highlight_id} not found on '{page_name}' in workspace '{slug}'."
                )));
            }
            touch_workspace(&db, workspace.id)?;
        }
        self.emit(Event::Workspace {
            action: "highlight_removed".into(),
            slug: slug.to_string(),
        });
        Ok(())
    }
}

fn round4(v: f64) -> i64 {
    (v * 10_000.0).round() as i64
}

// ── Private query helpers ────────────────────────────────────────────────

fn query_workspace(db: &Connection, project_id: &str, slug: &str) -> Result<Option<Workspace>> {
    match db.query_row(
        "SELECT id, project_id, slug, title, description, status, created_at, updated_at
         FROM workspaces WHERE project_id = ?1 AND slug = ?2",
        rusqlite::params![project_id, slug],
        row_to_workspace,
    ) {
        Ok(w) => Ok(Some(w)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn require_workspace(db: &Connection, project_id: &str, slug: &str) -> Result<Workspace> {
    query_workspace(db, project_id, slug)?
        .ok_or_else(|| StoreError::precondition(format!("Workspace '{slug}' not found.")))
}

fn page_exists(db: &Connection, workspace_id: i64, page_name: &str) -> Result<bool> {
    let n: i64 = db.query_row(
        "SELECT COUNT(*) FROM workspace_pages WHERE workspace_id = ?1 AND page_name = ?2",
        rusqlite::params![workspace_id, page_name],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn query_page(
    db: &Connection,
    workspace_id: i64,
    page_name: &str,
) -> Result<Option<WorkspacePage>> {
    match db.query_row(
        "SELECT id, workspace_id, page_name, description, added_at
         FROM workspace_pages WHERE workspace_id = ?1 AND page_name = ?2",
        rusqlite::params![workspace_id, page_name],
        row_to_page,
    ) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_highlight(db: &Connection, id: i64) -> Result<Option<WorkspaceHighlight>> {
    match db.query_row(
        "SELECT id, workspace_page_id, mission, status, bboxes, created_at
         FROM workspace_highlights WHERE id = ?1",
        [id],
        row_to_highlight,
    ) {
        Ok(h) => Ok(Some(h)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn require_highlight(db: &Connection, id: i64) -> Result<WorkspaceHighlight> {
    query_highlight(db, id)?
        .ok_or_else(|| StoreError::precondition(format!("Highlight {id} not found.")))
}

/// Workspace slug + page name for a highlight, for event payloads.
fn highlight_context(db: &Connection, highlight_id: i64) -> Result<(String, String)> {
    match db.query_row(
        "SELECT w.slug, p.page_name
         FROM workspace_highlights h
         JOIN workspace_pages p ON p.id = h.workspace_page_id
         JOIN workspaces w ON w.id = p.workspace_id
         WHERE h.id = ?1",
        [highlight_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    ) {
        Ok(pair) => Ok(pair),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::precondition(format!(
            "Highlight {highlight_id} not found."
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Any child mutation advances the parent workspace's `updated_at`.
fn touch_workspace(db: &Connection, workspace_id: i64) -> Result<()> {
    db.execute(
        "UPDATE workspaces SET updated_at = ?2 WHERE id = ?1",
        rusqlite::params![workspace_id, now()],
    )?;
    Ok(())
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        project_id: row.get(1)?,
        slug: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspacePage> {
    Ok(WorkspacePage {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        page_name: row.get(2)?,
        description: row.get(3)?,
        added_at: row.get(4)?,
    })
}

fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceNote> {
    Ok(WorkspaceNote {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        text: row.get(2)?,
        source: row.get(3)?,
        source_page: row.get(4)?,
        added_at: row.get(5)?,
    })
}

fn row_to_highlight(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceHighlight> {
    let status_text: String = row.get(3)?;
    let bboxes_text: String = row.get(4)?;
    Ok(WorkspaceHighlight {
        id: row.get(0)?,
        workspace_page_id: row.get(1)?,
        mission: row.get(2)?,
        status: status_text.parse().unwrap_or(HighlightStatus::Failed),
        bboxes: serde_json::from_str(&bboxes_text).unwrap_or_default(),
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::events::EventBus;

    fn seeded() -> (Store, String) {
        let store = Store::open_in_memory(EventBus::new()).unwrap();
        let p = store.get_or_create_project("test", "").unwrap();
        (store, p.id)
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Foundation & Framing"), "foundation_framing");
        assert_eq!(slugify("  Walk-In Cooler!!"), "walk_in_cooler");
        assert_eq!(slugify("***"), "workspace");
    }

    #[test]
    fn create_add_remove_page_flow() {
        // Scenario: create workspace, add two pages, remove one.
        let (store, pid) = seeded();
        let ws = store
            .create_workspace(&pid, "Foundation & Framing", "Grade beams + framing",
                &slugify("Foundation & Framing"))
            .unwrap();
        assert_eq!(ws.slug, "foundation_framing");

        let counts = |store: &Store| {
            store.list_workspaces(&pid).unwrap()[0].page_count
        };
        assert_eq!(counts(&store), 0);
        store
            .add_page(&pid, "foundation_framing", "S-101 Structural Foundation Plan", "")
            .unwrap();
        assert_eq!(counts(&store), 1);
        store
            .add_page(&pid, "foundation_framing", "S-102 Structural Framing Plan", "")
            .unwrap();
        assert_eq!(counts(&store), 2);
        store
            .remove_page(&pid, "foundation_framing", "S-101 Structural Foundation Plan")
            .unwrap();
        assert_eq!(counts(&store), 1);

        let detail = store.get_workspace(&pid, "foundation_framing").unwrap().unwrap();
        assert_eq!(detail.pages.len(), 1);
        assert_eq!(detail.pages[0].page.page_name, "S-102 Structural Framing Plan");
    }

    #[test]
    fn duplicate_slug_returns_existing_unchanged() {
        let (store, pid) = seeded();
        let a = store.create_workspace(&pid, "Roof", "original", "roof").unwrap();
        let b = store.create_workspace(&pid, "Roof v2", "changed", "roof").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.title, "Roof");
        assert_eq!(b.description, "original");
    }

    #[test]
    fn resolve_slug_tries_exact_then_slugified_then_title() {
        let (store, pid) = seeded();
        store
            .create_workspace(&pid, "Foundation & Framing", "d", "foundation_framing")
            .unwrap();

        let r = |q: &str| store.resolve_workspace_slug(&pid, q).unwrap();
        assert_eq!(r("foundation_framing").as_deref(), Some("foundation_framing"));
        assert_eq!(r("Foundation & Framing").as_deref(), Some("foundation_framing"));
        assert_eq!(r("FOUNDATION & FRAMING").as_deref(), Some("foundation_framing"));
        assert_eq!(r("plumbing"), None);
    }

    #[test]
    fn duplicate_page_is_a_precondition_failure() {
        let (store, pid) = seeded();
        store.create_workspace(&pid, "Roof", "d", "roof").unwrap();
        store.add_page(&pid, "roof", "A-501", "").unwrap();
        let err = store.add_page(&pid, "roof", "A-501", "").unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("already in workspace"));
    }

    #[test]
    fn child_mutations_advance_updated_at() {
        let (store, pid) = seeded();
        let ws = store.create_workspace(&pid, "Roof", "d", "roof").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_note(&pid, "roof", "check flashing", "maestro", None).unwrap();
        let after = store.get_workspace(&pid, "roof").unwrap().unwrap();
        assert!(after.workspace.updated_at > ws.updated_at);
    }

    #[test]
    fn highlight_lifecycle_pending_to_complete() {
        let (store, pid) = seeded();
        store.create_workspace(&pid, "Roof", "d", "roof").unwrap();
        store.add_page(&pid, "roof", "A-501", "").unwrap();
        let h = store.add_highlight(&pid, "roof", "A-501", "find the drains").unwrap();
        assert_eq!(h.status, HighlightStatus::Pending);
        assert!(h.bboxes.is_empty());

        let boxes = vec![
            BBox { x: 0.1, y: 0.2, w: 0.3, h: 0.3 },
            BBox { x: 0.1, y: 0.2, w: 0.3, h: 0.3 }, // duplicate at 4 decimals
            BBox { x: 0.5, y: 0.5, w: 0.0, h: 0.1 }, // degenerate
        ];
        store.complete_highlight(h.id, &boxes).unwrap();

        let done = store.get_highlight(h.id).unwrap().unwrap();
        assert_eq!(done.status, HighlightStatus::Complete);
        assert_eq!(done.bboxes.len(), 1);
        assert_eq!(done.bboxes[0], BBox { x: 0.1, y: 0.2, w: 0.3, h: 0.3 });

        // terminal rows do not transition further
        assert!(store.fail_highlight(h.id).unwrap_err().is_precondition());
        assert!(store.complete_highlight(h.id, &boxes).unwrap_err().is_precondition());
    }

    #[test]
    fn highlight_lifecycle_pending_to_failed() {
        let (store, pid) = seeded();
        store.create_workspace(&pid, "Roof", "d", "roof").unwrap();
        store.add_page(&pid, "roof", "A-501", "").unwrap();
        let h = store.add_highlight(&pid, "roof", "A-501", "m").unwrap();
        store.fail_highlight(h.id).unwrap();
        let failed = store.get_highlight(h.id).unwrap().unwrap();
        assert_eq!(failed.status, HighlightStatus::Failed);
        assert!(store
            .complete_highlight(h.id, &[BBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 }])
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn cascade_delete_clears_every_descendant() {
        let (store, pid) = seeded();
        store.get_or_create_conversation(&pid).unwrap();
        store.create_workspace(&pid, "Roof", "d", "roof").unwrap();
        store.add_page(&pid, "roof", "A-501", "").unwrap();
        store.add_note(&pid, "roof", "note", "maestro", None).unwrap();
        store.add_highlight(&pid, "roof", "A-501", "m").unwrap();
        store.add_message(&pid, "user", "hi").unwrap();
        store
            .add_event(&pid, "Pour", "2026-08-04", None, "milestone", "")
            .unwrap();

        store.delete_project(&pid).unwrap();

        let db = store.db.lock().unwrap();
        for table in [
            "workspaces",
            "workspace_pages",
            "workspace_notes",
            "workspace_highlights",
            "schedule_events",
            "messages",
            "conversation_state",
        ] {
            let n: i64 = db
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(n, 0, "{table} not empty after cascade");
        }
    }

    #[test]
    fn mutation_events_fire_and_failures_stay_silent() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let store = Store::open_in_memory(bus).unwrap();
        let p = store.get_or_create_project("t", "").unwrap();

        store.create_workspace(&p.id, "Roof", "d", "roof").unwrap();
        assert_eq!(rx.try_recv().unwrap()["type"], "workspace");

        // precondition failure → no event
        let _ = store.remove_page(&p.id, "roof", "missing");
        assert!(rx.try_recv().is_err());
    }
}
