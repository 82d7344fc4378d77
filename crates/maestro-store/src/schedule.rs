//! Schedule events — iCal-ish calendar entries scoped to the project.
//! Dates are stored as `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM[:SS]` strings and
//! compared lexicographically, which agrees with chronological order.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::info;

use maestro_core::events::Event;

use crate::error::{Result, StoreError};
use crate::store::{new_event_id, now, Store};
use crate::types::ScheduleEvent;

impl Store {
    /// Add an event. `end` defaults to `start`; `event_type` is lowercased.
    pub fn add_event(
        &self,
        project_id: &str,
        title: &str,
        start: &str,
        end: Option<&str>,
        event_type: &str,
        notes: &str,
    ) -> Result<ScheduleEvent> {
        let end = end.unwrap_or(start);
        if end < start {
            return Err(StoreError::precondition(format!(
                "Event end '{end}' is before start '{start}'."
            )));
        }
        let event = {
            let db = self.db.lock().unwrap();
            let id = new_event_id();
            db.execute(
                "INSERT INTO schedule_events
                 (id, project_id, title, start, end, type, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    project_id,
                    title,
                    start,
                    end,
                    event_type.to_lowercase(),
                    notes,
                    now()
                ],
            )?;
            query_event(&db, project_id, &id)?
                .ok_or_else(|| StoreError::precondition(format!("event '{id}' vanished")))?
        };
        info!(event_id = %event.id, %title, "schedule event added");
        self.emit(Event::Schedule {
            action: "added".into(),
            event_id: event.id.clone(),
        });
        Ok(event)
    }

    pub fn get_event(&self, project_id: &str, event_id: &str) -> Result<Option<ScheduleEvent>> {
        let db = self.db.lock().unwrap();
        query_event(&db, project_id, event_id)
    }

    /// All events, optionally narrowed by date range and type, in start order.
    pub fn list_events(
        &self,
        project_id: &str,
        from_date: Option<&str>,
        to_date: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<Vec<ScheduleEvent>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, project_id, title, start, end, type, notes, created_at
             FROM schedule_events WHERE project_id = ?1 ORDER BY start, id",
        )?;
        let rows = stmt.query_map([project_id], row_to_event)?;
        let type_filter = event_type.map(|t| t.to_lowercase());
        let events = rows
            .filter_map(|r| r.ok())
            .filter(|e| from_date.map_or(true, |f| e.end.as_str() >= f))
            .filter(|e| to_date.map_or(true, |t| e.start.as_str() <= t))
            .filter(|e| type_filter.as_deref().map_or(true, |t| e.event_type == t))
            .collect();
        Ok(events)
    }

    /// Events overlapping the next `days` days.
    pub fn upcoming_events(&self, project_id: &str, days: i64) -> Result<Vec<ScheduleEvent>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let horizon = (Utc::now() + Duration::days(days))
            .format("%Y-%m-%d")
            .to_string();
        // horizon date is inclusive: "YYYY-MM-DD~" sorts after any datetime
        // suffix on that day.
        let horizon_end = format!("{horizon}~");
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, project_id, title, start, end, type, notes, created_at
             FROM schedule_events
             WHERE project_id = ?1 AND start <= ?2 AND end >= ?3
             ORDER BY start, id",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![project_id, horizon_end, today],
            row_to_event,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Update any subset of an event's fields.
    pub fn update_event(
        &self,
        project_id: &str,
        event_id: &str,
        title: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        event_type: Option<&str>,
        notes: Option<&str>,
    ) -> Result<ScheduleEvent> {
        let event = {
            let db = self.db.lock().unwrap();
            let current = query_event(&db, project_id, event_id)?.ok_or_else(|| {
                StoreError::precondition(format!("Event '{event_id}' not found."))
            })?;

            let new_title = title.unwrap_or(&current.title);
            let new_start = start.unwrap_or(&current.start);
            let new_end = end.unwrap_or(&current.end);
            let new_type = event_type
                .map(|t| t.to_lowercase())
                .unwrap_or(current.event_type.clone());
            let new_notes = notes.unwrap_or(&current.notes);

            if new_end < new_start {
                return Err(StoreError::precondition(format!(
                    "Event end '{new_end}' is before start '{new_start}'."
                )));
            }

            db.execute(
                "UPDATE schedule_events
                 SET title = ?3, start = ?4, end = ?5, type = ?6, notes = ?7
                 WHERE project_id = ?1 AND id = ?2",
                rusqlite::params![
                    project_id, event_id, new_title, new_start, new_end, new_type, new_notes
                ],
            )?;
            query_event(&db, project_id, event_id)?.ok_or_else(|| {
                StoreError::precondition(format!("event '{event_id}' vanished"))
            })?
        };
        self.emit(Event::Schedule {
            action: "updated".into(),
            event_id: event_id.to_string(),
        });
        Ok(event)
    }

    pub fn remove_event(&self, project_id: &str, event_id: &str) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            let n = db.execute(
                "DELETE FROM schedule_events WHERE project_id = ?1 AND id = ?2",
                rusqlite::params![project_id, event_id],
            )?;
            if n == 0 {
                return Err(StoreError::precondition(format!(
                    "Event '{event_id}' not found."
                )));
            }
        }
        info!(%event_id, "schedule event removed");
        self.emit(Event::Schedule {
            action: "removed".into(),
            event_id: event_id.to_string(),
        });
        Ok(())
    }
}

fn query_event(
    db: &Connection,
    project_id: &str,
    event_id: &str,
) -> Result<Option<ScheduleEvent>> {
    match db.query_row(
        "SELECT id, project_id, title, start, end, type, notes, created_at
         FROM schedule_events WHERE project_id = ?1 AND id = ?2",
        rusqlite::params![project_id, event_id],
        row_to_event,
    ) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleEvent> {
    Ok(ScheduleEvent {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        start: row.get(3)?,
        end: row.get(4)?,
        event_type: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
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
    fn end_defaults_to_start_and_type_is_lowercased() {
        let (store, pid) = seeded();
        let e = store
            .add_event(&pid, "Footing pour", "2026-08-04", None, "Milestone", "")
            .unwrap();
        assert_eq!(e.end, "2026-08-04");
        assert_eq!(e.event_type, "milestone");
        assert!(e.id.starts_with("evt_"));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let (store, pid) = seeded();
        let err = store
            .add_event(&pid, "Backwards", "2026-08-04", Some("2026-08-01"), "phase", "")
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn list_filters_by_range_and_type() {
        let (store, pid) = seeded();
        store.add_event(&pid, "A", "2026-08-01", None, "phase", "").unwrap();
        store.add_event(&pid, "B", "2026-08-10", None, "inspection", "").unwrap();
        store.add_event(&pid, "C", "2026-08-20", None, "phase", "").unwrap();

        let all = store.list_events(&pid, None, None, None).unwrap();
        assert_eq!(all.len(), 3);

        let ranged = store
            .list_events(&pid, Some("2026-08-05"), Some("2026-08-15"), None)
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].title, "B");

        let typed = store.list_events(&pid, None, None, Some("Phase")).unwrap();
        assert_eq!(typed.len(), 2);
    }

    #[test]
    fn upcoming_window_catches_near_events() {
        let (store, pid) = seeded();
        let tomorrow = (Utc::now() + Duration::days(1)).format("%Y-%m-%d").to_string();
        let far = (Utc::now() + Duration::days(30)).format("%Y-%m-%d").to_string();
        store.add_event(&pid, "Soon", &tomorrow, None, "inspection", "").unwrap();
        store.add_event(&pid, "Later", &far, None, "phase", "").unwrap();

        let upcoming = store.upcoming_events(&pid, 2).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Soon");
    }

    #[test]
    fn update_preserves_unset_fields() {
        let (store, pid) = seeded();
        let e = store
            .add_event(&pid, "Pour", "2026-08-04", Some("2026-08-05"), "phase", "deck 2")
            .unwrap();
        let updated = store
            .update_event(&pid, &e.id, Some("Pour — deck 2"), None, None, None, None)
            .unwrap();
        assert_eq!(updated.title, "Pour — deck 2");
        assert_eq!(updated.start, "2026-08-04");
        assert_eq!(updated.end, "2026-08-05");
        assert_eq!(updated.notes, "deck 2");
    }

    #[test]
    fn remove_unknown_event_is_a_precondition_failure() {
        let (store, pid) = seeded();
        assert!(store.remove_event(&pid, "evt_missing").unwrap_err().is_precondition());
    }
}
