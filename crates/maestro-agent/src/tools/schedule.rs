//! Schedule tools — iCal-ish event CRUD over the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::{object_schema, opt_str, req_str, store_failure, Tool, ToolContext, ToolOutput};

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ListEvents { ctx: ctx.clone() }),
        Box::new(GetEvent { ctx: ctx.clone() }),
        Box::new(AddEvent { ctx: ctx.clone() }),
        Box::new(UpdateEvent { ctx: ctx.clone() }),
        Box::new(RemoveEvent { ctx: ctx.clone() }),
        Box::new(Upcoming { ctx }),
    ]
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` and `YYYY-MM-DDTHH:MM:SS`.
fn valid_date(s: &str) -> bool {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

struct ListEvents {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListEvents {
    fn name(&self) -> &str {
        "list_events"
    }
    fn description(&self) -> &str {
        "View schedule events, optionally filtered by date range or type"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("from_date", "string", "Start of range (YYYY-MM-DD)", false),
            ("to_date", "string", "End of range (YYYY-MM-DD)", false),
            ("event_type", "string", "Filter by type", false),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        match self.ctx.store.list_events(
            &self.ctx.project_id,
            opt_str(&input, "from_date"),
            opt_str(&input, "to_date"),
            opt_str(&input, "event_type"),
        ) {
            Ok(events) if events.is_empty() => ToolOutput::text("No events on the schedule."),
            Ok(events) => ToolOutput::json(&events),
            Err(e) => store_failure(e),
        }
    }
}

struct GetEvent {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for GetEvent {
    fn name(&self) -> &str {
        "get_event"
    }
    fn description(&self) -> &str {
        "Get details for a specific event"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("event_id", "string", "Event id (evt_...)", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let event_id = match req_str(&input, "event_id") {
            Ok(s) => s,
            Err(out) => return out,
        };
        match self.ctx.store.get_event(&self.ctx.project_id, event_id) {
            Ok(Some(event)) => ToolOutput::json(&event),
            Ok(None) => ToolOutput::failure(format!("Event '{event_id}' not found.")),
            Err(e) => store_failure(e),
        }
    }
}

struct AddEvent {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for AddEvent {
    fn name(&self) -> &str {
        "add_event"
    }
    fn description(&self) -> &str {
        "Add a new event to the schedule"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("title", "string", "Event title", true),
            ("start", "string", "Start date (YYYY-MM-DD)", true),
            ("end", "string", "End date, defaults to start", false),
            (
                "event_type",
                "string",
                "milestone, phase, inspection, delivery, meeting",
                false,
            ),
            ("notes", "string", "Free-form notes", false),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (title, start) = match (req_str(&input, "title"), req_str(&input, "start")) {
            (Ok(t), Ok(s)) => (t.trim(), s.trim()),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        if !valid_date(start) {
            return ToolOutput::failure(format!(
                "Invalid start date: '{start}'. Use YYYY-MM-DD format."
            ));
        }
        let end = opt_str(&input, "end");
        if let Some(e) = end {
            if !valid_date(e) {
                return ToolOutput::failure(format!(
                    "Invalid end date: '{e}'. Use YYYY-MM-DD format."
                ));
            }
        }
        match self.ctx.store.add_event(
            &self.ctx.project_id,
            title,
            start,
            end,
            opt_str(&input, "event_type").unwrap_or("phase"),
            opt_str(&input, "notes").unwrap_or(""),
        ) {
            Ok(event) => ToolOutput::json(&event),
            Err(e) => store_failure(e),
        }
    }
}

struct UpdateEvent {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for UpdateEvent {
    fn name(&self) -> &str {
        "update_event"
    }
    fn description(&self) -> &str {
        "Modify an existing event"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("event_id", "string", "Event id (evt_...)", true),
            ("title", "string", "New title", false),
            ("start", "string", "New start date", false),
            ("end", "string", "New end date", false),
            ("event_type", "string", "New type", false),
            ("notes", "string", "New notes", false),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let event_id = match req_str(&input, "event_id") {
            Ok(s) => s,
            Err(out) => return out,
        };
        for key in ["start", "end"] {
            if let Some(v) = opt_str(&input, key) {
                if !valid_date(v) {
                    return ToolOutput::failure(format!("Invalid {key} date: '{v}'."));
                }
            }
        }
        match self.ctx.store.update_event(
            &self.ctx.project_id,
            event_id,
            opt_str(&input, "title"),
            opt_str(&input, "start"),
            opt_str(&input, "end"),
            opt_str(&input, "event_type"),
            input.get("notes").and_then(|v| v.as_str()),
        ) {
            Ok(event) => ToolOutput::json(&event),
            Err(e) => store_failure(e),
        }
    }
}

struct RemoveEvent {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for RemoveEvent {
    fn name(&self) -> &str {
        "remove_event"
    }
    fn description(&self) -> &str {
        "Delete an event from the schedule"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("event_id", "string", "Event id (evt_...)", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let event_id = match req_str(&input, "event_id") {
            Ok(s) => s,
            Err(out) => return out,
        };
        match self.ctx.store.remove_event(&self.ctx.project_id, event_id) {
            Ok(()) => ToolOutput::text(format!("Event '{event_id}' removed.")),
            Err(e) => store_failure(e),
        }
    }
}

struct Upcoming {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for Upcoming {
    fn name(&self) -> &str {
        "upcoming"
    }
    fn description(&self) -> &str {
        "Quick view of events in the next N days"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("days", "integer", "Days ahead (default 7)", false)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        // the model sometimes sends days as a string
        let days = match input.get("days") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(7),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(7),
            _ => 7,
        };
        match self.ctx.store.upcoming_events(&self.ctx.project_id, days) {
            Ok(events) if events.is_empty() => ToolOutput::text(format!(
                "Nothing on the schedule for the next {days} days."
            )),
            Ok(events) => ToolOutput::json(&events),
            Err(e) => store_failure(e),
        }
    }
}
