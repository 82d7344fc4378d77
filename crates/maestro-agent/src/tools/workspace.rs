//! Workspace CRUD tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use maestro_knowledge::resolve::{resolve_candidate, Resolution};
use maestro_store::workspace::slugify;

use super::knowledge::resolve_project_page;
use super::{object_schema, opt_str, req_str, store_failure, Tool, ToolContext, ToolOutput};

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(CreateWorkspace { ctx: ctx.clone() }),
        Box::new(ListWorkspaces { ctx: ctx.clone() }),
        Box::new(GetWorkspace { ctx: ctx.clone() }),
        Box::new(AddPage { ctx: ctx.clone() }),
        Box::new(RemovePage { ctx: ctx.clone() }),
        Box::new(AddNote { ctx: ctx.clone() }),
        Box::new(AddDescription { ctx: ctx.clone() }),
        Box::new(RemoveHighlight { ctx }),
    ]
}

/// Resolve a workspace reference to its stored slug.
pub(crate) fn resolve_slug(ctx: &ToolContext, query: &str) -> Result<String, ToolOutput> {
    match ctx.store.resolve_workspace_slug(&ctx.project_id, query) {
        Ok(Some(slug)) => Ok(slug),
        Ok(None) => Err(ToolOutput::failure(format!(
            "Workspace '{query}' not found."
        ))),
        Err(e) => Err(store_failure(e)),
    }
}

/// Resolve a page token against the pages already in a workspace.
pub(crate) fn resolve_workspace_page(
    ctx: &ToolContext,
    workspace_query: &str,
    page_query: &str,
) -> Result<(String, String), ToolOutput> {
    let slug = resolve_slug(ctx, workspace_query)?;
    let detail = match ctx.store.get_workspace(&ctx.project_id, &slug) {
        Ok(Some(d)) => d,
        Ok(None) => {
            return Err(ToolOutput::failure(format!(
                "Workspace '{workspace_query}' not found."
            )))
        }
        Err(e) => return Err(store_failure(e)),
    };
    let names: Vec<String> = detail
        .pages
        .iter()
        .map(|p| p.page.page_name.clone())
        .collect();
    match resolve_candidate(page_query, &names) {
        Resolution::One(name) => Ok((slug, name)),
        Resolution::Many(set) => Err(ToolOutput::failure(format!(
            "ambiguous page name '{page_query}' in workspace '{slug}': matches {}",
            set.join(", ")
        ))),
        Resolution::None => Err(ToolOutput::failure(format!(
            "Page '{page_query}' is not in workspace '{slug}'."
        ))),
    }
}

struct CreateWorkspace {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for CreateWorkspace {
    fn name(&self) -> &str {
        "create_workspace"
    }
    fn description(&self) -> &str {
        "Create a focused workspace for a scope of work (e.g. 'Foundation & Framing'). \
         Returns the existing workspace if one with the same slug already exists."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("title", "string", "Workspace title", true),
            ("description", "string", "What this scope of work covers", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (title, description) =
            match (req_str(&input, "title"), req_str(&input, "description")) {
                (Ok(t), Ok(d)) => (t.trim(), d.trim()),
                (Err(out), _) | (_, Err(out)) => return out,
            };
        let slug = slugify(title);
        match self
            .ctx
            .store
            .create_workspace(&self.ctx.project_id, title, description, &slug)
        {
            Ok(ws) => ToolOutput::json(&ws),
            Err(e) => store_failure(e),
        }
    }
}

struct ListWorkspaces {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListWorkspaces {
    fn name(&self) -> &str {
        "list_workspaces"
    }
    fn description(&self) -> &str {
        "List all workspaces with their page and note counts"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[])
    }
    async fn execute(&self, _input: Value) -> ToolOutput {
        match self.ctx.store.list_workspaces(&self.ctx.project_id) {
            Ok(list) => ToolOutput::json(&serde_json::json!({ "workspaces": list })),
            Err(e) => store_failure(e),
        }
    }
}

struct GetWorkspace {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for GetWorkspace {
    fn name(&self) -> &str {
        "get_workspace"
    }
    fn description(&self) -> &str {
        "Get a workspace's full contents: pages, highlights, and notes"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("workspace_slug", "string", "Workspace slug or title", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "workspace_slug") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let slug = match resolve_slug(&self.ctx, query) {
            Ok(s) => s,
            Err(out) => return out,
        };
        match self.ctx.store.get_workspace(&self.ctx.project_id, &slug) {
            Ok(Some(detail)) => ToolOutput::json(&detail),
            Ok(None) => ToolOutput::failure(format!("Workspace '{query}' not found.")),
            Err(e) => store_failure(e),
        }
    }
}

struct AddPage {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for AddPage {
    fn name(&self) -> &str {
        "add_page"
    }
    fn description(&self) -> &str {
        "Add a knowledge page to a workspace. Page names match fuzzily \
         (sheet numbers like 'K 211' work)."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("page_name", "string", "Page to add (fuzzy match)", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, page_query) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "page_name"),
        ) {
            (Ok(w), Ok(p)) => (w, p),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        let slug = match resolve_slug(&self.ctx, ws_query) {
            Ok(s) => s,
            Err(out) => return out,
        };
        let page_name = match resolve_project_page(&self.ctx, page_query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        match self
            .ctx
            .store
            .add_page(&self.ctx.project_id, &slug, &page_name, "")
        {
            Ok(page) => ToolOutput::json(&page),
            Err(e) => store_failure(e),
        }
    }
}

struct RemovePage {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for RemovePage {
    fn name(&self) -> &str {
        "remove_page"
    }
    fn description(&self) -> &str {
        "Remove a page from a workspace"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("page_name", "string", "Page to remove (fuzzy match)", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, page_query) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "page_name"),
        ) {
            (Ok(w), Ok(p)) => (w, p),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        let (slug, page_name) = match resolve_workspace_page(&self.ctx, ws_query, page_query) {
            Ok(pair) => pair,
            Err(out) => return out,
        };
        match self
            .ctx
            .store
            .remove_page(&self.ctx.project_id, &slug, &page_name)
        {
            Ok(()) => ToolOutput::text(format!("Removed '{page_name}' from '{slug}'.")),
            Err(e) => store_failure(e),
        }
    }
}

struct AddNote {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for AddNote {
    fn name(&self) -> &str {
        "add_note"
    }
    fn description(&self) -> &str {
        "Attach an observation or finding to a workspace"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("note_text", "string", "The observation", true),
            ("source_page", "string", "Page the note came from (fuzzy match)", false),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, note_text) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "note_text"),
        ) {
            (Ok(w), Ok(n)) => (w, n),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        let slug = match resolve_slug(&self.ctx, ws_query) {
            Ok(s) => s,
            Err(out) => return out,
        };
        let source_page = match opt_str(&input, "source_page") {
            Some(sp) => match resolve_project_page(&self.ctx, sp) {
                Ok(resolved) => Some(resolved),
                Err(out) => return out,
            },
            None => None,
        };
        match self.ctx.store.add_note(
            &self.ctx.project_id,
            &slug,
            note_text.trim(),
            "maestro",
            source_page.as_deref(),
        ) {
            Ok(note) => ToolOutput::json(&note),
            Err(e) => store_failure(e),
        }
    }
}

struct AddDescription {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for AddDescription {
    fn name(&self) -> &str {
        "add_description"
    }
    fn description(&self) -> &str {
        "Set the description on a workspace page — what matters on this sheet \
         for this scope of work"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("page_name", "string", "Page to describe (fuzzy match)", true),
            ("description", "string", "The description", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, page_query, description) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "page_name"),
            req_str(&input, "description"),
        ) {
            (Ok(w), Ok(p), Ok(d)) => (w, p, d),
            (Err(out), _, _) | (_, Err(out), _) | (_, _, Err(out)) => return out,
        };
        let (slug, page_name) = match resolve_workspace_page(&self.ctx, ws_query, page_query) {
            Ok(pair) => pair,
            Err(out) => return out,
        };
        match self.ctx.store.add_description(
            &self.ctx.project_id,
            &slug,
            &page_name,
            description.trim(),
        ) {
            Ok(()) => ToolOutput::text(format!("Updated description for '{page_name}'.")),
            Err(e) => store_failure(e),
        }
    }
}

struct RemoveHighlight {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for RemoveHighlight {
    fn name(&self) -> &str {
        "remove_highlight"
    }
    fn description(&self) -> &str {
        "Delete a highlight overlay from a workspace page"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("page_name", "string", "Page the highlight is on", true),
            ("highlight_id", "integer", "Highlight id from get_workspace", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, page_query) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "page_name"),
        ) {
            (Ok(w), Ok(p)) => (w, p),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        // accept both integer and numeric-string ids
        let highlight_id = match input.get("highlight_id") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(highlight_id) = highlight_id else {
            return ToolOutput::failure(format!(
                "Invalid highlight id '{}'.",
                input.get("highlight_id").cloned().unwrap_or(Value::Null)
            ));
        };
        let (slug, page_name) = match resolve_workspace_page(&self.ctx, ws_query, page_query) {
            Ok(pair) => pair,
            Err(out) => return out,
        };
        match self.ctx.store.remove_highlight(
            &self.ctx.project_id,
            &slug,
            &page_name,
            highlight_id,
        ) {
            Ok(()) => ToolOutput::text(format!("Removed highlight {highlight_id}.")),
            Err(e) => store_failure(e),
        }
    }
}
