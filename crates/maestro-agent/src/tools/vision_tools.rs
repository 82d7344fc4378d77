//! Vision tools: direct page viewing and the workspace highlight request.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use tracing::info;

use super::knowledge::resolve_project_page;
use super::workspace::resolve_workspace_page;
use super::{object_schema, req_str, store_failure, Tool, ToolContext, ToolOutput};
use crate::vision::{prepare_image, run_highlight_worker, HighlightJob};

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(SeePage { ctx: ctx.clone() }),
        Box::new(HighlightOnPage { ctx }),
    ]
}

fn page_image_path(ctx: &ToolContext, page_name: &str) -> Result<PathBuf, ToolOutput> {
    let page = ctx
        .knowledge
        .get_page(page_name)
        .ok_or_else(|| ToolOutput::failure(format!("Page '{page_name}' not found")))?;
    let path = PathBuf::from(&page.path).join("page.png");
    if !path.exists() {
        return Err(ToolOutput::failure(format!(
            "No image for '{page_name}'."
        )));
    }
    Ok(path)
}

struct SeePage {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SeePage {
    fn name(&self) -> &str {
        "see_page"
    }
    fn description(&self) -> &str {
        "Look at a page image directly. Returns the sheet as an image so you \
         can read dimensions, callouts, and anything the extracted text missed."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("page_name", "string", "Page to view (fuzzy match)", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "page_name") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let page_name = match resolve_project_page(&self.ctx, query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let image_path = match page_image_path(&self.ctx, &page_name) {
            Ok(p) => p,
            Err(out) => return out,
        };

        let prepared =
            match tokio::task::spawn_blocking(move || prepare_image(&image_path)).await {
                Ok(Ok(p)) => p,
                Ok(Err(e)) => return ToolOutput::failure(format!("Tool execution error: {e}")),
                Err(e) => return ToolOutput::failure(format!("Tool execution error: {e}")),
            };

        ToolOutput::Multimodal(vec![
            serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": "image/jpeg",
                    "data": base64::engine::general_purpose::STANDARD.encode(&prepared.jpeg),
                }
            }),
            serde_json::json!({
                "type": "text",
                "text": format!(
                    "This is page '{page_name}'. You are looking at it directly. \
                     Describe what you see."
                ),
            }),
        ])
    }
}

struct HighlightOnPage {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for HighlightOnPage {
    fn name(&self) -> &str {
        "highlight_on_page"
    }
    fn description(&self) -> &str {
        "Request a visual highlight overlay on a workspace page. Runs in the \
         background: the highlight starts pending and completes (or fails) on \
         its own; the dashboard is notified either way."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("workspace_slug", "string", "Workspace slug or title", true),
            ("page_name", "string", "Page to highlight (must be in the workspace)", true),
            ("mission", "string", "What to highlight and why", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (ws_query, page_query, mission) = match (
            req_str(&input, "workspace_slug"),
            req_str(&input, "page_name"),
            req_str(&input, "mission"),
        ) {
            (Ok(w), Ok(p), Ok(m)) => (w, p, m.trim().to_string()),
            (Err(out), _, _) | (_, Err(out), _) | (_, _, Err(out)) => return out,
        };

        let Some(google) = self.ctx.google.clone() else {
            return ToolOutput::failure("Vision is not configured (no Google API key).");
        };

        let (slug, page_name) = match resolve_workspace_page(&self.ctx, ws_query, page_query) {
            Ok(pair) => pair,
            Err(out) => return out,
        };
        let image_path = match page_image_path(&self.ctx, &page_name) {
            Ok(p) => p,
            Err(out) => return out,
        };

        // Pending row + page_highlight_started event.
        let highlight = match self
            .ctx
            .store
            .add_highlight(&self.ctx.project_id, &slug, &page_name, &mission)
        {
            Ok(h) => h,
            Err(e) => return store_failure(e),
        };

        info!(
            highlight_id = highlight.id,
            workspace = %slug,
            page = %page_name,
            "highlight queued"
        );

        let job = HighlightJob {
            store: self.ctx.store.clone(),
            google,
            highlight_id: highlight.id,
            workspace_slug: slug.clone(),
            page_name: page_name.clone(),
            mission: mission.clone(),
            image_path,
            artifact_dir: self.ctx.workspaces_dir.clone(),
            timeout: self.ctx.request_timeout,
        };
        tokio::spawn(run_highlight_worker(job));

        ToolOutput::json(&serde_json::json!({
            "highlight_id": highlight.id,
            "workspace_slug": slug,
            "page_name": page_name,
            "status": "pending",
            "message": "Highlight generation started. The dashboard will update when it completes.",
        }))
    }
}
