//! Knowledge store query tools — read-only access to everything the ingest
//! pipeline extracted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use maestro_knowledge::discipline;
use maestro_knowledge::resolve::{resolve_candidate, Resolution};

use super::{object_schema, req_str, opt_str, Tool, ToolContext, ToolOutput};

/// Fuzzy-resolve a user-supplied page token against the loaded page map.
pub(crate) fn resolve_project_page(ctx: &ToolContext, query: &str) -> Result<String, ToolOutput> {
    let names = ctx.knowledge.page_names();
    match resolve_candidate(query, &names) {
        Resolution::One(name) => Ok(name),
        Resolution::Many(set) => Err(ToolOutput::failure(format!(
            "ambiguous page name '{query}': matches {}",
            set.join(", ")
        ))),
        Resolution::None => Err(ToolOutput::failure(format!(
            "Page '{query}' not found. Use list_pages to see available pages."
        ))),
    }
}

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ListDisciplines { ctx: ctx.clone() }),
        Box::new(ListPages { ctx: ctx.clone() }),
        Box::new(GetSheetSummary { ctx: ctx.clone() }),
        Box::new(GetSheetIndex { ctx: ctx.clone() }),
        Box::new(ListRegions { ctx: ctx.clone() }),
        Box::new(GetRegionDetail { ctx: ctx.clone() }),
        Box::new(Search { ctx: ctx.clone() }),
        Box::new(FindCrossReferences { ctx: ctx.clone() }),
        Box::new(ListModifications { ctx: ctx.clone() }),
        Box::new(CheckGaps { ctx }),
    ]
}

struct ListDisciplines {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListDisciplines {
    fn name(&self) -> &str {
        "list_disciplines"
    }
    fn description(&self) -> &str {
        "List all disciplines in the project"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[])
    }
    async fn execute(&self, _input: Value) -> ToolOutput {
        ToolOutput::json(&self.ctx.knowledge.read().disciplines)
    }
}

struct ListPages {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListPages {
    fn name(&self) -> &str {
        "list_pages"
    }
    fn description(&self) -> &str {
        "List all pages, optionally filtered by discipline"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[(
            "discipline",
            "string",
            "Filter by discipline name (MEP covers Mechanical, Electrical and Plumbing)",
            false,
        )])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let filter = opt_str(&input, "discipline");
        let project = self.ctx.knowledge.read();
        let mut pages: Vec<Value> = project
            .pages
            .values()
            .filter(|p| {
                filter.map_or(true, |f| {
                    discipline::matches_filter(discipline::canonicalize(&p.discipline), f)
                })
            })
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "type": p.page_type,
                    "discipline": p.discipline,
                    "region_count": p.regions.len(),
                })
            })
            .collect();
        pages.sort_by_key(|p| p["name"].as_str().unwrap_or("").to_lowercase());
        ToolOutput::json(&pages)
    }
}

struct GetSheetSummary {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for GetSheetSummary {
    fn name(&self) -> &str {
        "get_sheet_summary"
    }
    fn description(&self) -> &str {
        "Get the superintendent briefing for a page"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("page_name", "string", "Page to summarize", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "page_name") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let name = match resolve_project_page(&self.ctx, query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let page = self.ctx.knowledge.get_page(&name).unwrap_or_default();
        if page.sheet_reflection.is_empty() {
            ToolOutput::text("No summary available")
        } else {
            ToolOutput::text(page.sheet_reflection)
        }
    }
}

struct GetSheetIndex {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for GetSheetIndex {
    fn name(&self) -> &str {
        "get_sheet_index"
    }
    fn description(&self) -> &str {
        "Get the searchable index for a page (keywords, materials, cross-refs)"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("page_name", "string", "Page to index", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "page_name") {
            Ok(s) => s,
            Err(out) => return out,
        };
        match resolve_project_page(&self.ctx, query) {
            Ok(name) => {
                let page = self.ctx.knowledge.get_page(&name).unwrap_or_default();
                ToolOutput::json(&page.index)
            }
            Err(out) => out,
        }
    }
}

struct ListRegions {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListRegions {
    fn name(&self) -> &str {
        "list_regions"
    }
    fn description(&self) -> &str {
        "List all detail regions on a page"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("page_name", "string", "Page to list regions for", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "page_name") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let name = match resolve_project_page(&self.ctx, query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let page = self.ctx.knowledge.get_page(&name).unwrap_or_default();
        let regions: Vec<Value> = page
            .regions
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "type": r.region_type,
                    "label": r.label,
                    "detail_number": r.detail_number,
                    "has_pass2": !r.id.is_empty() && page.pointers.contains_key(&r.id),
                })
            })
            .collect();
        ToolOutput::json(&regions)
    }
}

struct GetRegionDetail {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for GetRegionDetail {
    fn name(&self) -> &str {
        "get_region_detail"
    }
    fn description(&self) -> &str {
        "Get the deep technical brief for a region/pointer"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("page_name", "string", "Page holding the region", true),
            ("region_id", "string", "Region id from list_regions", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (query, region_id) = match (req_str(&input, "page_name"), req_str(&input, "region_id"))
        {
            (Ok(p), Ok(r)) => (p, r),
            (Err(out), _) | (_, Err(out)) => return out,
        };
        let name = match resolve_project_page(&self.ctx, query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let page = self.ctx.knowledge.get_page(&name).unwrap_or_default();
        match page.pointers.get(region_id) {
            Some(pointer) if !pointer.content_markdown.is_empty() => {
                ToolOutput::text(pointer.content_markdown.clone())
            }
            Some(_) => ToolOutput::text("No detail available"),
            None => ToolOutput::failure(format!(
                "Region '{region_id}' not found on '{name}'. Use list_regions to see available regions."
            )),
        }
    }
}

struct Search {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for Search {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Search all pages and pointers for a keyword, material, or term"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("query", "string", "Term to search for", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "query") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let needle = query.to_lowercase();
        let project = self.ctx.knowledge.read();
        let mut results: Vec<Value> = Vec::new();

        for section in ["materials", "keywords"] {
            if let Some(map) = project.index.get(section).and_then(|v| v.as_object()) {
                for (term, sources) in map {
                    if term.to_lowercase().contains(&needle) {
                        results.push(serde_json::json!({
                            "type": section.trim_end_matches('s'),
                            "match": term,
                            "found_in": sources,
                        }));
                    }
                }
            }
        }

        for (page_name, page) in &project.pages {
            if page.sheet_reflection.to_lowercase().contains(&needle) {
                results.push(serde_json::json!({
                    "type": "page",
                    "match": page_name,
                    "context": "sheet_reflection",
                }));
            }
            for (pointer_id, pointer) in &page.pointers {
                if pointer.content_markdown.to_lowercase().contains(&needle) {
                    results.push(serde_json::json!({
                        "type": "pointer",
                        "match": format!("{page_name}/{pointer_id}"),
                        "context": "content_markdown",
                    }));
                }
            }
        }

        if results.is_empty() {
            ToolOutput::text(format!("No results for '{query}'"))
        } else {
            ToolOutput::json(&results)
        }
    }
}

struct FindCrossReferences {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for FindCrossReferences {
    fn name(&self) -> &str {
        "find_cross_references"
    }
    fn description(&self) -> &str {
        "Find what sheets reference a page and what it references"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[("page_name", "string", "Page to cross-reference", true)])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let query = match req_str(&input, "page_name") {
            Ok(s) => s,
            Err(out) => return out,
        };
        let name = match resolve_project_page(&self.ctx, query) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let project = self.ctx.knowledge.read();
        let page = match project.pages.get(&name) {
            Some(p) => p,
            None => return ToolOutput::failure(format!("Page '{name}' not found")),
        };
        let refs_to = project
            .index
            .get("cross_refs")
            .and_then(|v| v.get(&name))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        ToolOutput::json(&serde_json::json!({
            "references_from_this_page": page.cross_references,
            "pages_that_reference_this": refs_to,
        }))
    }
}

struct ListModifications {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for ListModifications {
    fn name(&self) -> &str {
        "list_modifications"
    }
    fn description(&self) -> &str {
        "List all install/demolish/protect items across the project"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[])
    }
    async fn execute(&self, _input: Value) -> ToolOutput {
        let project = self.ctx.knowledge.read();
        let mods = project
            .index
            .get("modifications")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        ToolOutput::json(&mods)
    }
}

struct CheckGaps {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for CheckGaps {
    fn name(&self) -> &str {
        "check_gaps"
    }
    fn description(&self) -> &str {
        "Find broken cross-references and regions missing deep analysis"
    }
    fn input_schema(&self) -> Value {
        object_schema(&[])
    }
    async fn execute(&self, _input: Value) -> ToolOutput {
        let gaps = self.ctx.knowledge.read().gaps();
        if gaps.is_empty() {
            ToolOutput::text("No gaps found")
        } else {
            ToolOutput::json(&gaps)
        }
    }
}
