//! Startup loader: knowledge directory → [`ProjectKnowledge`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{KnowledgeError, Result};
use crate::types::{KnowledgePage, ProjectKnowledge, Region, RegionPointer};

fn load_json(path: &Path) -> Option<Value> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unparseable JSON");
            None
        }
    }
}

/// Load the project at `root` (the directory holding `project.json`,
/// `index.json` and `pages/`).
pub fn load_project(root: &str) -> Result<ProjectKnowledge> {
    let root_path = Path::new(root);
    if !root_path.is_dir() {
        return Err(KnowledgeError::NotFound(root.to_string()));
    }

    let project_meta = load_json(&root_path.join("project.json")).unwrap_or(Value::Null);
    let name = project_meta
        .get("name")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| {
            root_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        });

    let index = load_json(&root_path.join("index.json")).unwrap_or_else(|| Value::Object(Default::default()));

    let mut pages = BTreeMap::new();
    let pages_dir = root_path.join("pages");
    if pages_dir.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(&pages_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        entries.sort_by_key(|e| e.file_name().to_string_lossy().to_lowercase());

        for entry in entries {
            let page_dir = entry.path();
            let page_name = entry.file_name().to_string_lossy().to_string();
            pages.insert(page_name.clone(), load_page(&page_name, &page_dir));
        }
    }

    let disciplines = derive_disciplines(&project_meta, &pages);

    let project = ProjectKnowledge {
        name,
        path: root.to_string(),
        pages,
        index,
        disciplines,
    };

    info!(
        project = %project.name,
        pages = project.pages.len(),
        pointers = project.pointer_count(),
        "knowledge store loaded"
    );
    Ok(project)
}

fn load_page(page_name: &str, page_dir: &Path) -> KnowledgePage {
    let mut page = KnowledgePage {
        name: page_name.to_string(),
        path: page_dir.to_string_lossy().to_string(),
        page_type: "unknown".to_string(),
        discipline: "General".to_string(),
        ..Default::default()
    };

    if let Some(pass1) = load_json(&page_dir.join("pass1.json")) {
        if let Some(s) = pass1.get("sheet_reflection").and_then(|v| v.as_str()) {
            page.sheet_reflection = s.to_string();
        }
        if let Some(s) = pass1.get("page_type").and_then(|v| v.as_str()) {
            page.page_type = s.to_string();
        }
        if let Some(s) = pass1.get("discipline").and_then(|v| v.as_str()) {
            if !s.trim().is_empty() {
                page.discipline = s.to_string();
            }
        }
        if let Some(idx) = pass1.get("index") {
            if idx.is_object() {
                page.index = idx.clone();
            }
        }
        if let Some(refs) = pass1.get("cross_references").and_then(|v| v.as_array()) {
            page.cross_references = refs
                .iter()
                .filter_map(|r| r.as_str().map(String::from))
                .collect();
        }
        if let Some(regions) = pass1.get("regions").and_then(|v| v.as_array()) {
            page.regions = regions
                .iter()
                .filter_map(|r| serde_json::from_value::<Region>(r.clone()).ok())
                .collect();
        }
    }

    let pointers_dir = page_dir.join("pointers");
    if pointers_dir.is_dir() {
        if let Ok(entries) = fs::read_dir(&pointers_dir) {
            let mut dirs: Vec<_> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .collect();
            dirs.sort_by_key(|e| e.file_name().to_string_lossy().to_lowercase());

            for entry in dirs {
                let region_id = entry.file_name().to_string_lossy().to_string();
                let mut pointer = load_json(&entry.path().join("pass2.json"))
                    .and_then(|v| serde_json::from_value::<RegionPointer>(v).ok())
                    .unwrap_or_default();
                pointer.crop_path = entry.path().join("crop.png").to_string_lossy().to_string();
                page.pointers.insert(region_id, pointer);
            }
        }
    }

    page
}

fn derive_disciplines(
    project_meta: &Value,
    pages: &BTreeMap<String, KnowledgePage>,
) -> Vec<String> {
    if let Some(listed) = project_meta.get("disciplines").and_then(|v| v.as_array()) {
        let mut out: Vec<String> = listed
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !out.is_empty() {
            out.sort();
            out.dedup();
            return out;
        }
    }
    let mut out: Vec<String> = pages
        .values()
        .map(|p| {
            let d = p.discipline.trim();
            if d.is_empty() { "General" } else { d }.to_string()
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn seed_store(root: &Path) {
        write(
            &root.join("project.json"),
            r#"{"name": "Dairy Queen 42", "total_pages": 2}"#,
        );
        write(
            &root.join("index.json"),
            r#"{"keywords": {"grease": [["K_211", "r1"]]}, "broken_refs": ["A-999"]}"#,
        );
        write(
            &root.join("pages/K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001/pass1.json"),
            r#"{
                "sheet_reflection": "Enlarged equipment plan for the kitchen.",
                "page_type": "plan",
                "discipline": "Kitchen",
                "index": {"keywords": ["grease"]},
                "cross_references": ["P_401"],
                "regions": [
                    {"id": "r1", "type": "detail", "label": "Cooler pad"},
                    {"id": "r2", "type": "schedule", "label": "Equipment list"}
                ]
            }"#,
        );
        write(
            &root.join("pages/K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001/pointers/r1/pass2.json"),
            r#"{"label": "Cooler pad", "content_markdown": "6 in. pad, 3500 psi"}"#,
        );
        write(
            &root.join("pages/P_401_PLUMBING_RISERS_p001/pass1.json"),
            r#"{"sheet_reflection": "Risers.", "discipline": "Plumbing (MEP)", "regions": []}"#,
        );
    }

    #[test]
    fn loads_pages_pointers_and_index() {
        let dir = tempfile::tempdir().unwrap();
        seed_store(dir.path());

        let project = load_project(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(project.name, "Dairy Queen 42");
        assert_eq!(project.pages.len(), 2);
        assert_eq!(project.pointer_count(), 1);

        let page = &project.pages["K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001"];
        assert_eq!(page.discipline, "Kitchen");
        assert_eq!(page.regions.len(), 2);
        assert_eq!(page.pointers["r1"].content_markdown, "6 in. pad, 3500 psi");
        assert_eq!(page.regions_without_pointer().len(), 1);
        assert_eq!(project.index["broken_refs"][0], "A-999");
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(matches!(
            load_project("/nonexistent/knowledge"),
            Err(KnowledgeError::NotFound(_))
        ));
    }

    #[test]
    fn disciplines_derived_from_pages_when_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        seed_store(dir.path());
        let project = load_project(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(project.disciplines, vec!["Kitchen", "Plumbing (MEP)"]);
    }
}
