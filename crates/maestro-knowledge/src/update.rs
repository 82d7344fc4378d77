//! The only write path into the knowledge store.
//!
//! Patches either a page's `pass1.json` (sheet_reflection / index /
//! cross_references) or a region's `pass2.json` (content_markdown). The
//! on-disk artifact is written atomically (temp file + rename) and the
//! in-memory page is updated under the write lock, so readers never observe
//! a torn page.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::error::{KnowledgeError, Result};
use crate::types::Knowledge;

/// Write `value` to `path` atomically.
fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let tmp: PathBuf = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value).unwrap_or_default())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| KnowledgeError::InvalidJson {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(KnowledgeError::InvalidJson {
            path: path.display().to_string(),
            detail: "not a JSON object".to_string(),
        });
    }
    Ok(value)
}

impl Knowledge {
    /// Apply one knowledge correction. Returns the human-readable outcome
    /// string that goes back to the LLM; stated-precondition failures come
    /// back as [`KnowledgeError::Update`].
    pub fn apply_update(
        &self,
        page_name: &str,
        field: &str,
        value: &str,
        region_id: Option<&str>,
    ) -> Result<String> {
        // Write lock for the whole patch: disk write and in-memory update
        // must be atomic from any reader's viewpoint.
        let mut project = self.write();

        let page = project
            .pages
            .get_mut(page_name)
            .ok_or_else(|| KnowledgeError::Update(format!("Page '{page_name}' not found")))?;
        let page_dir = PathBuf::from(&page.path);

        if let (Some(region), "content_markdown") = (region_id, field) {
            let pointer = page.pointers.get_mut(region).ok_or_else(|| {
                KnowledgeError::Update(format!("Region '{region}' not found on '{page_name}'"))
            })?;

            let pass2_path = page_dir.join("pointers").join(region).join("pass2.json");
            if !pass2_path.exists() {
                return Err(KnowledgeError::Update(format!(
                    "No pass2.json for region '{region}'"
                )));
            }
            let mut data = read_json(&pass2_path)?;
            data["content_markdown"] = Value::String(value.to_string());
            write_json_atomic(&pass2_path, &data)?;
            pointer.content_markdown = value.to_string();

            info!(%page_name, %region, "region content updated");
            return Ok(format!("OK: updated {page_name}/{region} content_markdown"));
        }

        let pass1_path = page_dir.join("pass1.json");
        if !pass1_path.exists() {
            return Err(KnowledgeError::Update(format!(
                "No pass1.json for page '{page_name}'"
            )));
        }
        let mut data = read_json(&pass1_path)?;

        let outcome = match field {
            "sheet_reflection" => {
                data["sheet_reflection"] = Value::String(value.to_string());
                page.sheet_reflection = value.to_string();
                format!("OK: updated {page_name} sheet_reflection")
            }
            "index" => {
                let patch: Value = serde_json::from_str(value).map_err(|_| {
                    KnowledgeError::Update("index value must be valid JSON".to_string())
                })?;
                let patch_obj = patch.as_object().ok_or_else(|| {
                    KnowledgeError::Update("index value must be a JSON object".to_string())
                })?;
                if !data["index"].is_object() {
                    data["index"] = Value::Object(Default::default());
                }
                if !page.index.is_object() {
                    page.index = Value::Object(Default::default());
                }
                for (k, v) in patch_obj {
                    data["index"][k] = v.clone();
                    page.index[k] = v.clone();
                }
                format!("OK: merged {page_name} index")
            }
            "cross_references" => {
                let additions: Value = serde_json::from_str(value).map_err(|_| {
                    KnowledgeError::Update("cross_references value must be valid JSON".to_string())
                })?;
                let list = additions.as_array().ok_or_else(|| {
                    KnowledgeError::Update("cross_references value must be a JSON array".to_string())
                })?;
                let mut existing = data["cross_references"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                existing.extend(list.iter().cloned());
                data["cross_references"] = Value::Array(existing);
                page.cross_references.extend(
                    list.iter().filter_map(|v| v.as_str().map(String::from)),
                );
                format!("OK: added cross_references to {page_name}")
            }
            other => {
                return Err(KnowledgeError::Update(format!(
                    "unknown field '{other}' for page update"
                )))
            }
        };

        write_json_atomic(&pass1_path, &data)?;
        info!(%page_name, %field, "page knowledge updated");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_project;

    fn seed(root: &Path) -> Knowledge {
        let page_dir = root.join("pages/A_111_FLOOR_FINISH_PLAN_p001");
        fs::create_dir_all(page_dir.join("pointers/r1")).unwrap();
        fs::write(root.join("project.json"), r#"{"name": "t"}"#).unwrap();
        fs::write(
            page_dir.join("pass1.json"),
            r#"{"sheet_reflection": "old", "discipline": "Architectural",
                "index": {"keywords": ["tile"]}, "cross_references": ["A_112"],
                "regions": [{"id": "r1", "label": "Finish schedule"}]}"#,
        )
        .unwrap();
        fs::write(
            page_dir.join("pointers/r1/pass2.json"),
            r#"{"label": "Finish schedule", "content_markdown": "old detail"}"#,
        )
        .unwrap();
        Knowledge::new(load_project(root.to_str().unwrap()).unwrap())
    }

    #[test]
    fn sheet_reflection_update_hits_disk_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = seed(dir.path());

        let msg = knowledge
            .apply_update("A_111_FLOOR_FINISH_PLAN_p001", "sheet_reflection", "new text", None)
            .unwrap();
        assert!(msg.starts_with("OK:"));

        let page = knowledge.get_page("A_111_FLOOR_FINISH_PLAN_p001").unwrap();
        assert_eq!(page.sheet_reflection, "new text");

        let on_disk: Value = serde_json::from_str(
            &fs::read_to_string(
                dir.path().join("pages/A_111_FLOOR_FINISH_PLAN_p001/pass1.json"),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk["sheet_reflection"], "new text");
    }

    #[test]
    fn region_content_update_requires_existing_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = seed(dir.path());

        knowledge
            .apply_update(
                "A_111_FLOOR_FINISH_PLAN_p001",
                "content_markdown",
                "revised detail",
                Some("r1"),
            )
            .unwrap();
        let page = knowledge.get_page("A_111_FLOOR_FINISH_PLAN_p001").unwrap();
        assert_eq!(page.pointers["r1"].content_markdown, "revised detail");

        let err = knowledge
            .apply_update("A_111_FLOOR_FINISH_PLAN_p001", "content_markdown", "x", Some("r9"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn index_merge_and_cross_reference_extend() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = seed(dir.path());

        knowledge
            .apply_update(
                "A_111_FLOOR_FINISH_PLAN_p001",
                "index",
                r#"{"materials": ["epoxy"]}"#,
                None,
            )
            .unwrap();
        knowledge
            .apply_update(
                "A_111_FLOOR_FINISH_PLAN_p001",
                "cross_references",
                r#"["S_201"]"#,
                None,
            )
            .unwrap();

        let page = knowledge.get_page("A_111_FLOOR_FINISH_PLAN_p001").unwrap();
        assert_eq!(page.index["materials"][0], "epoxy");
        assert_eq!(page.index["keywords"][0], "tile");
        assert_eq!(page.cross_references, vec!["A_112", "S_201"]);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = seed(dir.path());
        assert!(knowledge
            .apply_update("A_111_FLOOR_FINISH_PLAN_p001", "index", "not json", None)
            .is_err());
        assert!(knowledge
            .apply_update("A_111_FLOOR_FINISH_PLAN_p001", "mystery_field", "x", None)
            .is_err());
        assert!(knowledge
            .apply_update("NOPE", "sheet_reflection", "x", None)
            .is_err());
    }
}
