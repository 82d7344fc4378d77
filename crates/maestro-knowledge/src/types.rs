use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// One extracted region on a page (pass 1 gives the outline; pass 2, when
/// present, is the deep content stored in [`RegionPointer`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub region_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub detail_number: Option<String>,
}

/// Deep pass-2 content for a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionPointer {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default)]
    pub crop_path: String,
}

/// One sheet of the plan set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgePage {
    pub name: String,
    /// Filesystem directory for this page (page.png, pass1.json, pointers/).
    pub path: String,
    #[serde(default)]
    pub page_type: String,
    #[serde(default)]
    pub discipline: String,
    #[serde(default)]
    pub sheet_reflection: String,
    #[serde(default)]
    pub index: serde_json::Value,
    #[serde(default)]
    pub cross_references: Vec<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
    /// region id → pass-2 content. BTreeMap keeps listing order stable.
    #[serde(default)]
    pub pointers: BTreeMap<String, RegionPointer>,
}

impl KnowledgePage {
    /// Regions that have no pass-2 pointer yet.
    pub fn regions_without_pointer(&self) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| !r.id.is_empty() && !self.pointers.contains_key(&r.id))
            .collect()
    }
}

/// The whole loaded project: page map plus the aggregated index built by the
/// ingest pipeline (materials, keywords, cross_refs, modifications,
/// broken_refs).
#[derive(Debug, Clone, Default)]
pub struct ProjectKnowledge {
    pub name: String,
    pub path: String,
    pub pages: BTreeMap<String, KnowledgePage>,
    pub index: serde_json::Value,
    pub disciplines: Vec<String>,
}

impl ProjectKnowledge {
    pub fn page_names(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }

    pub fn pointer_count(&self) -> usize {
        self.pages.values().map(|p| p.pointers.len()).sum()
    }

    /// Known knowledge gaps: broken cross-references from the aggregate
    /// index plus regions that never got a pass-2 pointer.
    pub fn gaps(&self) -> Vec<serde_json::Value> {
        let mut gaps = Vec::new();
        if let Some(broken) = self.index.get("broken_refs").and_then(|v| v.as_array()) {
            for r in broken {
                gaps.push(serde_json::json!({ "type": "broken_ref", "detail": r }));
            }
        }
        for (page_name, page) in &self.pages {
            for region in page.regions_without_pointer() {
                gaps.push(serde_json::json!({
                    "type": "missing_pass2",
                    "page": page_name,
                    "region": region.id,
                    "label": region.label,
                }));
            }
        }
        gaps
    }
}

/// Shared, lock-guarded view. Readers take the read lock and clone the
/// snapshots they need; only `update::apply_update` takes the write lock.
pub struct Knowledge {
    inner: RwLock<ProjectKnowledge>,
}

impl Knowledge {
    pub fn new(project: ProjectKnowledge) -> Self {
        Self {
            inner: RwLock::new(project),
        }
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, ProjectKnowledge> {
        self.inner.read().unwrap()
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, ProjectKnowledge> {
        self.inner.write().unwrap()
    }

    pub fn project_name(&self) -> String {
        self.read().name.clone()
    }

    pub fn page_names(&self) -> Vec<String> {
        self.read().page_names()
    }

    /// Detached copy of one page.
    pub fn get_page(&self, name: &str) -> Option<KnowledgePage> {
        self.read().pages.get(name).cloned()
    }
}
