//! Discipline canonicalization.
//!
//! Raw discipline strings out of ingestion are messy ("plumbing (mep)",
//! "traffic / electrical"). A fixed table maps them onto a canonical set in
//! a fixed display order, with MEP as a synthetic parent over Mechanical,
//! Electrical and Plumbing.

use serde::Serialize;

/// Canonical disciplines in display order.
pub const CANONICAL_ORDER: &[&str] = &[
    "General",
    "Architectural",
    "Structural",
    "Civil",
    "MEP",
    "Kitchen",
    "Landscape",
    "Vapor Mitigation",
    "Canopy",
];

pub const MEP_CHILDREN: &[&str] = &["Mechanical", "Electrical", "Plumbing"];

/// Map one recognized token to its canonical discipline.
fn match_token(token: &str) -> Option<&'static str> {
    let t = token.trim().to_lowercase();
    let t = t.as_str();
    let hit = match t {
        "general" | "cover" | "index" => "General",
        "architectural" | "architecture" => "Architectural",
        "structural" | "structure" => "Structural",
        "civil" | "site" | "grading" | "traffic" => "Civil",
        "mep" => "MEP",
        "mechanical" | "hvac" => "Mechanical",
        "electrical" | "power" | "lighting" => "Electrical",
        "plumbing" | "sanitary" => "Plumbing",
        "kitchen" | "food service" | "foodservice" | "equipment" => "Kitchen",
        "landscape" | "landscaping" | "irrigation" => "Landscape",
        "vapor mitigation" | "vapor" => "Vapor Mitigation",
        "canopy" => "Canopy",
        _ => return None,
    };
    Some(hit)
}

/// Canonicalize a raw discipline string.
///
/// Compound strings (containing `/`) resolve on the first recognized token;
/// otherwise any substring match; otherwise General.
pub fn canonicalize(raw: &str) -> &'static str {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return "General";
    }

    if cleaned.contains('/') {
        for part in cleaned.split('/') {
            let part = strip_parenthetical(part);
            if let Some(hit) = match_token(&part) {
                return hit;
            }
        }
    }

    let stripped = strip_parenthetical(cleaned);
    if let Some(hit) = match_token(&stripped) {
        return hit;
    }

    // Substring scan over the known tokens, longest first so "vapor
    // mitigation" beats "vapor".
    let lower = cleaned.to_lowercase();
    let mut tokens: Vec<&str> = vec![
        "vapor mitigation",
        "architectural",
        "structural",
        "mechanical",
        "electrical",
        "plumbing",
        "landscape",
        "kitchen",
        "canopy",
        "civil",
        "vapor",
        "mep",
    ];
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
    for token in tokens {
        if lower.contains(token) {
            if let Some(hit) = match_token(token) {
                return hit;
            }
        }
    }

    "General"
}

fn strip_parenthetical(s: &str) -> String {
    match s.find('(') {
        Some(i) => s[..i].trim().to_string(),
        None => s.trim().to_string(),
    }
}

/// Whether a canonical name sits under the MEP parent.
pub fn is_mep_child(canonical: &str) -> bool {
    MEP_CHILDREN.contains(&canonical)
}

/// A page with this canonical discipline matches a filter for `filter_name`
/// when they are equal, or when the filter is MEP and the page is one of its
/// children.
pub fn matches_filter(page_canonical: &str, filter_name: &str) -> bool {
    let filter = canonicalize(filter_name);
    page_canonical == filter || (filter == "MEP" && is_mep_child(page_canonical))
}

/// One node of the discipline tree returned by the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct DisciplineNode {
    pub name: String,
    pub page_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DisciplineNode>,
}

/// Build the ordered discipline tree for a set of (raw discipline, count)
/// pairs. Disciplines with zero pages are omitted; MEP appears when any of
/// its children has pages.
pub fn discipline_tree<I>(raw_counts: I) -> Vec<DisciplineNode>
where
    I: IntoIterator<Item = (String, usize)>,
{
    use std::collections::BTreeMap;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for (raw, n) in raw_counts {
        *counts.entry(canonicalize(&raw)).or_default() += n;
    }

    let mut tree = Vec::new();
    for &name in CANONICAL_ORDER {
        if name == "MEP" {
            let mut children = Vec::new();
            for &child in MEP_CHILDREN {
                let n = counts.get(child).copied().unwrap_or(0);
                if n > 0 {
                    children.push(DisciplineNode {
                        name: child.to_string(),
                        page_count: n,
                        children: Vec::new(),
                    });
                }
            }
            let direct = counts.get("MEP").copied().unwrap_or(0);
            let total: usize = direct + children.iter().map(|c| c.page_count).sum::<usize>();
            if total > 0 {
                tree.push(DisciplineNode {
                    name: "MEP".to_string(),
                    page_count: total,
                    children,
                });
            }
        } else {
            let n = counts.get(name).copied().unwrap_or(0);
            if n > 0 {
                tree.push(DisciplineNode {
                    name: name.to_string(),
                    page_count: n,
                    children: Vec::new(),
                });
            }
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_canonicalize() {
        assert_eq!(canonicalize("Structural"), "Structural");
        assert_eq!(canonicalize("plumbing"), "Plumbing");
        assert_eq!(canonicalize("Vapor Mitigation"), "Vapor Mitigation");
    }

    #[test]
    fn parenthetical_and_compound_strings_resolve() {
        assert_eq!(canonicalize("plumbing (mep)"), "Plumbing");
        assert_eq!(canonicalize("traffic / electrical"), "Civil");
        assert_eq!(canonicalize("unknown / electrical"), "Electrical");
    }

    #[test]
    fn unknown_falls_back_to_general() {
        assert_eq!(canonicalize("mystery trade"), "General");
        assert_eq!(canonicalize(""), "General");
    }

    #[test]
    fn substring_match_prefers_longer_tokens() {
        assert_eq!(canonicalize("vapor mitigation details"), "Vapor Mitigation");
    }

    #[test]
    fn mep_filter_matches_children() {
        assert!(matches_filter("Plumbing", "MEP"));
        assert!(matches_filter("Electrical", "mep"));
        assert!(!matches_filter("Kitchen", "MEP"));
        assert!(matches_filter("Kitchen", "kitchen"));
    }

    #[test]
    fn tree_groups_mep_and_keeps_display_order() {
        let tree = discipline_tree(vec![
            ("plumbing (mep)".to_string(), 3),
            ("Electrical".to_string(), 2),
            ("Kitchen".to_string(), 4),
            ("Structural".to_string(), 1),
        ]);
        let names: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Structural", "MEP", "Kitchen"]);
        let mep = tree.iter().find(|n| n.name == "MEP").unwrap();
        assert_eq!(mep.page_count, 5);
        let children: Vec<_> = mep.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["Electrical", "Plumbing"]);
    }
}
