//! Fuzzy page-name resolution.
//!
//! Page names are long filename-ish strings
//! (`K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001`); users and the model refer
//! to them by sheet number (`K 211`, `k-211`). Matching is done on a
//! normalized form: lowercase, with runs of non-alphanumerics collapsed to
//! single underscores.

/// Normalize a token for comparison.
pub fn normalize_token(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_underscore = true;
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Outcome of resolving a user-supplied token against a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one candidate matched.
    One(String),
    /// More than one candidate matched — the full ambiguity set, sorted.
    Many(Vec<String>),
    /// Nothing matched.
    None,
}

impl Resolution {
    pub fn single(self) -> Option<String> {
        match self {
            Resolution::One(name) => Some(name),
            _ => None,
        }
    }
}

/// Resolve `query` against `candidates`: exact match first, then unique
/// normalized prefix, then unique normalized substring.
pub fn resolve_candidate(query: &str, candidates: &[String]) -> Resolution {
    let raw = query.trim();
    if raw.is_empty() || candidates.is_empty() {
        return Resolution::None;
    }

    if candidates.iter().any(|c| c == raw) {
        return Resolution::One(raw.to_string());
    }

    let normalized_query = normalize_token(raw);
    if normalized_query.is_empty() {
        return Resolution::None;
    }

    let normalized: Vec<(String, String)> = candidates
        .iter()
        .map(|c| (c.clone(), normalize_token(c)))
        .collect();

    let mut prefix_matches: Vec<String> = normalized
        .iter()
        .filter(|(_, n)| n.starts_with(&normalized_query))
        .map(|(c, _)| c.clone())
        .collect();
    prefix_matches.sort();
    match prefix_matches.len() {
        1 => return Resolution::One(prefix_matches.remove(0)),
        n if n > 1 => return Resolution::Many(prefix_matches),
        _ => {}
    }

    let mut substring_matches: Vec<String> = normalized
        .iter()
        .filter(|(_, n)| n.contains(&normalized_query))
        .map(|(c, _)| c.clone())
        .collect();
    substring_matches.sort();
    match substring_matches.len() {
        0 => Resolution::None,
        1 => Resolution::One(substring_matches.remove(0)),
        _ => Resolution::Many(substring_matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization_collapses_runs() {
        assert_eq!(normalize_token("K-211 (rev. B)"), "k_211_rev_b");
        assert_eq!(normalize_token("  A111  "), "a111");
        assert_eq!(normalize_token("--"), "");
    }

    #[test]
    fn unique_prefix_resolves() {
        let pages = candidates(&[
            "K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001",
            "A_111_FLOOR_FINISH_PLAN_p001",
        ]);
        assert_eq!(
            resolve_candidate("K_211", &pages),
            Resolution::One("K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001".into())
        );
        // punctuation-insensitive
        assert_eq!(
            resolve_candidate("k 211", &pages),
            Resolution::One("K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001".into())
        );
    }

    #[test]
    fn ambiguous_prefix_returns_full_set() {
        let pages = candidates(&[
            "K_201_OVERALL_EQUIPMENT_PLAN_p001",
            "K_201A_DETAIL_PLAN_p001",
        ]);
        match resolve_candidate("K_201", &pages) {
            Resolution::Many(set) => {
                assert_eq!(set.len(), 2);
                assert!(set.contains(&"K_201_OVERALL_EQUIPMENT_PLAN_p001".to_string()));
                assert!(set.contains(&"K_201A_DETAIL_PLAN_p001".to_string()));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn substring_fallback_after_prefix_misses() {
        let pages = candidates(&["A_111_FLOOR_FINISH_PLAN_p001"]);
        assert_eq!(
            resolve_candidate("floor finish", &pages),
            Resolution::One("A_111_FLOOR_FINISH_PLAN_p001".into())
        );
    }

    #[test]
    fn exact_match_wins_even_when_prefix_would_be_ambiguous() {
        let pages = candidates(&["K_201", "K_201A"]);
        assert_eq!(resolve_candidate("K_201", &pages), Resolution::One("K_201".into()));
    }

    #[test]
    fn no_match_is_none() {
        let pages = candidates(&["A_111_FLOOR_FINISH_PLAN_p001"]);
        assert_eq!(resolve_candidate("Z_999", &pages), Resolution::None);
        assert_eq!(resolve_candidate("", &pages), Resolution::None);
    }
}
