//! Extension name resolution.

/// Resolves `query` against `names`.
///
/// Tries an exact match, then a case-insensitive match, then the most
/// similar name by normalized edit distance (ties broken by name) when its
/// similarity is at least `threshold`.
pub fn resolve_name<S: AsRef<str>>(query: &str, names: &[S], threshold: f64) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    if let Some(exact) = sorted.iter().find(|n| **n == query) {
        return Some((*exact).to_string());
    }
    if let Some(folded) = sorted.iter().find(|n| n.eq_ignore_ascii_case(query)) {
        return Some((*folded).to_string());
    }

    let lowered = query.to_lowercase();
    let mut best: Option<(&str, f64)> = None;
    for name in sorted {
        let score = strsim::normalized_levenshtein(&lowered, &name.to_lowercase());
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((name, score));
        }
    }

    best.filter(|(_, score)| *score >= threshold).map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 3] = ["Loader", "Love", "System"];

    #[test]
    fn test_exact_and_case_insensitive() {
        assert_eq!(resolve_name("Love", &NAMES, 0.6).as_deref(), Some("Love"));
        assert_eq!(resolve_name("SYSTEM", &NAMES, 0.6).as_deref(), Some("System"));
        assert_eq!(resolve_name("  loader ", &NAMES, 0.6).as_deref(), Some("Loader"));
    }

    #[test]
    fn test_fuzzy_prefers_closest() {
        assert_eq!(resolve_name("lover", &NAMES, 0.6).as_deref(), Some("Love"));
        assert_eq!(resolve_name("loadr", &NAMES, 0.6).as_deref(), Some("Loader"));
    }

    #[test]
    fn test_no_match_below_threshold() {
        assert_eq!(resolve_name("xyz", &NAMES, 0.6), None);
        assert_eq!(resolve_name("", &NAMES, 0.0), None);
        assert_eq!(resolve_name("love", &Vec::<String>::new(), 0.6), None);
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let reversed = ["System", "Love", "Loader"];
        for query in ["lover", "xyz", "sys", "LOVE"] {
            assert_eq!(resolve_name(query, &NAMES, 0.6), resolve_name(query, &reversed, 0.6));
        }
    }

    #[test]
    fn test_ties_break_by_name() {
        assert_eq!(resolve_name("ab", &["ac", "aa"], 0.5).as_deref(), Some("aa"));
    }
}
