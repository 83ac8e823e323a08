//! Static import scanning.
//!
//! Reads import statements line by line without executing anything. Only
//! the leading segment of each dotted name is kept, since that is what maps
//! to an installable distribution.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^import\s+(.+)$").expect("valid import pattern"));

static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^from\s+(\.*)([A-Za-z_][A-Za-z0-9_]*)?[A-Za-z0-9_.]*\s+import\b")
        .expect("valid from-import pattern")
});

/// Returns the leading segment of every module referenced by an import
/// statement in `source`.
///
/// Relative imports (`from . import x`, `from .pkg import y`) refer to local
/// files and are skipped. Lines inside triple-quoted strings are ignored.
pub fn scan_imports(source: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut in_string: Option<&str> = None;

    for raw_line in source.lines() {
        let line = raw_line.trim();

        if let Some(delimiter) = in_string {
            if line.matches(delimiter).count() % 2 == 1 {
                in_string = None;
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let code = strip_comment(line);
        for statement in code.split(';') {
            scan_statement(statement.trim(), &mut found);
        }

        for delimiter in ["\"\"\"", "'''"] {
            if code.matches(delimiter).count() % 2 == 1 {
                in_string = Some(delimiter);
                break;
            }
        }
    }

    found
}

fn scan_statement(statement: &str, found: &mut BTreeSet<String>) {
    if let Some(caps) = FROM_RE.captures(statement) {
        let relative = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if !relative {
            if let Some(module) = caps.get(2) {
                found.insert(module.as_str().to_string());
            }
        }
        return;
    }

    if let Some(caps) = IMPORT_RE.captures(statement) {
        let names = caps[1].trim_matches(|c: char| c == '(' || c == ')' || c == '\\');
        for item in names.split(',') {
            let Some(dotted) = item.split_whitespace().next() else {
                continue;
            };
            let leading = dotted.split('.').next().unwrap_or_default();
            if is_identifier(leading) {
                found.insert(leading.to_string());
            }
        }
    }
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(code, _)| code).trim_end()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
