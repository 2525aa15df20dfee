//! Cleanup of extracted content.
//!
//! Sanitization strips markdown fences, separator lines, provenance comments
//! and leading path markers, then prepends any required import that is
//! missing. Running it again on its own output changes nothing.

use regex::Regex;

use crate::targets::{ExtractionTarget, RequiredImport};

/// Deterministic content cleaner.
pub struct Sanitizer {
    separator: Regex,
    provenance: Regex,
    path_marker: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self {
            separator: Regex::new(r"^\s*(?:={3,}.*={3,}|={3,}|-{3,}|\*{3,}|_{3,})\s*$").unwrap(),
            provenance: Regex::new(
                r"(?i)^\s*(?://+|#|/\*+|<!--|\*)\s*(?:generated by|auto-?generated|ai-generated|this file (?:was|is) (?:auto-?)?generated|created by (?:an? )?(?:ai|llm|assistant))",
            )
            .unwrap(),
            path_marker: Regex::new(
                r"(?i)^\s*(?://+|/\*+|<!--|#)\s*(?:file\s*:\s*)?`?([\w@./-]+)`?\s*(?:\*/|-->)?\s*$",
            )
            .unwrap(),
        }
    }

    /// Full pass for a target: clean, then ensure its imports.
    pub fn sanitize(&self, content: &str, target: &ExtractionTarget) -> String {
        let cleaned = self.clean(content, &target.path);
        ensure_imports(&cleaned, &target.imports)
    }

    /// Strip fences, separators, provenance comments and leading path markers.
    pub fn clean(&self, content: &str, path: &str) -> String {
        let kept: Vec<&str> = content
            .lines()
            .filter(|line| !is_fence(line))
            .filter(|line| !self.separator.is_match(line))
            .filter(|line| !self.provenance.is_match(line))
            .collect();

        let mut start = 0;
        while start < kept.len() {
            let line = kept[start];
            if line.trim().is_empty() || self.is_marker_for(line, path) {
                start += 1;
            } else {
                break;
            }
        }
        let mut end = kept.len();
        while end > start && kept[end - 1].trim().is_empty() {
            end -= 1;
        }

        if start == end {
            return String::new();
        }
        let mut cleaned = kept[start..end].join("\n");
        cleaned.push('\n');
        cleaned
    }

    fn is_marker_for(&self, line: &str, path: &str) -> bool {
        self.path_marker
            .captures(line)
            .map(|caps| paths_match(&caps[1], path))
            .unwrap_or(false)
    }
}

/// Prepend each absent import, in declaration order.
pub fn ensure_imports(content: &str, imports: &[RequiredImport]) -> String {
    let missing: Vec<String> = imports
        .iter()
        .filter(|i| !i.is_present(content))
        .map(RequiredImport::statement)
        .collect();

    if missing.is_empty() {
        return content.to_string();
    }
    format!("{}\n{}", missing.join("\n"), content)
}

/// Markdown fence line (``` or ~~~, with or without info string).
pub fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Canonical form of an announced path.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '*' | ':'))
        .trim()
        .replace('\\', "/");
    trimmed.strip_prefix("./").unwrap_or(&trimmed).to_string()
}

/// Whether an announced path refers to `target`.
///
/// A bare file name matches a target with the same file name in any directory.
pub fn paths_match(candidate: &str, target: &str) -> bool {
    let candidate = normalize_path(candidate);
    let target = normalize_path(target);
    if candidate == target {
        return true;
    }
    !candidate.contains('/') && target.rsplit('/').next() == Some(candidate.as_str())
}
