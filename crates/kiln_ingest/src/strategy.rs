//! Matching strategies for recovering files from generated text.
//!
//! Each strategy is independent and returns raw candidates in document
//! order; the extractor sanitizes and sanity-checks them.

use regex::Regex;

use crate::sanitize::{is_fence, normalize_path, paths_match};
use crate::targets::ExtractionTarget;

/// One way of locating a file's content inside generated text.
pub trait ExtractionStrategy: Send + Sync {
    /// Strategy name, recorded in extraction outcomes.
    fn name(&self) -> &'static str;

    /// Every candidate for `target`, in document order.
    fn candidates(&self, text: &str, target: &ExtractionTarget) -> Vec<String>;

    /// First candidate for `target`.
    fn try_extract(&self, text: &str, target: &ExtractionTarget) -> Option<String> {
        self.candidates(text, target).into_iter().next()
    }

    /// Every `(path, content)` this strategy can announce on its own.
    fn discover(&self, _text: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Whether a token looks like a file path (has an extension).
fn looks_like_path(candidate: &str) -> bool {
    let candidate = normalize_path(candidate);
    !candidate.is_empty()
        && !candidate.contains(char::is_whitespace)
        && candidate
            .rsplit('/')
            .next()
            .map(|name| name.contains('.') && !name.ends_with('.'))
            .unwrap_or(false)
}

/// Body of the fenced block opening `lines`, or the lines up to the first fence.
fn fenced_or_raw(lines: &[&str]) -> String {
    let first = lines.iter().position(|l| !l.trim().is_empty());
    match first {
        Some(open) if is_fence(lines[open]) => {
            let body = &lines[open + 1..];
            let close = body.iter().position(|l| is_fence(l)).unwrap_or(body.len());
            body[..close].join("\n")
        }
        _ => {
            let end = lines.iter().position(|l| is_fence(l)).unwrap_or(lines.len());
            lines[..end].join("\n")
        }
    }
}

/// `=== path ===` header lines; a block runs to the next header or the end.
pub struct DelimiterBlock {
    header: Regex,
}

impl Default for DelimiterBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl DelimiterBlock {
    pub fn new() -> Self {
        Self {
            header: Regex::new(r"^\s*={3,}\s*(?:(?i:file)\s*:\s*)?(.+?)\s*={3,}\s*$").unwrap(),
        }
    }

    fn blocks(&self, text: &str) -> Vec<(String, String)> {
        let lines: Vec<&str> = text.lines().collect();
        let headers: Vec<(usize, String)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                self.header
                    .captures(line)
                    .map(|caps| (i, normalize_path(&caps[1])))
            })
            .collect();

        headers
            .iter()
            .enumerate()
            .filter(|(_, (_, path))| looks_like_path(path))
            .map(|(n, (start, path))| {
                let end = headers.get(n + 1).map(|(i, _)| *i).unwrap_or(lines.len());
                (path.clone(), fenced_or_raw(&lines[start + 1..end]))
            })
            .collect()
    }
}

impl ExtractionStrategy for DelimiterBlock {
    fn name(&self) -> &'static str {
        "delimiter-block"
    }

    fn candidates(&self, text: &str, target: &ExtractionTarget) -> Vec<String> {
        self.blocks(text)
            .into_iter()
            .filter(|(path, _)| paths_match(path, &target.path))
            .map(|(_, content)| content)
            .collect()
    }

    fn discover(&self, text: &str) -> Vec<(String, String)> {
        self.blocks(text)
    }
}

/// A label line naming a path directly followed by a fenced block, or a
/// fence whose info string names the path.
pub struct FencedPathBlock {
    label: Regex,
    info: Regex,
}

impl Default for FencedPathBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl FencedPathBlock {
    pub fn new() -> Self {
        Self {
            label: Regex::new(
                r"^\s*(?:#{1,6}\s*)?(?:\*\*)?(?:(?i:file)\s*:\s*)?(?:\*\*)?\s*`?([\w@./-]+)`?\s*(?:\*\*)?:?(?:\*\*)?\s*$",
            )
            .unwrap(),
            info: Regex::new(r"^\s*```\s*(?:[\w+-]+\s+)?([\w@./-]+)\s*$").unwrap(),
        }
    }

    fn blocks(&self, text: &str) -> Vec<(String, String)> {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            let opening = if is_fence(line) {
                self.info
                    .captures(line)
                    .map(|caps| caps[1].to_string())
                    .filter(|p| looks_like_path(p))
                    .map(|p| (p, i))
            } else {
                self.label
                    .captures(line)
                    .map(|caps| caps[1].to_string())
                    .filter(|p| looks_like_path(p))
                    .and_then(|p| {
                        let next = (i + 1..lines.len()).find(|&j| !lines[j].trim().is_empty())?;
                        is_fence(lines[next]).then_some((p, next))
                    })
            };

            match opening {
                Some((path, fence)) => {
                    let body = &lines[fence + 1..];
                    let close = body.iter().position(|l| is_fence(l)).unwrap_or(body.len());
                    blocks.push((normalize_path(&path), body[..close].join("\n")));
                    i = fence + close + 2;
                }
                None if is_fence(line) => {
                    // Skip over unnamed fenced blocks so their content is not read as labels
                    let close = lines[i + 1..]
                        .iter()
                        .position(|l| is_fence(l))
                        .unwrap_or(lines.len() - i - 1);
                    i += close + 2;
                }
                None => i += 1,
            }
        }
        blocks
    }
}

impl ExtractionStrategy for FencedPathBlock {
    fn name(&self) -> &'static str {
        "fenced-path-block"
    }

    fn candidates(&self, text: &str, target: &ExtractionTarget) -> Vec<String> {
        self.blocks(text)
            .into_iter()
            .filter(|(path, _)| paths_match(path, &target.path))
            .map(|(_, content)| content)
            .collect()
    }

    fn discover(&self, text: &str) -> Vec<(String, String)> {
        self.blocks(text)
    }
}

/// A comment naming the path at line start (`// src/App.tsx`,
/// `<!-- index.html -->`); the block runs to the next marker, a closing
/// fence or the end.
pub struct CommentMarker {
    marker: Regex,
}

impl Default for CommentMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentMarker {
    pub fn new() -> Self {
        Self {
            marker: Regex::new(
                r"^\s*(?://+|/\*+|<!--)\s*(?:(?i:file)\s*:\s*)?`?([\w@./-]+)`?\s*(?:\*/|-->)?\s*$",
            )
            .unwrap(),
        }
    }

    fn marker_path(&self, line: &str) -> Option<String> {
        self.marker
            .captures(line)
            .map(|caps| caps[1].to_string())
            .filter(|p| looks_like_path(p))
    }
}

impl ExtractionStrategy for CommentMarker {
    fn name(&self) -> &'static str {
        "comment-marker"
    }

    fn candidates(&self, text: &str, target: &ExtractionTarget) -> Vec<String> {
        let lines: Vec<&str> = text.lines().collect();
        let mut found = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(path) = self.marker_path(line) else {
                continue;
            };
            if !paths_match(&path, &target.path) {
                continue;
            }

            let body = &lines[i + 1..];
            let end = body
                .iter()
                .position(|l| is_fence(l) || self.marker_path(l).is_some())
                .unwrap_or(body.len());
            found.push(body[..end].join("\n"));
        }
        found
    }
}

/// Token heuristic over fenced blocks, or the whole text when it has none.
pub struct StructuralHeuristic;

impl StructuralHeuristic {
    fn fenced_blocks(text: &str) -> Vec<String> {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if is_fence(lines[i]) {
                let body = &lines[i + 1..];
                let close = body.iter().position(|l| is_fence(l)).unwrap_or(body.len());
                blocks.push(body[..close].join("\n"));
                i += close + 2;
            } else {
                i += 1;
            }
        }
        blocks
    }
}

impl ExtractionStrategy for StructuralHeuristic {
    fn name(&self) -> &'static str {
        "structural-heuristic"
    }

    fn candidates(&self, text: &str, target: &ExtractionTarget) -> Vec<String> {
        let Some(rule) = &target.rule else {
            return Vec::new();
        };

        let blocks = Self::fenced_blocks(text);
        let pool = if blocks.is_empty() {
            vec![text.to_string()]
        } else {
            blocks
        };
        pool.into_iter().filter(|c| rule.matches(c)).collect()
    }
}

/// The built-in chain, most specific first.
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(DelimiterBlock::new()),
        Box::new(FencedPathBlock::new()),
        Box::new(CommentMarker::new()),
        Box::new(StructuralHeuristic),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::StructuralRule;

    fn target(path: &str) -> ExtractionTarget {
        ExtractionTarget::new(path)
    }

    #[test]
    fn test_delimiter_blocks_run_to_next_header() {
        let text = "intro\n=== src/App.tsx ===\nconst a = 1;\n=== src/main.tsx ===\nconst b = 2;\n";
        let strategy = DelimiterBlock::new();

        assert_eq!(strategy.try_extract(text, &target("src/App.tsx")).unwrap(), "const a = 1;");
        assert_eq!(strategy.try_extract(text, &target("src/main.tsx")).unwrap(), "const b = 2;");
        assert_eq!(strategy.discover(text).len(), 2);
    }

    #[test]
    fn test_delimiter_block_prefers_fenced_body() {
        let text = "=== src/App.tsx ===\n```tsx\nconst a = 1;\n```\nThat's the app!\n";
        let strategy = DelimiterBlock::new();
        assert_eq!(strategy.try_extract(text, &target("src/App.tsx")).unwrap(), "const a = 1;");
    }

    #[test]
    fn test_delimiter_end_marker_is_not_a_file() {
        let text = "=== src/App.tsx ===\nconst a = 1;\n=== END ===\ntrailing notes\n";
        let strategy = DelimiterBlock::new();

        assert_eq!(strategy.try_extract(text, &target("src/App.tsx")).unwrap(), "const a = 1;");
        assert_eq!(strategy.discover(text).len(), 1);
    }

    #[test]
    fn test_fenced_label_forms() {
        let strategy = FencedPathBlock::new();
        for label in ["### FILE: src/App.tsx", "**src/App.tsx**", "`src/App.tsx`:", "src/App.tsx:"] {
            let text = format!("Here you go.\n{}\n\n```tsx\nconst a = 1;\n```\n", label);
            assert_eq!(
                strategy.try_extract(&text, &target("src/App.tsx")).as_deref(),
                Some("const a = 1;"),
                "label {}",
                label
            );
        }
    }

    #[test]
    fn test_fence_info_names_path() {
        let text = "```tsx src/components/Ship.tsx\nexport const Ship = 1;\n```\n";
        let strategy = FencedPathBlock::new();
        assert_eq!(
            strategy.discover(text),
            vec![("src/components/Ship.tsx".to_string(), "export const Ship = 1;".to_string())]
        );
    }

    #[test]
    fn test_label_without_fence_is_ignored() {
        let text = "src/App.tsx:\nconst a = 1;\n";
        assert!(FencedPathBlock::new().try_extract(text, &target("src/App.tsx")).is_none());
    }

    #[test]
    fn test_comment_marker_stops_at_fence() {
        let text = "```tsx\n// src/App.tsx\nconst a = 1;\n```\nExplanation";
        let strategy = CommentMarker::new();
        assert_eq!(strategy.try_extract(text, &target("src/App.tsx")).unwrap(), "const a = 1;");
    }

    #[test]
    fn test_comment_marker_html() {
        let text = "<!-- index.html -->\n<html><div id=\"root\"></div></html>\n// src/main.tsx\nx";
        let strategy = CommentMarker::new();
        assert_eq!(
            strategy.try_extract(text, &target("index.html")).unwrap(),
            "<html><div id=\"root\"></div></html>"
        );
    }

    #[test]
    fn test_structural_heuristic_uses_rule() {
        let rule = StructuralRule {
            all_of: vec!["return".into()],
            any_of: vec!["function App".into()],
            min_length: 10,
        };
        let app = target("src/App.tsx").with_rule(rule);
        let text = "```ts\nconst x = 1;\n```\n```tsx\nfunction App() { return null }\n```";

        let strategy = StructuralHeuristic;
        assert_eq!(strategy.try_extract(text, &app).unwrap(), "function App() { return null }");
        assert!(strategy.try_extract(text, &target("src/App.tsx")).is_none());
    }
}
