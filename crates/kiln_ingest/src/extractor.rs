//! Recovering named files from one blob of generated text.

use std::collections::BTreeMap;

use kiln_spec::{ExtractedFile, FileSource};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::sanitize::{paths_match, Sanitizer};
use crate::strategy::{default_strategies, ExtractionStrategy};
use crate::targets::{is_safe_path, ExtractionTarget};

/// Result of extracting every target from a text.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    /// Accepted files; targets first, then discovered files, one per path
    pub files: Vec<ExtractedFile>,
    /// Required targets no strategy could recover
    pub missing_required: Vec<String>,
    /// Path to the name of the strategy that produced it
    pub strategy_hits: BTreeMap<String, String>,
}

impl ExtractionOutcome {
    pub fn get(&self, path: &str) -> Option<&ExtractedFile> {
        self.files.iter().find(|f| f.name == path)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Ordered chain of strategies applied per target.
pub struct Extractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    targets: Vec<ExtractionTarget>,
    sanitizer: Sanitizer,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractionTarget::defaults())
    }
}

impl Extractor {
    /// Extractor over `targets` with the built-in strategy chain.
    pub fn new(targets: Vec<ExtractionTarget>) -> Self {
        Self::with_strategies(targets, default_strategies())
    }

    /// Extractor with a custom chain; earlier strategies take precedence.
    pub fn with_strategies(
        targets: Vec<ExtractionTarget>,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
    ) -> Self {
        Self {
            strategies,
            targets,
            sanitizer: Sanitizer::new(),
        }
    }

    pub fn targets(&self) -> &[ExtractionTarget] {
        &self.targets
    }

    /// Best content for `target` and the strategy that produced it.
    pub fn extract(&self, text: &str, target: &ExtractionTarget) -> Option<(String, &'static str)> {
        for strategy in &self.strategies {
            for candidate in strategy.candidates(text, target) {
                let content = self.sanitizer.sanitize(&candidate, target);
                if passes_sanity_check(&content, target) {
                    debug!("{} matched {}", strategy.name(), target.path);
                    return Some((content, strategy.name()));
                }
                debug!(
                    "{} candidate for {} rejected by sanity check",
                    strategy.name(),
                    target.path
                );
            }
        }
        None
    }

    /// Best content for a path; unknown paths use a plain target.
    pub fn extract_file(&self, text: &str, path: &str) -> Option<String> {
        let target = self
            .targets
            .iter()
            .find(|t| t.path == path)
            .cloned()
            .unwrap_or_else(|| ExtractionTarget::new(path));
        self.extract(text, &target).map(|(content, _)| content)
    }

    /// Extract every target, then every other announced file.
    pub fn extract_all(&self, text: &str) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        for target in &self.targets {
            match self.extract(text, target) {
                Some((content, strategy)) => {
                    outcome
                        .strategy_hits
                        .insert(target.path.clone(), strategy.to_string());
                    outcome
                        .files
                        .push(ExtractedFile::new(&target.path, content, FileSource::LlmGenerated));
                }
                None if target.required => {
                    warn!("Required file {} not found in generated text", target.path);
                    outcome.missing_required.push(target.path.clone());
                }
                None => debug!("Optional file {} not found", target.path),
            }
        }

        self.discover_into(text, &mut outcome);

        info!(
            "Extracted {} files ({} required missing)",
            outcome.files.len(),
            outcome.missing_required.len()
        );
        outcome
    }

    fn discover_into(&self, text: &str, outcome: &mut ExtractionOutcome) {
        for strategy in &self.strategies {
            for (path, raw) in strategy.discover(text) {
                let claimed = self.targets.iter().any(|t| paths_match(&path, &t.path))
                    || outcome.files.iter().any(|f| f.name == path);
                if claimed {
                    continue;
                }
                if !is_safe_path(&path) {
                    warn!("Ignoring announced file with unsafe path: {}", path);
                    continue;
                }

                let target = ExtractionTarget::new(&path);
                let content = self.sanitizer.sanitize(&raw, &target);
                if !passes_sanity_check(&content, &target) {
                    debug!("Discovered file {} rejected by sanity check", path);
                    continue;
                }

                debug!("{} discovered {}", strategy.name(), path);
                outcome
                    .strategy_hits
                    .insert(path.clone(), strategy.name().to_string());
                outcome
                    .files
                    .push(ExtractedFile::new(path, content, FileSource::LlmGenerated));
            }
        }
    }
}

/// Minimum-length and shape check by file kind.
pub fn passes_sanity_check(content: &str, target: &ExtractionTarget) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.len() < target.min_length {
        return false;
    }

    match target.extension().as_str() {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => ["import", "export", "function", "const", "class"]
            .iter()
            .any(|kw| trimmed.contains(kw)),
        "html" | "htm" => trimmed.contains('<') && trimmed.contains('>'),
        "json" => serde_json::from_str::<serde_json::Value>(trimmed).is_ok(),
        "css" => trimmed.contains('{'),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanity_check_by_kind() {
        let ts = ExtractionTarget::new("src/a.ts");
        assert!(passes_sanity_check("export const a = 1;", &ts));
        assert!(!passes_sanity_check("Sure! Here is the code.", &ts));

        let json = ExtractionTarget::new("data.json");
        assert!(passes_sanity_check("{\"a\": 1}", &json));
        assert!(!passes_sanity_check("{a: 1", &json));

        let css = ExtractionTarget::new("src/index.css");
        assert!(!passes_sanity_check("body", &css));

        let short = ExtractionTarget::new("src/App.tsx").with_min_length(50);
        assert!(!passes_sanity_check("export const A = 1;", &short));
    }

    #[test]
    fn test_rejected_candidate_falls_through_to_next_strategy() {
        let target = ExtractionTarget::new("src/util.ts");
        let text = "=== src/util.ts ===\nTODO\n=== notes.md ===\n// src/util.ts\nexport const util = 1;\n";

        let extractor = Extractor::new(vec![target.clone()]);
        let (content, strategy) = extractor.extract(text, &target).unwrap();
        assert_eq!(content, "export const util = 1;\n");
        assert_eq!(strategy, "comment-marker");
    }
}
