//! Data models shared by every pipeline stage.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Where the content of a materialized file came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FileSource {
    /// Recovered from the generation chain's output
    LlmGenerated,
    /// Copied from the scaffold templates
    Template,
    /// Substituted because a required file could not be extracted
    Fallback,
}

impl FileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmGenerated => "llm-generated",
            Self::Template => "template",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single named file recovered from generated text or a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Relative path inside the project (forward slashes)
    pub name: String,
    /// File content
    pub content: String,
    /// Extension-derived tag (e.g. "tsx", "html")
    #[serde(rename = "type")]
    pub file_type: String,
    /// Content provenance
    pub source: FileSource,
}

impl ExtractedFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>, source: FileSource) -> Self {
        let name = name.into();
        let file_type = file_type_of(&name);
        Self {
            name,
            content: content.into(),
            file_type,
            source,
        }
    }
}

/// Extension-derived type tag for a path. Files without an extension are "text".
pub fn file_type_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

/// Runtime and dev dependency tables, package name to version constraint.
///
/// Both tables are ordered maps so equal sets always compare and serialize
/// identically regardless of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencySet {
    #[serde(default)]
    pub runtime: BTreeMap<String, String>,
    #[serde(default)]
    pub dev: BTreeMap<String, String>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.runtime.insert(name.into(), version.into());
        self
    }

    pub fn with_dev(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dev.insert(name.into(), version.into());
        self
    }

    /// Merge another set on top of this one. Entries from `other` win.
    pub fn merge(&mut self, other: &DependencySet) {
        for (name, version) in &other.runtime {
            self.runtime.insert(name.clone(), version.clone());
        }
        for (name, version) in &other.dev {
            self.dev.insert(name.clone(), version.clone());
        }
    }

    /// Whether a package appears in either table.
    pub fn contains(&self, name: &str) -> bool {
        self.runtime.contains_key(name) || self.dev.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty() && self.dev.is_empty()
    }

    pub fn len(&self) -> usize {
        self.runtime.len() + self.dev.len()
    }
}

/// Engine tag inferred from generated content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineTag {
    /// No engine markers found
    #[default]
    None,
    Phaser,
    Three,
    /// Markers of more than one engine were present
    Both,
}

impl EngineTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Phaser => "phaser",
            Self::Three => "three",
            Self::Both => "both",
        }
    }

    /// Combine two detections into one tag.
    pub fn combine(self, other: EngineTag) -> EngineTag {
        match (self, other) {
            (EngineTag::None, t) | (t, EngineTag::None) => t,
            (a, b) if a == b => a,
            _ => EngineTag::Both,
        }
    }
}

impl std::fmt::Display for EngineTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The package descriptor written as `package.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub name: String,
    pub version: String,
    pub private: bool,
    #[serde(rename = "type")]
    pub module_type: String,
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl ProjectManifest {
    /// Dependency tables as a `DependencySet`.
    pub fn dependency_set(&self) -> DependencySet {
        DependencySet {
            runtime: self.dependencies.clone(),
            dev: self.dev_dependencies.clone(),
        }
    }

    /// Whether the package is declared in either table.
    pub fn declares(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Result of checking a materialized project against its schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub required_found: usize,
    pub required_missing: Vec<String>,
    pub forbidden_present: Vec<String>,
    pub file_count: usize,
    pub engine: EngineTag,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            required_found: 0,
            required_missing: Vec::new(),
            forbidden_present: Vec::new(),
            file_count: 0,
            engine: EngineTag::None,
        }
    }

    /// Conservative report used when validation itself could not run.
    pub fn fallback(reason: impl std::fmt::Display) -> Self {
        let mut report = Self::new();
        report.add_warning(format!("Validation could not complete: {}", reason));
        report
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            valid: self.valid,
            errors: self.errors.len(),
            warnings: self.warnings.len(),
            required_found: self.required_found,
            required_missing: self.required_missing.len(),
            forbidden_present: self.forbidden_present.len(),
            engine: self.engine,
        }
    }
}

/// Compact validation counts for progress events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub valid: bool,
    pub errors: usize,
    pub warnings: usize,
    pub required_found: usize,
    pub required_missing: usize,
    pub forbidden_present: usize,
    pub engine: EngineTag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_extension() {
        let file = ExtractedFile::new("src/App.tsx", "", FileSource::LlmGenerated);
        assert_eq!(file.file_type, "tsx");
        assert_eq!(file_type_of("Dockerfile"), "text");
        assert_eq!(file_type_of("index.HTML"), "html");
    }

    #[test]
    fn test_dependency_merge_other_wins() {
        let mut base = DependencySet::new()
            .with_runtime("react", "^17.0.0")
            .with_dev("vite", "^4.0.0");
        let other = DependencySet::new().with_runtime("react", "^18.2.0");

        base.merge(&other);
        assert_eq!(base.runtime.get("react"), Some(&"^18.2.0".to_string()));
        assert_eq!(base.dev.get("vite"), Some(&"^4.0.0".to_string()));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_engine_combine() {
        assert_eq!(EngineTag::None.combine(EngineTag::Three), EngineTag::Three);
        assert_eq!(EngineTag::Phaser.combine(EngineTag::Phaser), EngineTag::Phaser);
        assert_eq!(EngineTag::Phaser.combine(EngineTag::Three), EngineTag::Both);
    }

    #[test]
    fn test_manifest_serializes_package_json_keys() {
        let manifest = ProjectManifest {
            name: "demo".to_string(),
            version: "0.1.0".to_string(),
            private: true,
            module_type: "module".to_string(),
            scripts: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::from([("vite".to_string(), "^5.0.8".to_string())]),
        };
        let json = manifest.to_json_pretty().unwrap();
        assert!(json.contains("\"devDependencies\""));
        assert!(json.contains("\"type\": \"module\""));
    }

    #[test]
    fn test_fallback_report_is_valid_with_warning() {
        let report = ValidationReport::fallback("schema unreadable");
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.errors.is_empty());
    }
}
