//! Project structure schema.
//!
//! The schema is data-driven: the built-in default describes a React +
//! TypeScript + Vite game project, and a file in YAML, JSON or TOML can
//! replace it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::EngineMarkers;
use crate::error::{SpecError, SpecResult};

fn default_max_file_count() -> usize {
    200
}

fn default_entry_file() -> String {
    "src/App.tsx".to_string()
}

fn default_max_subdomain_length() -> usize {
    63
}

/// Required/forbidden structure of a materialized project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProjectSchema {
    /// Files that must exist (relative paths)
    #[serde(default)]
    pub required_files: Vec<String>,
    /// Glob patterns of files that must not exist
    #[serde(default)]
    pub forbidden_files: Vec<String>,
    /// Marker strings a required file should contain
    #[serde(default)]
    pub content_patterns: BTreeMap<String, Vec<String>>,
    /// Dependencies the manifest must declare
    #[serde(default)]
    pub required_dependencies: Vec<String>,
    /// Dependencies the manifest must not declare
    #[serde(default)]
    pub forbidden_dependencies: Vec<String>,
    /// File count above which a warning is raised
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,
    /// File inspected for engine markers
    #[serde(default = "default_entry_file")]
    pub entry_file: String,
    /// Engine marker sets
    #[serde(default = "EngineMarkers::defaults")]
    pub engines: Vec<EngineMarkers>,
    /// Longest accepted deployment subdomain
    #[serde(default = "default_max_subdomain_length")]
    pub max_subdomain_length: usize,
}

impl Default for ProjectSchema {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            required_files: strings(&[
                "package.json",
                "index.html",
                "vite.config.ts",
                "tsconfig.json",
                "src/main.tsx",
                "src/App.tsx",
            ]),
            forbidden_files: strings(&[
                "next.config.*",
                "angular.json",
                "vue.config.*",
                "svelte.config.*",
                "**/*.vue",
                "**/*.svelte",
            ]),
            content_patterns: BTreeMap::from([
                ("index.html".to_string(), strings(&["id=\"root\"", "/src/main.tsx"])),
                ("src/main.tsx".to_string(), strings(&["createRoot"])),
                ("src/App.tsx".to_string(), strings(&["export default"])),
            ]),
            required_dependencies: strings(&["react", "react-dom", "vite"]),
            forbidden_dependencies: strings(&["next", "vue", "@angular/core", "svelte"]),
            max_file_count: default_max_file_count(),
            entry_file: default_entry_file(),
            engines: EngineMarkers::defaults(),
            max_subdomain_length: default_max_subdomain_length(),
        }
    }
}

impl ProjectSchema {
    /// Load a schema file, choosing the parser from the extension.
    pub fn load(path: impl AsRef<Path>) -> SpecResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SpecError::SchemaNotFound(path.to_path_buf()));
        }

        debug!("Loading project schema from {:?}", path);
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let schema = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => return Err(SpecError::UnsupportedSchemaFormat(path.to_path_buf())),
        };
        Ok(schema)
    }

    /// Compile the forbidden-file globs.
    pub fn forbidden_patterns(&self) -> SpecResult<Vec<glob::Pattern>> {
        self.forbidden_files
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| SpecError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}
