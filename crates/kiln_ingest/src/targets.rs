//! Files the extractor looks for.

use std::fs;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IngestError, IngestResult};

/// An import statement a file must carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequiredImport {
    /// Default binding (`React` in `import React from 'react'`); side-effect import when absent
    #[serde(default)]
    pub binding: Option<String>,
    pub module: String,
}

impl RequiredImport {
    pub fn new(binding: &str, module: &str) -> Self {
        Self {
            binding: Some(binding.to_string()),
            module: module.to_string(),
        }
    }

    pub fn side_effect(module: &str) -> Self {
        Self {
            binding: None,
            module: module.to_string(),
        }
    }

    /// The statement prepended when the import is absent.
    pub fn statement(&self) -> String {
        match &self.binding {
            Some(binding) => format!("import {} from '{}';", binding, self.module),
            None => format!("import '{}';", self.module),
        }
    }

    /// Whether any import line in `content` already pulls in the module.
    ///
    /// Relative modules also match with an extension (`'./App.tsx'` for `./App`).
    pub fn is_present(&self, content: &str) -> bool {
        let relative = self.module.starts_with('.');
        content.lines().any(|line| {
            let line = line.trim_start();
            if !(line.starts_with("import") || line.contains("from ")) {
                return false;
            }
            ['\'', '"'].iter().any(|q| {
                let opening = format!("{}{}", q, self.module);
                line.match_indices(&opening).any(|(i, m)| {
                    let rest = &line[i + m.len()..];
                    rest.starts_with(*q) || (relative && rest.starts_with('.'))
                })
            })
        })
    }
}

/// Token rule for the structural heuristic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuralRule {
    /// Every token must appear
    #[serde(default)]
    pub all_of: Vec<String>,
    /// At least one token must appear (ignored when empty)
    #[serde(default)]
    pub any_of: Vec<String>,
    #[serde(default)]
    pub min_length: usize,
}

impl StructuralRule {
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.trim().len() >= self.min_length
            && self.all_of.iter().all(|t| candidate.contains(t.as_str()))
            && (self.any_of.is_empty() || self.any_of.iter().any(|t| candidate.contains(t.as_str())))
    }
}

/// A file the extractor tries to recover from generated text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionTarget {
    pub path: String,
    /// Reported as missing when no strategy finds it
    #[serde(default)]
    pub required: bool,
    /// Shortest accepted content after sanitization
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default)]
    pub rule: Option<StructuralRule>,
    #[serde(default)]
    pub imports: Vec<RequiredImport>,
}

fn default_min_length() -> usize {
    1
}

impl ExtractionTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required: false,
            min_length: default_min_length(),
            rule: None,
            imports: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn with_rule(mut self, rule: StructuralRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_import(mut self, import: RequiredImport) -> Self {
        self.imports.push(import);
        self
    }

    /// Lowercase extension of the target path.
    pub fn extension(&self) -> String {
        Path::new(&self.path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Default targets of a React + TypeScript + Vite game project.
    pub fn defaults() -> Vec<Self> {
        let tokens = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        vec![
            Self::new("src/App.tsx")
                .required()
                .with_min_length(50)
                .with_rule(StructuralRule {
                    all_of: tokens(&["return"]),
                    any_of: tokens(&["function App", "const App", "class App"]),
                    min_length: 100,
                })
                .with_import(RequiredImport::new("React", "react")),
            Self::new("src/main.tsx")
                .required()
                .with_min_length(40)
                .with_rule(StructuralRule {
                    all_of: tokens(&["createRoot"]),
                    any_of: tokens(&["render"]),
                    min_length: 40,
                })
                .with_import(RequiredImport::new("React", "react"))
                .with_import(RequiredImport::new("ReactDOM", "react-dom/client"))
                .with_import(RequiredImport::new("App", "./App")),
            Self::new("index.html")
                .with_min_length(50)
                .with_rule(StructuralRule {
                    all_of: tokens(&["<html", "id=\"root\""]),
                    any_of: Vec::new(),
                    min_length: 50,
                }),
            Self::new("vite.config.ts").with_rule(StructuralRule {
                all_of: tokens(&["defineConfig"]),
                any_of: Vec::new(),
                min_length: 20,
            }),
            Self::new("src/index.css"),
        ]
    }
}

/// Whether `path` is relative and stays inside the project.
pub fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Load targets from a YAML or JSON file.
pub fn load_targets(path: impl AsRef<Path>) -> IngestResult<Vec<ExtractionTarget>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestError::TargetsNotFound(path.to_path_buf()));
    }

    debug!("Loading extraction targets from {:?}", path);
    let content = fs::read_to_string(path)?;
    let targets: Vec<ExtractionTarget> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    for target in &targets {
        if !is_safe_path(&target.path) {
            return Err(IngestError::InvalidTarget {
                path: target.path.clone(),
                reason: "path must be relative and stay inside the project".to_string(),
            });
        }
    }
    Ok(targets)
}
