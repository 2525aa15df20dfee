//! Dependency inference from import references.

use std::collections::{BTreeMap, BTreeSet};

use kiln_spec::{DependencySet, ExtractedFile};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Version constraint for packages missing from the known table.
pub const PERMISSIVE_VERSION: &str = "latest";

/// Runtime packages every project gets.
pub const ESSENTIAL_RUNTIME: &[(&str, &str)] = &[("react", "^18.2.0"), ("react-dom", "^18.2.0")];

/// Toolchain packages every project gets.
pub const ESSENTIAL_DEV: &[(&str, &str)] = &[
    ("@types/react", "^18.2.43"),
    ("@types/react-dom", "^18.2.17"),
    ("@vitejs/plugin-react", "^4.2.1"),
    ("typescript", "^5.3.3"),
    ("vite", "^5.0.8"),
];

const SCRIPT_TYPES: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

const NODE_BUILTINS: &[&str] = &[
    "fs", "path", "url", "os", "crypto", "child_process", "http", "https", "events", "stream",
    "util", "module", "process",
];

/// A package with a pinned constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPackage {
    pub version: &'static str,
    /// Type definitions package added to the dev set
    pub types: Option<(&'static str, &'static str)>,
    /// Belongs in the dev set only
    pub dev: bool,
}

impl KnownPackage {
    const fn runtime(version: &'static str) -> Self {
        Self {
            version,
            types: None,
            dev: false,
        }
    }

    const fn typed(version: &'static str, types: &'static str, types_version: &'static str) -> Self {
        Self {
            version,
            types: Some((types, types_version)),
            dev: false,
        }
    }

    const fn toolchain(version: &'static str) -> Self {
        Self {
            version,
            types: None,
            dev: true,
        }
    }
}

fn known_packages() -> BTreeMap<&'static str, KnownPackage> {
    BTreeMap::from([
        ("react", KnownPackage::typed("^18.2.0", "@types/react", "^18.2.43")),
        ("react-dom", KnownPackage::typed("^18.2.0", "@types/react-dom", "^18.2.17")),
        ("phaser", KnownPackage::runtime("^3.80.1")),
        ("three", KnownPackage::typed("^0.160.0", "@types/three", "^0.160.0")),
        ("@react-three/fiber", KnownPackage::runtime("^8.15.12")),
        ("@react-three/drei", KnownPackage::runtime("^9.92.7")),
        ("zustand", KnownPackage::runtime("^4.4.7")),
        ("howler", KnownPackage::typed("^2.2.4", "@types/howler", "^2.2.11")),
        ("gsap", KnownPackage::runtime("^3.12.4")),
        ("matter-js", KnownPackage::typed("^0.19.0", "@types/matter-js", "^0.19.5")),
        ("cannon-es", KnownPackage::runtime("^0.20.0")),
        ("framer-motion", KnownPackage::runtime("^10.16.16")),
        ("vite", KnownPackage::toolchain("^5.0.8")),
        ("@vitejs/plugin-react", KnownPackage::toolchain("^4.2.1")),
        ("typescript", KnownPackage::toolchain("^5.3.3")),
    ])
}

/// Output of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyAnalysis {
    pub dependencies: DependencySet,
    unresolved: BTreeSet<String>,
}

impl DependencyAnalysis {
    /// Packages that fell back to the permissive constraint.
    pub fn unresolved(&self) -> Vec<String> {
        self.unresolved.iter().cloned().collect()
    }
}

/// Scans file contents for external module references.
pub struct DependencyAnalyzer {
    patterns: Vec<Regex>,
    known: BTreeMap<&'static str, KnownPackage>,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        let patterns = [
            // import x from 'm' / import { a } from 'm' / import 'm'
            r#"\bimport\s+(?:[\w*{}\s,$]+?\s+from\s+)?['"]([^'"\n]+)['"]"#,
            // export { a } from 'm' / export * from 'm'
            r#"\bexport\s+(?:\*(?:\s+as\s+\w+)?|\{[^}]*\})\s+from\s+['"]([^'"\n]+)['"]"#,
            r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
            r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
        ];

        Self {
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            known: known_packages(),
        }
    }

    /// Infer the dependency set of a file collection.
    ///
    /// The result does not depend on file order.
    pub fn analyze(&self, files: &[ExtractedFile]) -> DependencyAnalysis {
        let modules: BTreeSet<String> = files
            .iter()
            .filter(|f| SCRIPT_TYPES.contains(&f.file_type.as_str()))
            .flat_map(|f| self.external_modules(&f.content))
            .collect();

        let mut analysis = DependencyAnalysis::default();
        let deps = &mut analysis.dependencies;

        for module in &modules {
            match self.known.get(module.as_str()) {
                Some(package) if package.dev => {
                    deps.dev.insert(module.clone(), package.version.to_string());
                }
                Some(package) => {
                    deps.runtime.insert(module.clone(), package.version.to_string());
                    if let Some((types, version)) = package.types {
                        deps.dev.insert(types.to_string(), version.to_string());
                    }
                }
                None => {
                    warn!("No known version for '{}', using {}", module, PERMISSIVE_VERSION);
                    deps.runtime
                        .insert(module.clone(), PERMISSIVE_VERSION.to_string());
                    analysis.unresolved.insert(module.clone());
                }
            }
        }

        ensure_essentials(deps);
        debug!(
            "Analyzed {} files: {} runtime, {} dev dependencies",
            files.len(),
            deps.runtime.len(),
            deps.dev.len()
        );
        analysis
    }

    /// Package names referenced by one file, deep imports normalized.
    pub fn external_modules(&self, content: &str) -> BTreeSet<String> {
        self.patterns
            .iter()
            .flat_map(|p| p.captures_iter(content))
            .filter_map(|caps| package_name(&caps[1]))
            .collect()
    }
}

/// Add any missing essential package.
pub fn ensure_essentials(deps: &mut DependencySet) {
    for (name, version) in ESSENTIAL_RUNTIME {
        deps.runtime
            .entry(name.to_string())
            .or_insert_with(|| version.to_string());
    }
    for (name, version) in ESSENTIAL_DEV {
        deps.runtime.remove(*name);
        deps.dev
            .entry(name.to_string())
            .or_insert_with(|| version.to_string());
    }
}

/// Registry package name for an external specifier, `None` for local ones.
pub fn package_name(specifier: &str) -> Option<String> {
    let spec = specifier.trim();
    let local = spec.is_empty()
        || spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with("@/")
        || spec.starts_with("~/")
        || spec.starts_with("node:")
        || spec.contains("://");
    if local {
        return None;
    }

    let mut segments = spec.split('/');
    let name = if spec.starts_with('@') {
        let scope = segments.next()?;
        let package = segments.next().filter(|p| !p.is_empty())?;
        format!("{}/{}", scope, package)
    } else {
        segments.next()?.to_string()
    };

    if NODE_BUILTINS.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_spec::FileSource;

    fn file(name: &str, content: &str) -> ExtractedFile {
        ExtractedFile::new(name, content, FileSource::LlmGenerated)
    }

    #[test]
    fn test_import_forms() {
        let analyzer = DependencyAnalyzer::new();
        let content = r#"
import React, { useState } from 'react';
import {
  Canvas,
  useFrame,
} from "@react-three/fiber";
import 'howler';
import type { Body } from 'matter-js';
export * from 'zustand/middleware';
const gsap = await import('gsap');
const fs = require('fs');
import Ship from './Ship';
import { api } from '@/lib/api';
"#;
        let modules: Vec<String> = analyzer.external_modules(content).into_iter().collect();
        assert_eq!(
            modules,
            vec!["@react-three/fiber", "gsap", "howler", "matter-js", "react", "zustand"]
        );
    }

    #[test]
    fn test_package_name_normalization() {
        assert_eq!(package_name("@scope/pkg/sub/path").as_deref(), Some("@scope/pkg"));
        assert_eq!(package_name("lodash/debounce").as_deref(), Some("lodash"));
        assert_eq!(package_name("node:path"), None);
        assert_eq!(package_name("../Ship"), None);
        assert_eq!(package_name("@scope"), None);
    }

    #[test]
    fn test_unknown_package_is_permissive() {
        let analyzer = DependencyAnalyzer::new();
        let analysis = analyzer.analyze(&[file("src/App.tsx", "import Engine from 'foo-engine';")]);

        assert_eq!(analysis.dependencies.runtime["foo-engine"], "latest");
        assert_eq!(analysis.unresolved(), vec!["foo-engine".to_string()]);
    }

    #[test]
    fn test_toolchain_imports_land_in_dev() {
        let analyzer = DependencyAnalyzer::new();
        let analysis = analyzer.analyze(&[file(
            "vite.config.ts",
            "import { defineConfig } from 'vite';\nimport react from '@vitejs/plugin-react';",
        )]);

        assert!(!analysis.dependencies.runtime.contains_key("vite"));
        assert_eq!(analysis.dependencies.dev["vite"], "^5.0.8");
    }

    #[test]
    fn test_non_script_files_ignored() {
        let analyzer = DependencyAnalyzer::new();
        let analysis = analyzer.analyze(&[file("README.md", "import x from 'left-pad';")]);
        assert!(!analysis.dependencies.runtime.contains_key("left-pad"));
    }
}
