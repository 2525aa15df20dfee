//! Integration tests from generated text to a validated project tree.

use std::sync::Arc;

use kiln_ingest::{DependencyAnalyzer, Extractor, ManifestBuilder};
use kiln_spec::{
    detect_engine, DependencySet, EngineMarkers, EngineTag, ExtractedFile, FileSource,
    ProjectSchema, StructuralValidator,
};
use kiln_templates::{BuiltinTemplates, MaterializePlan, StructureMaterializer};
use tempfile::tempdir;

const APP: &str = r#"import React from 'react';
import Phaser from 'phaser';
import Engine from 'foo-engine';

export default function App() {
  return <div id="game">{new Phaser.Game({ type: Phaser.AUTO })}</div>;
}"#;

fn essentials_present(deps: &DependencySet) {
    for name in ["react", "react-dom"] {
        assert!(deps.runtime.contains_key(name), "runtime {} missing", name);
    }
    for name in ["typescript", "vite", "@vitejs/plugin-react", "@types/react", "@types/react-dom"] {
        assert!(deps.dev.contains_key(name), "dev {} missing", name);
    }
}

#[test]
fn test_single_app_block_becomes_valid_project() {
    let text = format!("=== src/App.tsx ===\n{}\n", APP);
    let store = Arc::new(BuiltinTemplates::new());

    let outcome = Extractor::default().extract_all(&text);
    let analysis = DependencyAnalyzer::new().analyze(&outcome.files);
    let app = &outcome.get("src/App.tsx").unwrap().content;
    let engine = detect_engine(app, &EngineMarkers::defaults());
    let manifest =
        ManifestBuilder::new(store.clone()).build("Phaser Blaster", engine, &analysis.dependencies);

    let temp = tempdir().unwrap();
    let plan = MaterializePlan::new(&manifest.name)
        .with_files(outcome.files.clone())
        .with_missing(outcome.missing_required.clone())
        .with_manifest(manifest.clone());
    let report = StructureMaterializer::new(store).materialize(temp.path(), &plan).unwrap();

    assert_eq!(engine, EngineTag::Phaser);
    assert_eq!(manifest.dependencies["foo-engine"], "latest");
    assert_eq!(manifest.dependencies["phaser"], "^3.80.1");
    assert_eq!(report.source_of("src/App.tsx"), Some(FileSource::LlmGenerated));
    assert_eq!(report.source_of("src/main.tsx"), Some(FileSource::Fallback));
    assert!(temp.path().join("index.html").is_file());
    assert!(temp.path().join("package.json").is_file());

    let validation = StructuralValidator::validate(temp.path(), &ProjectSchema::default());
    assert!(validation.required_missing.is_empty(), "{:?}", validation.errors);
    assert!(validation.valid, "{:?}", validation.errors);
    assert_eq!(validation.engine, EngineTag::Phaser);
}

#[test]
fn test_unrecognized_package_gets_latest() {
    let files = vec![ExtractedFile::new(
        "src/App.tsx",
        "import Engine from 'foo-engine';\nexport default function App() { return null }",
        FileSource::LlmGenerated,
    )];

    let analysis = DependencyAnalyzer::new().analyze(&files);
    let manifest =
        ManifestBuilder::without_template().build("x", EngineTag::None, &analysis.dependencies);

    assert_eq!(manifest.dependencies["foo-engine"], "latest");
    essentials_present(&manifest.dependency_set());
}

#[test]
fn test_essentials_present_for_empty_input() {
    let manifest =
        ManifestBuilder::without_template().build("", EngineTag::None, &DependencySet::new());

    assert_eq!(manifest.name, "game-project");
    essentials_present(&manifest.dependency_set());

    let analysis = DependencyAnalyzer::new().analyze(&[]);
    essentials_present(&analysis.dependencies);
}

#[test]
fn test_analysis_is_order_independent() {
    let files = vec![
        ExtractedFile::new("src/a.ts", "import * as THREE from 'three';", FileSource::LlmGenerated),
        ExtractedFile::new("src/b.ts", "import { create } from 'zustand';", FileSource::LlmGenerated),
        ExtractedFile::new("src/c.ts", "const m = require('mystery-lib/sub');", FileSource::LlmGenerated),
    ];
    let mut reversed = files.clone();
    reversed.reverse();

    let analyzer = DependencyAnalyzer::new();
    assert_eq!(analyzer.analyze(&files), analyzer.analyze(&reversed));
    assert_eq!(analyzer.analyze(&files).unresolved(), vec!["mystery-lib".to_string()]);
}

#[test]
fn test_both_engines_add_no_engine_extras() {
    let manifest =
        ManifestBuilder::without_template().build("dual", EngineTag::Both, &DependencySet::new());

    assert!(!manifest.declares("phaser"));
    assert!(!manifest.declares("three"));
}
