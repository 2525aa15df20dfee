//! Text-to-project assembly: extract, analyze, build the manifest,
//! materialize and validate.
//!
//! Each step is exposed separately so the pipeline can report between them;
//! [`ProjectAssembler::assemble`] runs them back to back.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use kiln_ingest::{load_targets, DependencyAnalysis, DependencyAnalyzer, ExtractionOutcome, Extractor, ManifestBuilder};
use kiln_spec::{detect_engine, EngineTag, ProjectManifest, ProjectSchema, StructuralValidator, ValidationReport};
use kiln_templates::{
    BuiltinTemplates, LayeredTemplateStore, MaterializePlan, MaterializeReport, StructureMaterializer,
    TemplateStore,
};

use crate::config::KilnConfig;
use crate::error::SessionResult;

/// Dependencies and manifest derived from extracted files.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub dependencies: DependencyAnalysis,
    pub engine: EngineTag,
    pub manifest: ProjectManifest,
}

/// Everything produced for one project.
#[derive(Debug)]
pub struct AssembledProject {
    pub extraction: ExtractionOutcome,
    pub analysis: Analysis,
    pub materialized: MaterializeReport,
    pub validation: ValidationReport,
}

/// Wires the extractor, analyzer, manifest builder, materializer and
/// validator together.
pub struct ProjectAssembler {
    extractor: Extractor,
    analyzer: DependencyAnalyzer,
    manifests: ManifestBuilder,
    materializer: StructureMaterializer,
    schema: ProjectSchema,
}

impl Default for ProjectAssembler {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinTemplates::new()), ProjectSchema::default(), Extractor::default())
    }
}

impl ProjectAssembler {
    pub fn new(store: Arc<dyn TemplateStore>, schema: ProjectSchema, extractor: Extractor) -> Self {
        Self {
            extractor,
            analyzer: DependencyAnalyzer::new(),
            manifests: ManifestBuilder::new(store.clone()),
            materializer: StructureMaterializer::new(store),
            schema,
        }
    }

    /// Templates, schema and targets as configured.
    pub fn from_config(config: &KilnConfig) -> SessionResult<Self> {
        let store: Arc<dyn TemplateStore> = match &config.templates_dir {
            Some(dir) => Arc::new(LayeredTemplateStore::with_overrides(dir)?),
            None => Arc::new(BuiltinTemplates::new()),
        };
        let schema = match &config.schema {
            Some(path) => ProjectSchema::load(path)?,
            None => ProjectSchema::default(),
        };
        let extractor = match &config.targets {
            Some(path) => Extractor::new(load_targets(path)?),
            None => Extractor::default(),
        };
        Ok(Self::new(store, schema, extractor))
    }

    pub fn schema(&self) -> &ProjectSchema {
        &self.schema
    }

    pub fn extract(&self, text: &str) -> ExtractionOutcome {
        let outcome = self.extractor.extract_all(text);
        if !outcome.missing_required.is_empty() {
            warn!(
                "Required files not found in generated text: {}",
                outcome.missing_required.join(", ")
            );
        }
        outcome
    }

    pub fn analyze(&self, project_name: &str, extraction: &ExtractionOutcome) -> Analysis {
        let dependencies = self.analyzer.analyze(&extraction.files);
        let unresolved = dependencies.unresolved();
        if !unresolved.is_empty() {
            warn!("Unknown packages pinned to latest: {}", unresolved.join(", "));
        }

        let combined = extraction
            .files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let engine = detect_engine(&combined, &self.schema.engines);
        let manifest = self
            .manifests
            .build(project_name, engine, &dependencies.dependencies);

        Analysis {
            dependencies,
            engine,
            manifest,
        }
    }

    /// Write the project into `dir`, replacing anything already there.
    pub fn materialize(
        &self,
        dir: &Path,
        project_name: &str,
        extraction: &ExtractionOutcome,
        analysis: &Analysis,
    ) -> SessionResult<MaterializeReport> {
        let plan = MaterializePlan::new(project_name)
            .with_files(extraction.files.clone())
            .with_missing(extraction.missing_required.clone())
            .with_manifest(analysis.manifest.clone())
            .fresh(true);
        let report = self.materializer.materialize(dir, &plan)?;
        for failure in &report.failures {
            warn!("Could not write {}: {}", failure.path, failure.message);
        }
        Ok(report)
    }

    pub fn validate(&self, dir: &Path) -> ValidationReport {
        let report = StructuralValidator::validate(dir, &self.schema);
        info!(
            "Validation: {} ({} errors, {} warnings)",
            if report.valid { "valid" } else { "invalid" },
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    /// Run every step for `text`.
    pub fn assemble(&self, text: &str, project_name: &str, dir: &Path) -> SessionResult<AssembledProject> {
        let extraction = self.extract(text);
        let analysis = self.analyze(project_name, &extraction);
        let materialized = self.materialize(dir, project_name, &extraction, &analysis)?;
        let validation = self.validate(dir);
        Ok(AssembledProject {
            extraction,
            analysis,
            materialized,
            validation,
        })
    }
}
