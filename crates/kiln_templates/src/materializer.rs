//! Writing a project tree onto disk.
//!
//! Write order is scaffold, manifest, extracted files, fallbacks. Later
//! writes win, so generated content overrides scaffold defaults for the same
//! path. Individual write failures are recorded and skipped.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use kiln_spec::{ExtractedFile, FileSource, ProjectManifest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{TemplateError, TemplateResult};
use crate::renderer::TemplateRenderer;
use crate::store::{TemplateStore, BASE_MANIFEST_KEY};

/// Everything to be written for one project.
#[derive(Debug, Clone, Default)]
pub struct MaterializePlan {
    /// Files recovered from generated text
    pub files: Vec<ExtractedFile>,
    /// Required paths the extractor could not find
    pub missing_required: Vec<String>,
    /// Final manifest, written as `package.json`
    pub manifest: Option<ProjectManifest>,
    /// Variables for scaffold and fallback rendering
    pub variables: HashMap<String, String>,
    /// Remove an existing project directory first
    pub fresh: bool,
}

impl MaterializePlan {
    /// Plan for a project, with `project_name` and `title` variables set.
    pub fn new(project_name: &str) -> Self {
        Self {
            variables: TemplateRenderer::project_variables(project_name),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<ExtractedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing_required = missing;
        self
    }

    pub fn with_manifest(mut self, manifest: ProjectManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }
}

/// A file present in the tree after materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedFile {
    pub path: String,
    pub source: FileSource,
    pub bytes: usize,
}

/// A file that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub path: String,
    pub message: String,
}

/// Outcome of a materialization run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeReport {
    pub root: PathBuf,
    /// One entry per path, in first-write order, carrying the final source
    pub written: Vec<MaterializedFile>,
    pub failures: Vec<WriteFailure>,
    /// Missing required files with neither scaffold nor fallback content
    pub unresolved: Vec<String>,
}

impl MaterializeReport {
    fn record(&mut self, path: &str, source: FileSource, bytes: usize) {
        match self.written.iter_mut().find(|f| f.path == path) {
            Some(existing) => {
                existing.source = source;
                existing.bytes = bytes;
            }
            None => self.written.push(MaterializedFile {
                path: path.to_string(),
                source,
                bytes,
            }),
        }
    }

    fn fail(&mut self, path: &str, error: impl std::fmt::Display) {
        warn!("Failed to write {}: {}", path, error);
        self.failures.push(WriteFailure {
            path: path.to_string(),
            message: error.to_string(),
        });
    }

    /// Whether `path` ended up in the tree.
    pub fn contains(&self, path: &str) -> bool {
        self.written.iter().any(|f| f.path == path)
    }

    /// Source of the final content at `path`.
    pub fn source_of(&self, path: &str) -> Option<FileSource> {
        self.written.iter().find(|f| f.path == path).map(|f| f.source)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.unresolved.is_empty()
    }
}

/// Writes scaffold, generated and fallback files into a project directory.
pub struct StructureMaterializer {
    store: Arc<dyn TemplateStore>,
    renderer: TemplateRenderer,
}

impl StructureMaterializer {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    /// Materialize `plan` under `target_dir`.
    ///
    /// Fails only when the target directory itself cannot be prepared.
    pub fn materialize(
        &self,
        target_dir: impl AsRef<Path>,
        plan: &MaterializePlan,
    ) -> TemplateResult<MaterializeReport> {
        let root = target_dir.as_ref();
        self.prepare_root(root, plan.fresh)?;

        info!("Materializing project into {:?}", root);
        let mut report = MaterializeReport {
            root: root.to_path_buf(),
            ..Default::default()
        };

        for path in self.store.scaffold_files() {
            if let Some(template) = self.store.scaffold(&path) {
                let content = self.renderer.render_content(&template, &plan.variables);
                self.write_recorded(root, &path, &content, FileSource::Template, &mut report);
            }
        }

        if let Some(manifest) = &plan.manifest {
            match manifest.to_json_pretty() {
                Ok(json) => {
                    self.write_recorded(root, BASE_MANIFEST_KEY, &json, FileSource::Template, &mut report)
                }
                Err(e) => report.fail(BASE_MANIFEST_KEY, e),
            }
        }

        for file in &plan.files {
            if plan.manifest.is_some() && file.name == BASE_MANIFEST_KEY {
                debug!("Skipping generated package.json in favour of the built manifest");
                continue;
            }
            self.write_recorded(root, &file.name, &file.content, file.source, &mut report);
        }

        for path in &plan.missing_required {
            if report.contains(path) || root.join(path).is_file() {
                debug!("Required file {} already provided", path);
                continue;
            }
            match self.store.fallback(path) {
                Some(template) => {
                    info!("Substituting fallback template for {}", path);
                    let content = self.renderer.render_content(&template, &plan.variables);
                    self.write_recorded(root, path, &content, FileSource::Fallback, &mut report);
                }
                None => {
                    warn!("No fallback template for missing required file {}", path);
                    report.unresolved.push(path.clone());
                }
            }
        }

        info!(
            "Materialized {} files into {:?} ({} failures)",
            report.written.len(),
            root,
            report.failures.len()
        );
        Ok(report)
    }

    fn prepare_root(&self, root: &Path, fresh: bool) -> TemplateResult<()> {
        let wrap = |source| TemplateError::TargetDir {
            path: root.to_path_buf(),
            source,
        };
        if fresh && root.exists() {
            debug!("Removing previous project tree {:?}", root);
            fs::remove_dir_all(root).map_err(wrap)?;
        }
        fs::create_dir_all(root).map_err(wrap)
    }

    fn write_recorded(
        &self,
        root: &Path,
        relative: &str,
        content: &str,
        source: FileSource,
        report: &mut MaterializeReport,
    ) {
        match write_project_file(root, relative, content) {
            Ok(()) => {
                debug!("Wrote {} ({})", relative, source);
                report.record(relative, source, content.len());
            }
            Err(e) => report.fail(relative, e),
        }
    }
}

/// Write one file below `root`, creating parent directories.
///
/// Absolute paths and `..` components are rejected.
pub fn write_project_file(root: &Path, relative: &str, content: &str) -> TemplateResult<()> {
    let relative_path = Path::new(relative);
    let safe = !relative.is_empty()
        && relative_path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(TemplateError::UnsafePath(relative.to_string()));
    }

    let target = root.join(relative_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, content)?;
    Ok(())
}
