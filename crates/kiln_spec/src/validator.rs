//! Structural validation of a materialized project.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::engine::detect_engine;
use crate::error::{SpecError, SpecResult};
use crate::models::{EngineTag, ValidationReport};
use crate::schema::ProjectSchema;

/// Directories never counted or searched for forbidden files.
const IGNORED_DIRS: &[&str] = &["node_modules", "dist", "build", ".git"];

/// The parts of a package.json the dependency checks look at.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclaredDependencies {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

impl DeclaredDependencies {
    fn declares(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }
}

/// Validator for materialized project trees.
pub struct StructuralValidator;

impl StructuralValidator {
    /// Validate a project directory against a schema.
    ///
    /// Never fails: if validation itself breaks, the returned report is valid
    /// and carries a warning describing what went wrong.
    pub fn validate(project_dir: impl AsRef<Path>, schema: &ProjectSchema) -> ValidationReport {
        let project_dir = project_dir.as_ref();
        match Self::try_validate(project_dir, schema) {
            Ok(report) => report,
            Err(e) => {
                warn!("Validation of {:?} failed internally: {}", project_dir, e);
                ValidationReport::fallback(e)
            }
        }
    }

    /// Validate using a schema file, or the built-in schema when none is given.
    pub fn validate_with_schema_file(
        project_dir: impl AsRef<Path>,
        schema_path: Option<&Path>,
    ) -> ValidationReport {
        let schema = match schema_path {
            Some(path) => match ProjectSchema::load(path) {
                Ok(schema) => schema,
                Err(e) => {
                    warn!("Could not load schema {:?}: {}", path, e);
                    return ValidationReport::fallback(e);
                }
            },
            None => ProjectSchema::default(),
        };
        Self::validate(project_dir, &schema)
    }

    fn try_validate(project_dir: &Path, schema: &ProjectSchema) -> SpecResult<ValidationReport> {
        if !project_dir.is_dir() {
            return Err(SpecError::ProjectNotFound(project_dir.to_path_buf()));
        }

        let mut report = ValidationReport::new();
        let files = Self::list_files(project_dir)?;
        report.file_count = files.len();

        Self::check_required(project_dir, schema, &mut report);
        Self::check_content_patterns(project_dir, schema, &mut report);
        Self::check_forbidden(schema, &files, &mut report)?;

        if report.file_count > schema.max_file_count {
            report.add_warning(format!(
                "Project contains {} files, more than the expected maximum of {}",
                report.file_count, schema.max_file_count
            ));
        }

        report.engine = Self::check_engine(project_dir, schema, &mut report);
        Self::check_dependencies(project_dir, schema, &mut report);

        debug!(
            "Validated {:?}: {} errors, {} warnings",
            project_dir,
            report.errors.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// Relative paths (forward slashes) of every counted file.
    fn list_files(project_dir: &Path) -> SpecResult<Vec<String>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(project_dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && IGNORED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                SpecError::Io(std::io::Error::other(format!("walking project tree: {}", e)))
            })?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(project_dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push(relative);
            }
        }

        files.sort();
        Ok(files)
    }

    fn check_required(project_dir: &Path, schema: &ProjectSchema, report: &mut ValidationReport) {
        for file in &schema.required_files {
            if project_dir.join(file).is_file() {
                report.required_found += 1;
            } else {
                report.required_missing.push(file.clone());
                report.add_error(format!("Required file missing: {}", file));
            }
        }
    }

    /// File content with invalid UTF-8 replaced. An unreadable file becomes a
    /// warning and `None`.
    fn read_content(path: &Path, file: &str, report: &mut ValidationReport) -> Option<String> {
        match fs::read(path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                report.add_warning(format!("Could not read {}: {}", file, e));
                None
            }
        }
    }

    fn check_content_patterns(project_dir: &Path, schema: &ProjectSchema, report: &mut ValidationReport) {
        for (file, markers) in &schema.content_patterns {
            let path = project_dir.join(file);
            if !path.is_file() {
                // Missing files are reported by the required-file check
                continue;
            }
            let Some(content) = Self::read_content(&path, file, report) else {
                continue;
            };
            for marker in markers {
                if !content.contains(marker.as_str()) {
                    report.add_warning(format!("{} does not contain expected '{}'", file, marker));
                }
            }
        }
    }

    fn check_forbidden(
        schema: &ProjectSchema,
        files: &[String],
        report: &mut ValidationReport,
    ) -> SpecResult<()> {
        let patterns = schema.forbidden_patterns()?;
        for file in files {
            if let Some(pattern) = patterns.iter().find(|p| p.matches(file)) {
                report.forbidden_present.push(file.clone());
                report.add_error(format!(
                    "Forbidden file present: {} (matches '{}')",
                    file,
                    pattern.as_str()
                ));
            }
        }
        Ok(())
    }

    fn check_engine(project_dir: &Path, schema: &ProjectSchema, report: &mut ValidationReport) -> EngineTag {
        let entry: PathBuf = project_dir.join(&schema.entry_file);
        if !entry.is_file() {
            return EngineTag::None;
        }
        let Some(content) = Self::read_content(&entry, &schema.entry_file, report) else {
            return EngineTag::None;
        };

        let engine = detect_engine(&content, &schema.engines);
        if engine == EngineTag::Both {
            report.add_warning(format!(
                "{} contains markers of more than one engine",
                schema.entry_file
            ));
        }
        engine
    }

    fn check_dependencies(project_dir: &Path, schema: &ProjectSchema, report: &mut ValidationReport) {
        let manifest_path = project_dir.join("package.json");
        if !manifest_path.is_file() {
            // Already reported as a missing required file when the schema asks for it
            return;
        }

        let manifest = fs::read_to_string(&manifest_path)
            .map_err(SpecError::from)
            .and_then(|c| serde_json::from_str::<DeclaredDependencies>(&c).map_err(SpecError::from));

        let manifest = match manifest {
            Ok(m) => m,
            Err(e) => {
                report.add_error(format!("package.json is not a valid manifest: {}", e));
                return;
            }
        };

        for dep in &schema.required_dependencies {
            if !manifest.declares(dep) {
                report.add_error(format!("Required dependency missing from manifest: {}", dep));
            }
        }
        for dep in &schema.forbidden_dependencies {
            if manifest.declares(dep) {
                report.add_error(format!("Forbidden dependency declared in manifest: {}", dep));
            }
        }
    }
}
