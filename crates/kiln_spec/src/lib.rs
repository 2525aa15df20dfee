//! # kiln_spec
//!
//! Shared project data model and structural validation for Kiln.
//!
//! This crate is the leaf of the workspace. It owns the types every pipeline
//! stage passes along (extracted files, dependency sets, package manifests,
//! validation reports) and the schema a materialized project is checked
//! against.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiln_spec::{ProjectSchema, StructuralValidator};
//!
//! let schema = ProjectSchema::default();
//! let report = StructuralValidator::validate("./generated/space-shooter", &schema);
//! if !report.valid {
//!     for error in &report.errors {
//!         eprintln!("Error: {}", error);
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod models;
pub mod schema;
pub mod slug;
pub mod validator;

pub use engine::{detect_engine, EngineMarkers};
pub use error::{SpecError, SpecResult};
pub use models::{
    DependencySet, EngineTag, ExtractedFile, FileSource, ProjectManifest, ValidationReport,
    ValidationSummary,
};
pub use schema::ProjectSchema;
pub use slug::{is_valid_slug, project_slug, sanitize_subdomain, slugify};
pub use validator::StructuralValidator;
