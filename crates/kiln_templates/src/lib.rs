//! # kiln_templates
//!
//! Template store and project materialization for Kiln.
//!
//! Templates are plain files addressed by logical key:
//!
//! - `scaffold/<path>` is copied into every project before generated files
//! - `fallback/<path>` stands in for a required file the generator did not produce
//! - `package.json` is the base manifest merged with detected dependencies
//!
//! The built-in set is compiled into the crate; a directory on disk can
//! override any key.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_templates::{BuiltinTemplates, MaterializePlan, StructureMaterializer};
//!
//! let materializer = StructureMaterializer::new(Arc::new(BuiltinTemplates::new()));
//! let plan = MaterializePlan::new("space-shooter").with_missing(vec!["src/App.tsx".into()]);
//! let report = materializer.materialize("./generated/space-shooter", &plan).unwrap();
//! println!("{} files written", report.written.len());
//! ```

pub mod error;
pub mod materializer;
pub mod renderer;
pub mod store;

pub use error::{TemplateError, TemplateResult};
pub use materializer::{
    write_project_file, MaterializePlan, MaterializeReport, MaterializedFile, StructureMaterializer,
    WriteFailure,
};
pub use renderer::TemplateRenderer;
pub use store::{
    BuiltinTemplates, DirTemplateStore, LayeredTemplateStore, TemplateStore, BASE_MANIFEST_KEY,
    FALLBACK_PREFIX, SCAFFOLD_PREFIX,
};
