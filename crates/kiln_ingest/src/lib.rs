//! # kiln_ingest
//!
//! Turns generated text into project inputs:
//!
//! - [`Extractor`] recovers named files through an ordered strategy chain
//! - [`DependencyAnalyzer`] infers runtime and dev dependencies from imports
//! - [`ManifestBuilder`] merges them with the base template into a manifest

pub mod deps;
pub mod error;
pub mod extractor;
pub mod manifest;
pub mod sanitize;
pub mod strategy;
pub mod targets;

pub use deps::{DependencyAnalysis, DependencyAnalyzer, PERMISSIVE_VERSION};
pub use error::{IngestError, IngestResult};
pub use extractor::{passes_sanity_check, ExtractionOutcome, Extractor};
pub use manifest::{engine_dependencies, ManifestBuilder};
pub use sanitize::Sanitizer;
pub use strategy::{
    default_strategies, CommentMarker, DelimiterBlock, ExtractionStrategy, FencedPathBlock,
    StructuralHeuristic,
};
pub use targets::{load_targets, ExtractionTarget, RequiredImport, StructuralRule};
