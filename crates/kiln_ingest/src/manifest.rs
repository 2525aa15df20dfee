//! Final package descriptor assembly.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_spec::{project_slug, DependencySet, EngineTag, ProjectManifest};
use kiln_templates::TemplateStore;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::deps::ensure_essentials;

/// Dependency tables read from the base template.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaseManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
}

/// Dependencies contributed by a positively detected engine.
///
/// `Both` contributes nothing: the entry file imports are already in the
/// analyzed set, and choosing one engine over the other would be a guess.
pub fn engine_dependencies(engine: EngineTag) -> DependencySet {
    match engine {
        EngineTag::Phaser => DependencySet::new().with_runtime("phaser", "^3.80.1"),
        EngineTag::Three => DependencySet::new()
            .with_runtime("three", "^0.160.0")
            .with_dev("@types/three", "^0.160.0"),
        EngineTag::None | EngineTag::Both => DependencySet::new(),
    }
}

/// Fixed script table.
pub fn default_scripts() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("dev".to_string(), "vite".to_string()),
        ("build".to_string(), "vite build".to_string()),
        ("start".to_string(), "vite preview".to_string()),
    ])
}

/// Builds the project manifest from templates and analysis.
pub struct ManifestBuilder {
    store: Option<Arc<dyn TemplateStore>>,
}

impl ManifestBuilder {
    /// Builder that starts from the store's base `package.json`.
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Builder that synthesizes every manifest from scratch.
    pub fn without_template() -> Self {
        Self { store: None }
    }

    /// Assemble the manifest for `project_name`.
    pub fn build(
        &self,
        project_name: &str,
        engine: EngineTag,
        analyzed: &DependencySet,
    ) -> ProjectManifest {
        let mut deps = self.base_dependencies();
        deps.merge(analyzed);

        if engine == EngineTag::Both {
            warn!("Both engines detected; no engine-specific dependencies added");
        }
        let extras = engine_dependencies(engine);
        for (name, version) in extras.runtime {
            deps.runtime.entry(name).or_insert(version);
        }
        for (name, version) in extras.dev {
            deps.dev.entry(name).or_insert(version);
        }

        ensure_essentials(&mut deps);

        let manifest = ProjectManifest {
            name: project_slug(project_name),
            version: "0.1.0".to_string(),
            private: true,
            module_type: "module".to_string(),
            scripts: default_scripts(),
            dependencies: deps.runtime,
            dev_dependencies: deps.dev,
        };
        debug!(
            "Built manifest for {}: {} dependencies, {} dev dependencies",
            manifest.name,
            manifest.dependencies.len(),
            manifest.dev_dependencies.len()
        );
        manifest
    }

    fn base_dependencies(&self) -> DependencySet {
        let Some(template) = self.store.as_ref().and_then(|s| s.base_manifest()) else {
            return DependencySet::new();
        };

        match serde_json::from_str::<BaseManifest>(&template) {
            Ok(base) => DependencySet {
                runtime: base.dependencies,
                dev: base.dev_dependencies,
            },
            Err(e) => {
                warn!("Base manifest template is not valid JSON, synthesizing: {}", e);
                DependencySet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_templates::BuiltinTemplates;

    #[test]
    fn test_engine_dependencies_never_both() {
        assert!(engine_dependencies(EngineTag::Both).is_empty());
        assert!(engine_dependencies(EngineTag::Phaser).contains("phaser"));
        assert!(!engine_dependencies(EngineTag::Phaser).contains("three"));
    }

    #[test]
    fn test_analyzer_wins_over_template() {
        let builder = ManifestBuilder::new(Arc::new(BuiltinTemplates::new()));
        let analyzed = DependencySet::new().with_runtime("react", "^18.3.1");

        let manifest = builder.build("My Game", EngineTag::None, &analyzed);
        assert_eq!(manifest.dependencies["react"], "^18.3.1");
        assert_eq!(manifest.dev_dependencies["vite"], "^5.0.8");
    }

    #[test]
    fn test_name_is_slugified() {
        let manifest = ManifestBuilder::without_template().build(
            "Space Shooter!!",
            EngineTag::None,
            &DependencySet::new(),
        );
        assert_eq!(manifest.name, "space-shooter");
        assert_eq!(manifest.scripts["build"], "vite build");
    }
}
