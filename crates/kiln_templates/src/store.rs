//! Template stores.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::TemplateResult;

/// Key prefix of files copied into every project.
pub const SCAFFOLD_PREFIX: &str = "scaffold/";
/// Key prefix of stand-ins for missing required files.
pub const FALLBACK_PREFIX: &str = "fallback/";
/// Key of the base manifest.
pub const BASE_MANIFEST_KEY: &str = "package.json";

/// Source of template content addressed by logical key.
pub trait TemplateStore: Send + Sync {
    /// Raw content for a key, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// All keys this store can serve.
    fn keys(&self) -> Vec<String>;

    /// Project-relative paths of the scaffold files.
    fn scaffold_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(SCAFFOLD_PREFIX).map(str::to_string))
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Scaffold content for a project-relative path.
    fn scaffold(&self, path: &str) -> Option<String> {
        self.get(&format!("{}{}", SCAFFOLD_PREFIX, path))
    }

    /// Fallback content for a project-relative path.
    fn fallback(&self, path: &str) -> Option<String> {
        self.get(&format!("{}{}", FALLBACK_PREFIX, path))
    }

    /// The base `package.json` template.
    fn base_manifest(&self) -> Option<String> {
        self.get(BASE_MANIFEST_KEY)
    }
}

const BUILTIN: &[(&str, &str)] = &[
    ("scaffold/index.html", include_str!("../assets/scaffold/index.html")),
    ("scaffold/vite.config.ts", include_str!("../assets/scaffold/vite.config.ts")),
    ("scaffold/tsconfig.json", include_str!("../assets/scaffold/tsconfig.json")),
    ("scaffold/src/index.css", include_str!("../assets/scaffold/src/index.css")),
    ("scaffold/src/vite-env.d.ts", include_str!("../assets/scaffold/src/vite-env.d.ts")),
    ("fallback/src/main.tsx", include_str!("../assets/fallback/src/main.tsx")),
    ("fallback/src/App.tsx", include_str!("../assets/fallback/src/App.tsx")),
    ("package.json", include_str!("../assets/package.json")),
];

/// Templates compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateStore for BuiltinTemplates {
    fn get(&self, key: &str) -> Option<String> {
        BUILTIN
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, content)| content.to_string())
    }

    fn keys(&self) -> Vec<String> {
        BUILTIN.iter().map(|(k, _)| k.to_string()).collect()
    }
}

/// Templates read from a directory tree, keyed by relative path.
#[derive(Debug, Clone)]
pub struct DirTemplateStore {
    root: PathBuf,
    entries: BTreeMap<String, String>,
}

impl DirTemplateStore {
    /// Load every readable text file under `root`.
    ///
    /// A missing directory yields an empty store.
    pub fn load(root: impl Into<PathBuf>) -> TemplateResult<Self> {
        let root = root.into();
        let mut entries = BTreeMap::new();

        if !root.exists() {
            warn!("Templates directory does not exist: {:?}", root);
            return Ok(Self { root, entries });
        }

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some(key) = Self::key_for(&root, entry.path()) else {
                continue;
            };
            match fs::read_to_string(entry.path()) {
                Ok(content) => {
                    debug!("Loaded template: {}", key);
                    entries.insert(key, content);
                }
                Err(e) => warn!("Failed to read template {:?}: {}", entry.path(), e),
            }
        }

        info!("Loaded {} templates from {:?}", entries.len(), root);
        Ok(Self { root, entries })
    }

    fn key_for(root: &Path, path: &Path) -> Option<String> {
        path.strip_prefix(root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Directory the store was loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TemplateStore for DirTemplateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Stack of stores; the first layer holding a key wins.
#[derive(Clone, Default)]
pub struct LayeredTemplateStore {
    layers: Vec<Arc<dyn TemplateStore>>,
}

impl LayeredTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer below the existing ones.
    pub fn with_layer(mut self, layer: Arc<dyn TemplateStore>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Templates from `dir` over the built-in set.
    pub fn with_overrides(dir: impl Into<PathBuf>) -> TemplateResult<Self> {
        Ok(Self::new()
            .with_layer(Arc::new(DirTemplateStore::load(dir)?))
            .with_layer(Arc::new(BuiltinTemplates::new())))
    }
}

impl TemplateStore for LayeredTemplateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.layers.iter().flat_map(|l| l.keys()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
