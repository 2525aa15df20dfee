//! Service configuration.
//!
//! Loaded from an optional YAML file, then overridden by `KILN_*`
//! environment variables, then validated.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use kiln_runner::{OrchestratorConfig, Toolchain};

use crate::error::{SessionError, SessionResult};

/// Top-level Kiln configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// HTTP listen address
    pub bind: SocketAddr,
    /// One directory per generated project is created here
    pub projects_root: PathBuf,
    /// Directory overlaying the built-in templates
    pub templates_dir: Option<PathBuf>,
    /// System prompts for the generation chain, one file per stage
    pub prompts_dir: PathBuf,
    /// Per-session stage logs
    pub logs_dir: PathBuf,
    /// Project schema file; the built-in schema when absent
    pub schema: Option<PathBuf>,
    /// Extraction targets file; the built-in targets when absent
    pub targets: Option<PathBuf>,
    /// Model override for the LLM stages
    pub llm_model: Option<String>,
    pub vite_base_port: Option<u16>,
    pub node_base_port: Option<u16>,
    pub runner: OrchestratorConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            projects_root: PathBuf::from("projects"),
            templates_dir: None,
            prompts_dir: PathBuf::from("prompts"),
            logs_dir: PathBuf::from("logs"),
            schema: None,
            targets: None,
            llm_model: None,
            vite_base_port: None,
            node_base_port: None,
            runner: OrchestratorConfig::default(),
        }
    }
}

impl KilnConfig {
    /// Load from `path` (defaults when `None`), apply environment overrides
    /// and validate.
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            return Err(SessionError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Apply `KILN_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> SessionResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("KILN_BIND") {
            self.bind = parse_env("KILN_BIND", &v)?;
        }
        if let Some(v) = get("KILN_PROJECTS_ROOT") {
            self.projects_root = PathBuf::from(v);
        }
        if let Some(v) = get("KILN_SERVED_ROOT") {
            self.runner.served_root = PathBuf::from(v);
        }
        if let Some(v) = get("KILN_TEMPLATES_DIR") {
            self.templates_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("KILN_PROMPTS_DIR") {
            self.prompts_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KILN_LOGS_DIR") {
            self.logs_dir = PathBuf::from(&v);
            self.runner.deploy_log = PathBuf::from(v).join("deployments.log");
        }
        if let Some(v) = get("KILN_PROXY_ENABLED") {
            self.runner.proxy_enabled = parse_bool("KILN_PROXY_ENABLED", &v)?;
        }
        if let Some(v) = get("KILN_BASE_DOMAIN") {
            self.runner.base_domain = v;
        }
        if let Some(v) = get("KILN_TOOLCHAIN") {
            self.runner.toolchain = v
                .parse::<Toolchain>()
                .map_err(|e| SessionError::Config(format!("KILN_TOOLCHAIN: {}", e)))?;
        }
        if let Some(v) = get("KILN_VITE_BASE_PORT") {
            self.vite_base_port = Some(parse_env("KILN_VITE_BASE_PORT", &v)?);
        }
        if let Some(v) = get("KILN_NODE_BASE_PORT") {
            self.node_base_port = Some(parse_env("KILN_NODE_BASE_PORT", &v)?);
        }
        if let Some(v) = get("KILN_SCHEMA") {
            self.schema = Some(PathBuf::from(v));
        }
        if let Some(v) = get("KILN_LLM_MODEL") {
            self.llm_model = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> SessionResult<()> {
        self.runner
            .validate()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        if self.projects_root.as_os_str().is_empty() {
            return Err(SessionError::Config("projects_root must not be empty".into()));
        }
        Ok(())
    }

    /// Runner settings with the toolchain-specific base port applied.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut runner = self.runner.clone();
        if runner.base_port.is_none() {
            runner.base_port = match runner.toolchain {
                Toolchain::Vite => self.vite_base_port,
                Toolchain::NodeServer => self.node_base_port,
            };
        }
        runner
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_root.join(project_id)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> SessionResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SessionError::Config(format!("{}: {}", key, e)))
}

fn parse_bool(key: &str, value: &str) -> SessionResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SessionError::Config(format!(
            "{}: expected a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KilnConfig::default();
        config
            .apply_env_from(lookup(&[
                ("KILN_PROJECTS_ROOT", "/srv/kiln/projects"),
                ("KILN_PROXY_ENABLED", "yes"),
                ("KILN_BASE_DOMAIN", "games.example.com"),
                ("KILN_VITE_BASE_PORT", "6000"),
                ("KILN_LOGS_DIR", "/var/log/kiln"),
            ]))
            .unwrap();

        assert_eq!(config.projects_root, PathBuf::from("/srv/kiln/projects"));
        assert!(config.runner.proxy_enabled);
        assert_eq!(config.runner.base_domain, "games.example.com");
        assert_eq!(config.runner.deploy_log, PathBuf::from("/var/log/kiln/deployments.log"));
        assert_eq!(config.orchestrator_config().base_port, Some(6000));
    }

    #[test]
    fn test_node_port_applies_to_node_toolchain_only() {
        let mut config = KilnConfig {
            node_base_port: Some(3100),
            ..Default::default()
        };
        assert_eq!(config.orchestrator_config().base_port, None);
        config.runner.toolchain = Toolchain::NodeServer;
        assert_eq!(config.orchestrator_config().effective_base_port(), 3100);
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = KilnConfig::default();
        assert!(config
            .apply_env_from(lookup(&[("KILN_PROXY_ENABLED", "maybe")]))
            .is_err());
        assert!(config
            .apply_env_from(lookup(&[("KILN_VITE_BASE_PORT", "70000")]))
            .is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.yaml");
        fs::write(
            &path,
            "projects_root: /tmp/generated\nrunner:\n  toolchain: node-server\n  port_range: 20\n",
        )
        .unwrap();

        let config = KilnConfig::from_file(&path).unwrap();
        assert_eq!(config.projects_root, PathBuf::from("/tmp/generated"));
        assert_eq!(config.runner.toolchain, Toolchain::NodeServer);
        assert_eq!(config.runner.port_range, 20);
        assert_eq!(config.runner.package_manager, "npm");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_proxy_without_reload() {
        let mut config = KilnConfig::default();
        config.runner.proxy_enabled = true;
        config.runner.reload_command.clear();
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));
    }
}
