//! Command and orchestrator configuration types.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};
use crate::readiness::Toolchain;

/// A subprocess invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory (inherited when absent)
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Build from an argv list; `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.workdir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Runner-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory the edge proxy serves deployed projects from
    pub served_root: PathBuf,
    /// Append-only deployment log
    pub deploy_log: PathBuf,
    /// Deploy behind the proxy instead of starting dev servers
    pub proxy_enabled: bool,
    /// Proxy reload command as argv
    pub reload_command: Vec<String>,
    /// Where `<subdomain>.conf` server blocks are written, if anywhere
    pub site_config_dir: Option<PathBuf>,
    /// Domain deployed subdomains live under
    pub base_domain: String,
    pub toolchain: Toolchain,
    /// Overrides the toolchain's base port
    pub base_port: Option<u16>,
    pub port_range: u16,
    pub package_manager: String,
    pub install_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub reload_timeout_secs: u64,
    pub max_subdomain_length: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            served_root: PathBuf::from("/var/www/kiln"),
            deploy_log: PathBuf::from("logs/deployments.log"),
            proxy_enabled: false,
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            site_config_dir: None,
            base_domain: "localhost".to_string(),
            toolchain: Toolchain::Vite,
            base_port: None,
            port_range: 100,
            package_manager: "npm".to_string(),
            install_timeout_secs: 300,
            build_timeout_secs: 300,
            ready_timeout_secs: 30,
            reload_timeout_secs: 30,
            max_subdomain_length: 63,
        }
    }
}

impl OrchestratorConfig {
    /// Base port for the configured toolchain.
    pub fn effective_base_port(&self) -> u16 {
        self.base_port.unwrap_or_else(|| self.toolchain.base_port())
    }

    /// Check internal consistency.
    pub fn validate(&self) -> RunnerResult<()> {
        if self.port_range == 0 {
            return Err(RunnerError::InvalidConfig("port_range must be at least 1".into()));
        }
        if self.package_manager.trim().is_empty() {
            return Err(RunnerError::InvalidConfig("package_manager must not be empty".into()));
        }
        if self.proxy_enabled && self.reload_command.is_empty() {
            return Err(RunnerError::InvalidConfig(
                "reload_command is required when proxy deployment is enabled".into(),
            ));
        }
        if self.ready_timeout_secs == 0 {
            return Err(RunnerError::InvalidConfig("ready_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn served_dir(&self, subdomain: &str) -> PathBuf {
        self.served_root.join(subdomain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("npm")
            .args(["run", "dev"])
            .env("PORT", "3000")
            .workdir("/tmp/project");

        assert_eq!(spec.display(), "npm run dev");
        assert_eq!(spec.env.get("PORT"), Some(&"3000".to_string()));
        assert_eq!(spec.workdir, Some(PathBuf::from("/tmp/project")));
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["systemctl".to_string(), "reload".to_string(), "nginx".to_string()];
        let spec = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(spec.program, "systemctl");
        assert_eq!(spec.args, vec!["reload", "nginx"]);
        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[test]
    fn test_validate() {
        assert!(OrchestratorConfig::default().validate().is_ok());

        let config = OrchestratorConfig {
            proxy_enabled: true,
            reload_command: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RunnerError::InvalidConfig(_))));

        let config = OrchestratorConfig {
            port_range: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_base_port() {
        let mut config = OrchestratorConfig::default();
        assert_eq!(config.effective_base_port(), 5173);
        config.toolchain = Toolchain::NodeServer;
        assert_eq!(config.effective_base_port(), 3000);
        config.base_port = Some(8000);
        assert_eq!(config.effective_base_port(), 8000);
    }
}
