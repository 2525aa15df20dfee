//! Toolchains and readiness detection.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CommandSpec;

/// Decides from one output line whether a server finished starting.
pub trait ReadinessDetector: Send + Sync {
    fn detect_ready(&self, line: &str) -> bool;
}

/// Matches any of a set of substrings after stripping ANSI escapes.
pub struct MarkerDetector {
    markers: Vec<String>,
    ansi: Regex,
}

impl MarkerDetector {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
            ansi: Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap(),
        }
    }

    pub fn strip_ansi(&self, line: &str) -> String {
        self.ansi.replace_all(line, "").to_string()
    }
}

impl ReadinessDetector for MarkerDetector {
    fn detect_ready(&self, line: &str) -> bool {
        let plain = self.strip_ansi(line);
        self.markers.iter().any(|m| plain.contains(m.as_str()))
    }
}

/// Dev-server toolchain of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Toolchain {
    #[default]
    Vite,
    NodeServer,
}

impl Toolchain {
    pub fn base_port(&self) -> u16 {
        match self {
            Self::Vite => 5173,
            Self::NodeServer => 3000,
        }
    }

    pub fn ready_markers(&self) -> &'static [&'static str] {
        match self {
            Self::Vite => &["Local:", "ready in"],
            Self::NodeServer => &["Ready", "listening on"],
        }
    }

    pub fn detector(&self) -> MarkerDetector {
        MarkerDetector::new(self.ready_markers().iter().copied())
    }

    /// Dev-server command bound to `port`.
    pub fn dev_command(&self, package_manager: &str, port: u16) -> CommandSpec {
        match self {
            Self::Vite => CommandSpec::new(package_manager).args([
                "run".to_string(),
                "dev".to_string(),
                "--".to_string(),
                "--port".to_string(),
                port.to_string(),
                "--strictPort".to_string(),
            ]),
            Self::NodeServer => CommandSpec::new(package_manager)
                .args(["run", "dev"])
                .env("PORT", port.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vite => "vite",
            Self::NodeServer => "node-server",
        }
    }
}

impl std::str::FromStr for Toolchain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vite" => Ok(Self::Vite),
            "node-server" | "node" | "next" => Ok(Self::NodeServer),
            other => Err(format!("unknown toolchain: {}", other)),
        }
    }
}

impl std::fmt::Display for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vite_ready_with_colors() {
        let detector = Toolchain::Vite.detector();
        assert!(detector.detect_ready("  \x1b[32m➜\x1b[39m  \x1b[1mLocal\x1b[22m:   http://localhost:5173/"));
        assert!(detector.detect_ready("  VITE v5.0.8  ready in 312 ms"));
        assert!(!detector.detect_ready("> vite --port 5173"));
    }

    #[test]
    fn test_node_ready() {
        let detector = Toolchain::NodeServer.detector();
        assert!(detector.detect_ready("Server listening on http://localhost:3000"));
        assert!(!detector.detect_ready("compiling..."));
    }

    #[test]
    fn test_dev_commands() {
        let vite = Toolchain::Vite.dev_command("npm", 5174);
        assert_eq!(vite.display(), "npm run dev -- --port 5174 --strictPort");

        let node = Toolchain::NodeServer.dev_command("pnpm", 3001);
        assert_eq!(node.env.get("PORT"), Some(&"3001".to_string()));
    }

    #[test]
    fn test_parse_toolchain() {
        assert_eq!("vite".parse::<Toolchain>().unwrap(), Toolchain::Vite);
        assert_eq!("node-server".parse::<Toolchain>().unwrap(), Toolchain::NodeServer);
        assert!("webpack".parse::<Toolchain>().is_err());
    }
}
