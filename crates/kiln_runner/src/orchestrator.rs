//! Install, start and deploy materialized projects.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use kiln_spec::sanitize_subdomain;

use crate::config::{CommandSpec, OrchestratorConfig};
use crate::deploy_log::{DeployStatus, DeploymentLog};
use crate::error::{RunnerError, RunnerResult};
use crate::port::PortAllocator;
use crate::process::{ProcessHandle, ProcessRunner, RunningProcess};
use crate::readiness::ReadinessDetector;
use crate::site::write_server_block;
use crate::state::{DeployState, DeployTracker, StateObserver};

/// Conventional build output folders, checked in order.
pub const OUTPUT_DIRS: &[&str] = &["dist", "build", "out"];

/// Never copied into the served directory.
const COPY_EXCLUDES: &[&str] = &["node_modules", ".git"];

/// Output lines kept for start-failure messages.
const TAIL_LINES: usize = 20;

/// Attempts before giving up on ports lost to a concurrent bind.
const BIND_ATTEMPTS: usize = 3;

/// How a project is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    /// Dev server on a local port
    Development,
    /// Static build behind the edge proxy
    #[serde(rename = "nginx")]
    Proxy,
}

impl std::fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Proxy => write!(f, "nginx"),
        }
    }
}

/// A started or deployed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHandle {
    pub project_id: String,
    /// Local port (development only)
    pub port: Option<u16>,
    pub url: String,
    pub kind: DeploymentKind,
    /// False when the readiness timeout passed without a marker
    pub ready_confirmed: bool,
    pub pid: Option<u32>,
}

/// Result of watching a fresh process for readiness.
#[derive(Debug)]
enum Readiness {
    Ready,
    TimedOut,
    Exited { code: Option<i32>, tail: String },
}

struct TrackedServer {
    handle: ServerHandle,
    process: Option<ProcessHandle>,
}

/// Drives install, start and deploy for materialized projects.
pub struct Orchestrator {
    config: OrchestratorConfig,
    runner: Arc<dyn ProcessRunner>,
    ports: PortAllocator,
    detector: Arc<dyn ReadinessDetector>,
    deploy_log: DeploymentLog,
    servers: Mutex<HashMap<String, TrackedServer>>,
    observer: Option<StateObserver>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, runner: Arc<dyn ProcessRunner>) -> RunnerResult<Self> {
        config.validate()?;
        Ok(Self {
            ports: PortAllocator::new(config.port_range),
            detector: Arc::new(config.toolchain.detector()),
            deploy_log: DeploymentLog::new(&config.deploy_log),
            config,
            runner,
            servers: Mutex::new(HashMap::new()),
            observer: None,
        })
    }

    /// Receive every state transition.
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the toolchain's readiness detector.
    pub fn with_detector(mut self, detector: Arc<dyn ReadinessDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_ports(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn deployment_log(&self) -> &DeploymentLog {
        &self.deploy_log
    }

    /// Serve a project the configured way: proxy deploy when enabled,
    /// otherwise a dev server.
    pub async fn launch(
        &self,
        project_id: &str,
        project_dir: &Path,
        subdomain: Option<&str>,
    ) -> RunnerResult<ServerHandle> {
        if self.config.proxy_enabled {
            self.deploy(project_id, project_dir, subdomain.unwrap_or(project_id))
                .await
        } else {
            self.start_development(project_id, project_dir).await
        }
    }

    /// Install dependencies and start the dev server.
    ///
    /// Resolves as soon as a readiness marker is seen, or with
    /// `ready_confirmed = false` once the readiness timeout passes.
    pub async fn start_development(
        &self,
        project_id: &str,
        project_dir: &Path,
    ) -> RunnerResult<ServerHandle> {
        if self.stop(project_id).await {
            info!("Stopped previous server for {}", project_id);
        }

        let mut tracker = DeployTracker::new(project_id, self.observer.clone());
        tracker.advance(DeployState::Installing)?;
        if let Err(e) = self.install(project_dir).await {
            tracker.fail();
            return Err(e);
        }

        tracker.advance(DeployState::Starting)?;
        match self.start_server(project_id, project_dir).await {
            Ok((handle, process)) => {
                tracker.advance(DeployState::Ready)?;
                self.servers.lock().insert(
                    project_id.to_string(),
                    TrackedServer {
                        handle: handle.clone(),
                        process: Some(process),
                    },
                );
                Ok(handle)
            }
            Err(e) => {
                tracker.fail();
                Err(e)
            }
        }
    }

    /// Build, copy the output under the served root and reload the proxy.
    pub async fn deploy(
        &self,
        project_id: &str,
        project_dir: &Path,
        subdomain: &str,
    ) -> RunnerResult<ServerHandle> {
        let subdomain = sanitize_subdomain(subdomain, self.config.max_subdomain_length)?;
        let mut tracker = DeployTracker::new(project_id, self.observer.clone());

        let result = self
            .deploy_inner(&mut tracker, project_dir, &subdomain)
            .await;

        match &result {
            Ok(_) => {
                self.record_deployment(&subdomain, &DeployStatus::Deployed);
                tracker.advance(DeployState::Ready)?;
            }
            Err(e) => {
                self.record_deployment(&subdomain, &DeployStatus::Failed(e.to_string()));
                tracker.fail();
            }
        }
        result?;

        let handle = ServerHandle {
            project_id: project_id.to_string(),
            port: None,
            url: format!("http://{}.{}", subdomain, self.config.base_domain),
            kind: DeploymentKind::Proxy,
            ready_confirmed: true,
            pid: None,
        };
        info!("Deployed {} at {}", project_id, handle.url);
        self.servers.lock().insert(
            project_id.to_string(),
            TrackedServer {
                handle: handle.clone(),
                process: None,
            },
        );
        Ok(handle)
    }

    async fn deploy_inner(
        &self,
        tracker: &mut DeployTracker,
        project_dir: &Path,
        subdomain: &str,
    ) -> RunnerResult<()> {
        tracker.advance(DeployState::Installing)?;
        self.install(project_dir).await?;

        tracker.advance(DeployState::Building)?;
        self.build(project_dir).await?;

        let output = locate_output_dir(project_dir);
        let served = self.config.served_dir(subdomain);
        copy_output(&output, &served)?;
        info!("Copied {} to {}", output.display(), served.display());

        if let Some(site_dir) = &self.config.site_config_dir {
            write_server_block(site_dir, subdomain, &self.config.base_domain, &served)?;
        }

        if self.config.proxy_enabled {
            // copied files stay in place when the reload fails
            self.reload_proxy().await?;
        }
        Ok(())
    }

    /// Stop and forget a project. Returns whether it was tracked.
    pub async fn stop(&self, project_id: &str) -> bool {
        let tracked = self.servers.lock().remove(project_id);
        match tracked {
            Some(server) => {
                if let Some(process) = server.process {
                    terminate(project_id, process).await;
                }
                true
            }
            None => false,
        }
    }

    /// Kill every running dev server.
    pub async fn shutdown_all(&self) {
        let servers: Vec<(String, TrackedServer)> = self.servers.lock().drain().collect();
        if servers.is_empty() {
            return;
        }
        info!("Shutting down {} server(s)", servers.len());
        for (project_id, server) in servers {
            if let Some(process) = server.process {
                terminate(&project_id, process).await;
            }
        }
    }

    pub fn get(&self, project_id: &str) -> Option<ServerHandle> {
        self.servers.lock().get(project_id).map(|s| s.handle.clone())
    }

    pub fn list(&self) -> Vec<ServerHandle> {
        let mut handles: Vec<ServerHandle> =
            self.servers.lock().values().map(|s| s.handle.clone()).collect();
        handles.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        handles
    }

    /// Install dependencies. Only a failure to spawn the package manager is
    /// an error; a failing or slow install is logged and tolerated.
    async fn install(&self, project_dir: &Path) -> RunnerResult<()> {
        let cmd = CommandSpec::new(&self.config.package_manager)
            .arg("install")
            .workdir(project_dir);
        let timeout = Duration::from_secs(self.config.install_timeout_secs);

        match self.runner.run(&cmd, timeout).await {
            Ok(result) if result.success() => {
                info!("Installed dependencies in {}ms", result.duration_ms);
                Ok(())
            }
            Ok(result) => {
                warn!(
                    "Install exited with {} ({}), continuing",
                    result.exit_code,
                    result.last_line()
                );
                Ok(())
            }
            Err(RunnerError::Timeout(secs)) => {
                warn!("Install did not finish within {}s, continuing", secs);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run the build script. Failures fall back to serving sources.
    async fn build(&self, project_dir: &Path) -> RunnerResult<()> {
        let cmd = CommandSpec::new(&self.config.package_manager)
            .args(["run", "build"])
            .workdir(project_dir);
        let timeout = Duration::from_secs(self.config.build_timeout_secs);

        match self.runner.run(&cmd, timeout).await {
            Ok(result) if result.success() => {
                info!("Build finished in {}ms", result.duration_ms);
                Ok(())
            }
            Ok(result) => {
                warn!("Build exited with {} ({})", result.exit_code, result.last_line());
                Ok(())
            }
            Err(RunnerError::Timeout(secs)) => {
                warn!("Build did not finish within {}s", secs);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn reload_proxy(&self) -> RunnerResult<()> {
        let cmd = CommandSpec::from_argv(&self.config.reload_command)
            .ok_or_else(|| RunnerError::InvalidConfig("reload_command is empty".into()))?;
        let timeout = Duration::from_secs(self.config.reload_timeout_secs);

        match self.runner.run(&cmd, timeout).await {
            Ok(result) if result.success() => {
                info!("Reloaded proxy");
                Ok(())
            }
            Ok(result) => Err(RunnerError::DeploymentFailed(format!(
                "proxy reload exited with {}: {}",
                result.exit_code,
                result.last_line()
            ))),
            Err(e) => Err(RunnerError::DeploymentFailed(format!("proxy reload: {}", e))),
        }
    }

    /// Allocate a port, spawn the dev server and wait for readiness.
    ///
    /// A server that dies complaining its port is taken lost a race with
    /// another session; probing resumes after that port.
    async fn start_server(
        &self,
        project_id: &str,
        project_dir: &Path,
    ) -> RunnerResult<(ServerHandle, ProcessHandle)> {
        let base = self.config.effective_base_port();
        let mut start = base;

        for attempt in 1..=BIND_ATTEMPTS {
            let port = self.ports.allocate_from(base, start)?;
            let cmd = self
                .config
                .toolchain
                .dev_command(&self.config.package_manager, port)
                .workdir(project_dir);

            let mut process = self.runner.spawn(&cmd).await?;
            let readiness = self
                .wait_ready(&mut process, Duration::from_secs(self.config.ready_timeout_secs))
                .await;

            let ready_confirmed = match readiness {
                Readiness::Ready => true,
                Readiness::TimedOut => {
                    warn!(
                        "No readiness marker from {} within {}s; server should be running on port {}",
                        project_id, self.config.ready_timeout_secs, port
                    );
                    false
                }
                Readiness::Exited { code, tail } => {
                    if is_port_conflict(&tail) && attempt < BIND_ATTEMPTS {
                        warn!("Port {} was taken before the server bound it, retrying", port);
                        start = port.saturating_add(1);
                        continue;
                    }
                    return Err(RunnerError::StartFailed {
                        exit_code: code,
                        output: tail,
                    });
                }
            };

            let RunningProcess { mut lines, handle } = process;
            let label = project_id.to_string();
            tokio::spawn(async move {
                while let Some(line) = lines.recv().await {
                    debug!("[{}:{}] {}", label, line.stream, line.message);
                }
            });

            let server = ServerHandle {
                project_id: project_id.to_string(),
                port: Some(port),
                url: format!("http://localhost:{}", port),
                kind: DeploymentKind::Development,
                ready_confirmed,
                pid: handle.pid(),
            };
            info!("Started {} at {}", project_id, server.url);
            return Ok((server, handle));
        }

        Err(RunnerError::PortsExhausted {
            base,
            end: u32::from(base) + u32::from(self.config.port_range),
        })
    }

    async fn wait_ready(&self, process: &mut RunningProcess, timeout: Duration) -> Readiness {
        let deadline = Instant::now() + timeout;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);

        loop {
            tokio::select! {
                line = process.lines.recv() => match line {
                    Some(line) => {
                        debug!("[{}] {}", line.stream, line.message);
                        if self.detector.detect_ready(&line.message) {
                            return Readiness::Ready;
                        }
                        if tail.len() == TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.message);
                    }
                    None => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        return match process.handle.wait(remaining).await {
                            Some(code) => Readiness::Exited {
                                code: Some(code),
                                tail: Vec::from(tail).join("\n"),
                            },
                            None => Readiness::TimedOut,
                        };
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(code) = process.handle.exit_code() {
                        return Readiness::Exited {
                            code: Some(code),
                            tail: Vec::from(tail).join("\n"),
                        };
                    }
                    return Readiness::TimedOut;
                }
            }
        }
    }

    fn record_deployment(&self, subdomain: &str, status: &DeployStatus) {
        if let Err(e) = self.deploy_log.append(subdomain, status) {
            warn!("Failed to append to deployment log: {}", e);
        }
    }
}

async fn terminate(project_id: &str, mut process: ProcessHandle) {
    process.kill();
    match process.wait(Duration::from_secs(5)).await {
        Some(_) => debug!("Server for {} stopped", project_id),
        None => warn!("Server for {} did not exit after kill", project_id),
    }
}

fn is_port_conflict(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("already in use") || lower.contains("eaddrinuse")
}

/// First conventional output folder in `project_dir`, else the project root.
pub fn locate_output_dir(project_dir: &Path) -> PathBuf {
    for name in OUTPUT_DIRS {
        let candidate = project_dir.join(name);
        if candidate.is_dir() {
            debug!("Using build output {}", candidate.display());
            return candidate;
        }
    }
    warn!(
        "No build output in {}, serving the project root",
        project_dir.display()
    );
    project_dir.to_path_buf()
}

/// Replace `target` with the contents of `source`, minus excluded folders.
fn copy_output(source: &Path, target: &Path) -> RunnerResult<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::create_dir_all(target)?;

    let mut items = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if COPY_EXCLUDES.iter().any(|ex| name == *ex) {
            continue;
        }
        items.push(entry.path());
    }

    let mut options = fs_extra::dir::CopyOptions::new();
    options.overwrite = true;
    fs_extra::copy_items(&items, target, &options)
        .map_err(|e| RunnerError::DeploymentFailed(format!("copy to {}: {}", target.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_output_dir_order() {
        let temp = TempDir::new().unwrap();
        assert_eq!(locate_output_dir(temp.path()), temp.path());

        fs::create_dir(temp.path().join("out")).unwrap();
        fs::create_dir(temp.path().join("build")).unwrap();
        assert_eq!(locate_output_dir(temp.path()), temp.path().join("build"));

        fs::create_dir(temp.path().join("dist")).unwrap();
        assert_eq!(locate_output_dir(temp.path()), temp.path().join("dist"));
    }

    #[test]
    fn test_copy_output_skips_excluded() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("project");
        fs::create_dir_all(source.join("node_modules/react")).unwrap();
        fs::create_dir_all(source.join("src")).unwrap();
        fs::write(source.join("index.html"), "<html></html>").unwrap();
        fs::write(source.join("src/App.tsx"), "export default 1").unwrap();

        let target = temp.path().join("served");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "old").unwrap();

        copy_output(&source, &target).unwrap();
        assert!(target.join("index.html").exists());
        assert!(target.join("src/App.tsx").exists());
        assert!(!target.join("node_modules").exists());
        assert!(!target.join("stale.txt").exists());
    }

    #[test]
    fn test_deployment_kind_wire_names() {
        assert_eq!(serde_json::to_string(&DeploymentKind::Development).unwrap(), "\"development\"");
        assert_eq!(serde_json::to_string(&DeploymentKind::Proxy).unwrap(), "\"nginx\"");
        assert_eq!(DeploymentKind::Proxy.to_string(), "nginx");
    }

    #[test]
    fn test_port_conflict_detection() {
        assert!(is_port_conflict("Error: Port 5173 is already in use"));
        assert!(is_port_conflict("listen EADDRINUSE: address already in use :::3000"));
        assert!(!is_port_conflict("SyntaxError: Unexpected token"));
    }
}
