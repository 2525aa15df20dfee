//! Edge-proxy server blocks.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::RunnerResult;

/// Server block serving a static build at `<subdomain>.<domain>`.
pub fn render_server_block(subdomain: &str, base_domain: &str, served_dir: &Path) -> String {
    format!(
        "server {{\n    listen 80;\n    server_name {sub}.{domain};\n    root {root};\n    index index.html;\n\n    location / {{\n        try_files $uri $uri/ /index.html;\n    }}\n}}\n",
        sub = subdomain,
        domain = base_domain,
        root = served_dir.display(),
    )
}

/// Write `<subdomain>.conf` into `site_dir`, returning its path.
pub fn write_server_block(
    site_dir: &Path,
    subdomain: &str,
    base_domain: &str,
    served_dir: &Path,
) -> RunnerResult<PathBuf> {
    fs::create_dir_all(site_dir)?;
    let path = site_dir.join(format!("{}.conf", subdomain));
    fs::write(&path, render_server_block(subdomain, base_domain, served_dir))?;
    info!("Wrote proxy site config {}", path.display());
    Ok(path)
}
