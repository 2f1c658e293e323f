use std::{fs, path::Path};

use anyhow::{anyhow, bail};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder. The run is a short-lived batch, so the
/// rendering is written to a file at the end instead of being scraped.
pub fn init() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install Prometheus metrics recorder: {e}"))?;

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub fn write(path: &Path) -> anyhow::Result<()> {
    let Some(handle) = PROM_HANDLE.get() else {
        bail!("Prometheus recorder not initialized");
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, handle.render())?;
    tracing::info!(path = %path.display(), "metrics written");
    Ok(())
}
