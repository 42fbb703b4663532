use anyhow::{Context, Result};
use std::path::Path;

pub fn check_receiver(rate_hz: u32) -> Result<()> {
    anyhow::ensure!((1..=25).contains(&rate_hz), "receiver.rate_hz should be 1..25");
    Ok(())
}

pub fn check_cycle(cycle_ms: u64) -> Result<()> {
    anyhow::ensure!((10..=5000).contains(&cycle_ms), "acquire.cycle_ms should be 10..5000");
    Ok(())
}

/// The storage directory must exist or be creatable.
pub fn check_storage(path: &str) -> Result<()> {
    anyhow::ensure!(!path.trim().is_empty(), "storage.path missing");
    let p = Path::new(path);
    anyhow::ensure!(!p.is_dir(), "storage.path {} is a directory", path);
    if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir).with_context(|| format!("storage dir {} not creatable", dir.display()))?;
        }
    }
    Ok(())
}
