use anyhow::Result;
use std::time::Duration;

use crate::serial::LinkConfig;

pub fn check_device(name: &str, dev: &str, baud: u32) -> Result<()> {
    anyhow::ensure!(!dev.trim().is_empty(), "{}.device missing", name);
    anyhow::ensure!(baud > 0, "{}.baud invalid", name);
    if !std::path::Path::new(dev).exists() {
        // not fatal: the link waits for the device to appear
        tracing::warn!("doctor: {} device {} not present right now", name, dev);
    }
    Ok(())
}

pub fn check_timing(cfg: &LinkConfig) -> Result<()> {
    let ms = Duration::from_millis;
    anyhow::ensure!(cfg.retry_interval >= ms(100), "link.retry_interval_ms should be >= 100");
    anyhow::ensure!(cfg.read_timeout >= ms(10) && cfg.read_timeout <= ms(5000), "link.read_timeout_ms should be 10..5000");
    anyhow::ensure!(cfg.idle_backoff >= ms(10), "link.idle_ms should be >= 10");
    anyhow::ensure!(cfg.write_timeout >= ms(10), "link.write_timeout_ms should be >= 10");
    Ok(())
}
