use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

use crate::acquire::PositionSink;
use crate::gnss::FixResult;

/// Appends one JSON object per recorded fix.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &[u8]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.with_context(|| format!("create {}", dir.display()))?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open {}", self.path.display()))?;
        f.write_all(line).await?;
        f.flush().await?;
        Ok(())
    }
}

impl PositionSink for JsonlSink {
    async fn record_position(&self, fix: &FixResult) -> Result<()> {
        let mut line = serde_json::to_vec(fix)?;
        line.push(b'\n');
        self.append(&line).await
    }
}
