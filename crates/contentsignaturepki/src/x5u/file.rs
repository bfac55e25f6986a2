use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use super::{ChainFetcher, ChainPublisher};

/// Publishes chains to `file://` locations on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilePublisher;

fn path_of(location: &str) -> Result<PathBuf> {
    location
        .strip_prefix("file://")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("unsupported chain location {location:?}, expected a file:// URL"))
}

impl ChainFetcher for FilePublisher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = path_of(location)?;
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }
}

impl ChainPublisher for FilePublisher {
    fn publish(&self, location: &str, chain: &[u8]) -> Result<()> {
        let path = path_of(location)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        std::fs::write(&path, chain).with_context(|| format!("writing {}", path.display()))
    }
}
