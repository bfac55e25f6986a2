use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use super::{ChainFetcher, ChainPublisher};

/// Keeps published chains in memory, keyed by location.
#[derive(Default)]
pub struct MemoryPublisher {
    chains: Mutex<HashMap<String, Vec<u8>>>,
    published: Mutex<Vec<String>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations published to so far, in order.
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl ChainFetcher for MemoryPublisher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let chains = self
            .chains
            .lock()
            .map_err(|_| anyhow!("chain store lock poisoned"))?;
        chains
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("no chain published at {location}"))
    }
}

impl ChainPublisher for MemoryPublisher {
    fn publish(&self, location: &str, chain: &[u8]) -> Result<()> {
        self.chains
            .lock()
            .map_err(|_| anyhow!("chain store lock poisoned"))?
            .insert(location.to_string(), chain.to_vec());
        self.published
            .lock()
            .map_err(|_| anyhow!("chain store lock poisoned"))?
            .push(location.to_string());
        Ok(())
    }
}
