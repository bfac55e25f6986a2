use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Type tag every content signature PKI signer configuration carries.
pub const TYPE: &str = "contentsignaturepki";

/// End-entity validity used when none is configured (30 days).
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Configuration of one content signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Only set on the configuration a constructed signer reports; derived
    /// from the issuer key, never read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Issuer private key reference: a PEM for software keys, a label for an HSM.
    pub private_key: String,
    /// Issuer certificate, PEM encoded.
    pub public_key: String,
    /// Base URL chains are fetched from. The chain name is appended.
    pub x5u: String,
    /// Base location chains are uploaded to. The chain name is appended.
    pub chain_upload_location: String,
    /// End-entity certificate validity in seconds. Zero means the default.
    #[serde(default)]
    pub validity: u64,
    /// Seconds certificates are backdated by and extended with.
    #[serde(default)]
    pub clock_skew_tolerance: u64,
    /// Root certificate (PEM) chains must terminate in, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
}

impl SignerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading signer configuration {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing signer configuration {}", path.display()))
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity)
    }

    pub fn clock_skew_tolerance(&self) -> Duration {
        Duration::from_secs(self.clock_skew_tolerance)
    }
}
