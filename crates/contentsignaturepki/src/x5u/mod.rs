mod chain;
mod file;
mod memory;

use anyhow::{Context, Result, bail};

pub use chain::{CS_NAMESPACE, CertificateChain, EndEntityCertificate, SharedRandom};
pub use file::FilePublisher;
pub use memory::MemoryPublisher;

/// Retrieves published certificate chains.
pub trait ChainFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Object store certificate chains are uploaded to.
pub trait ChainPublisher: ChainFetcher {
    fn publish(&self, location: &str, chain: &[u8]) -> Result<()>;
}

/// File name a chain is published under, relative to the upload and x5u bases.
pub fn chain_name(label: &str) -> String {
    format!("{label}.chain")
}

/// Fetches the chain at `x5u`, parses it and checks it is usable.
///
/// `root_pem`, when set, is the certificate the chain must terminate in.
pub fn fetch_chain<F>(fetcher: &F, x5u: &str, root_pem: Option<&str>) -> Result<CertificateChain>
where
    F: ChainFetcher + ?Sized,
{
    let raw = fetcher
        .fetch(x5u)
        .with_context(|| format!("fetching certificate chain from {x5u}"))?;
    let chain = CertificateChain::from_pem(&raw)
        .with_context(|| format!("parsing certificate chain from {x5u}"))?;
    if chain.is_empty() {
        bail!("no certificate found in x5u {x5u}");
    }
    chain
        .validate(root_pem)
        .with_context(|| format!("validating certificate chain from {x5u}"))?;
    Ok(chain)
}
