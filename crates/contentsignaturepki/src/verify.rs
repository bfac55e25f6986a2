use crate::error::Error;
use crate::keys::PublicKey;
use crate::signature::ContentSignature;
use crate::x5u::{CertificateChain, ChainFetcher, fetch_chain};

/// Verifies a wire-form `signature` over `input` with the end-entity of the
/// chain published at `x5u`.
pub fn verify<F>(fetcher: &F, x5u: &str, signature: &str, input: &[u8]) -> Result<(), Error>
where
    F: ChainFetcher + ?Sized,
{
    let chain = fetch_chain(fetcher, x5u, None).map_err(Error::chain("failed to retrieve x5u"))?;
    verify_with_chain(&chain, signature, input)
}

/// Same as [`verify`] on a chain the caller already retrieved.
pub fn verify_with_chain(
    chain: &CertificateChain,
    signature: &str,
    input: &[u8],
) -> Result<(), Error> {
    let key = chain
        .end_entity_public_key()
        .map_err(Error::chain("failed to read end-entity public key"))?;
    if let PublicKey::NotEc(algorithm) = &key {
        return Err(Error::UnsupportedKey(format!(
            "end-entity key is not ecdsa (algorithm {algorithm})"
        )));
    }
    let sig = ContentSignature::decode(signature)?;
    if !sig.verify_data(input, &key) {
        return Err(Error::VerificationFailed);
    }
    Ok(())
}
