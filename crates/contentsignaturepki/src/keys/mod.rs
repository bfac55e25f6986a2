mod software;

use std::sync::Arc;

use anyhow::{Result, bail};
use p256::pkcs8::DecodePublicKey;
use rand_core::CryptoRngCore;

use crate::config::SignerConfig;
use crate::mode::Mode;

pub use software::{SoftwareKey, SoftwareKeyProvider};

/// OID of `id-ecPublicKey` in a SubjectPublicKeyInfo.
pub const EC_PUBLIC_KEY_OID: &str = "1.2.840.10045.2.1";

/// Public half of a key held by a key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    /// Elliptic-curve key on a curve no mode exists for.
    UnsupportedCurve(String),
    /// Not an elliptic-curve key (RSA, Ed25519, ...).
    NotEc(String),
}

impl PublicKey {
    /// Content signature mode matching the key's curve.
    pub fn mode(&self) -> Option<Mode> {
        match self {
            PublicKey::P256(_) => Some(Mode::P256Ecdsa),
            PublicKey::P384(_) => Some(Mode::P384Ecdsa),
            PublicKey::UnsupportedCurve(_) | PublicKey::NotEc(_) => None,
        }
    }

    pub fn is_ec(&self) -> bool {
        !matches!(self, PublicKey::NotEc(_))
    }

    /// Uncompressed SEC1 point, empty for keys without a mode.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::P384(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::UnsupportedCurve(_) | PublicKey::NotEc(_) => Vec::new(),
        }
    }

    /// Parses a DER SubjectPublicKeyInfo whose algorithm is `id-ecPublicKey`.
    pub fn from_ec_spki_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(PublicKey::P256(key));
        }
        if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(PublicKey::P384(key));
        }
        Ok(PublicKey::UnsupportedCurve("unrecognized named curve".to_string()))
    }

    /// Verifies a fixed-width `R || S` signature over a prehashed digest.
    pub fn verify_prehash(&self, digest: &[u8], r_s: &[u8]) -> bool {
        use p256::ecdsa::signature::hazmat::PrehashVerifier;

        match self {
            PublicKey::P256(key) => p256::ecdsa::Signature::from_slice(r_s)
                .is_ok_and(|sig| key.verify_prehash(digest, &sig).is_ok()),
            PublicKey::P384(key) => p384::ecdsa::Signature::from_slice(r_s)
                .is_ok_and(|sig| key.verify_prehash(digest, &sig).is_ok()),
            PublicKey::UnsupportedCurve(_) | PublicKey::NotEc(_) => false,
        }
    }

    /// Verifies a DER-encoded ECDSA signature over a prehashed digest.
    pub fn verify_der(&self, digest: &[u8], der: &[u8]) -> bool {
        use p256::ecdsa::signature::hazmat::PrehashVerifier;

        match self {
            PublicKey::P256(key) => p256::ecdsa::Signature::from_der(der)
                .is_ok_and(|sig| key.verify_prehash(digest, &sig).is_ok()),
            PublicKey::P384(key) => p384::ecdsa::Signature::from_der(der)
                .is_ok_and(|sig| key.verify_prehash(digest, &sig).is_ok()),
            PublicKey::UnsupportedCurve(_) | PublicKey::NotEc(_) => false,
        }
    }
}

/// Signing capability of a private key living in a key store.
///
/// Implementations are sync. HSM backends block on a round trip; callers
/// own timeouts.
pub trait PrivateKey: Send + Sync {
    /// Public half, which also carries the curve parameters.
    fn public_key(&self) -> PublicKey;

    /// Signs a prehashed digest. Returns a DER-encoded ECDSA signature.
    fn sign_digest(&self, rng: &mut dyn CryptoRngCore, digest: &[u8]) -> Result<Vec<u8>>;

    /// Opaque key-store handle, recorded next to the end-entity in the registry.
    fn handle(&self) -> String;
}

/// Random source handed out by a key provider.
pub type RandomSource = Box<dyn CryptoRngCore + Send>;

/// Issuer key material resolved from a signer configuration.
pub struct IssuerKeys {
    pub private: Arc<dyn PrivateKey>,
    pub public: PublicKey,
    pub rand: RandomSource,
}

/// Key store backend: software keys, an HSM, ...
pub trait KeyProvider: Send + Sync {
    /// Resolves the issuer key referenced by `config.private_key` and the
    /// random source that signing must draw from.
    fn issuer_keys_and_rand(&self, config: &SignerConfig) -> Result<IssuerKeys>;

    /// Generates a new end-entity key on the issuer's curve, stored under `label`.
    fn make_key(&self, issuer_public: &PublicKey, label: &str) -> Result<Arc<dyn PrivateKey>>;

    /// Loads a previously generated end-entity key by its label.
    fn load_key(&self, label: &str) -> Result<Arc<dyn PrivateKey>>;
}

/// Decodes a DER signature produced for `mode` into fixed-width `R || S`.
pub fn der_to_fixed(mode: Mode, der: &[u8]) -> Result<Vec<u8>> {
    let fixed = match mode {
        Mode::P256Ecdsa => p256::ecdsa::Signature::from_der(der)
            .map(|sig| sig.to_bytes().to_vec()),
        Mode::P384Ecdsa => p384::ecdsa::Signature::from_der(der)
            .map(|sig| sig.to_bytes().to_vec()),
    };
    match fixed {
        Ok(bytes) => Ok(bytes),
        Err(e) => bail!("malformed {mode} DER signature: {e}"),
    }
}
