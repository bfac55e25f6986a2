use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};

/// String prepended to data prior to hashing.
pub const SIGNATURE_PREFIX: &[u8] = b"Content-Signature:\x00";

/// Content signature algorithm, bound to the curve of the issuer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// ECDSA on P-256 with SHA-256.
    #[serde(rename = "p256ecdsa")]
    P256Ecdsa,
    /// ECDSA on P-384 with SHA-384.
    #[serde(rename = "p384ecdsa")]
    P384Ecdsa,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::P256Ecdsa => "p256ecdsa",
            Mode::P384Ecdsa => "p384ecdsa",
        }
    }

    /// Name of the hash function templated data is digested with.
    pub fn hash_algorithm(&self) -> &'static str {
        match self {
            Mode::P256Ecdsa => "sha256",
            Mode::P384Ecdsa => "sha384",
        }
    }

    /// Length in bytes of an encoded signature (R and S each take half).
    pub fn signature_len(&self) -> usize {
        match self {
            Mode::P256Ecdsa => 64,
            Mode::P384Ecdsa => 96,
        }
    }

    /// Width of a single R or S scalar.
    pub fn scalar_len(&self) -> usize {
        self.signature_len() / 2
    }

    /// Standard curve name, as an X.509 or PKCS#11 backend reports it.
    pub fn curve_name(&self) -> &'static str {
        match self {
            Mode::P256Ecdsa => "P-256",
            Mode::P384Ecdsa => "P-384",
        }
    }

    /// Mode inferred from the length of a decoded signature.
    pub fn from_signature_len(len: usize) -> Option<Self> {
        match len {
            64 => Some(Mode::P256Ecdsa),
            96 => Some(Mode::P384Ecdsa),
            _ => None,
        }
    }

    pub fn templated_hash(&self, input: &[u8]) -> Vec<u8> {
        match self {
            Mode::P256Ecdsa => digest_templated::<Sha256>(input),
            Mode::P384Ecdsa => digest_templated::<Sha384>(input),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown content signature mode {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p256ecdsa" => Ok(Mode::P256Ecdsa),
            "p384ecdsa" => Ok(Mode::P384Ecdsa),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Signature length for a mode tag, `None` when the tag is unknown.
pub fn signature_len(mode: &str) -> Option<usize> {
    mode.parse::<Mode>().ok().map(|m| m.signature_len())
}

/// Hash name for a mode tag, `None` when the tag is unknown.
pub fn hash_algorithm(mode: &str) -> Option<&'static str> {
    mode.parse::<Mode>().ok().map(|m| m.hash_algorithm())
}

/// Hashes `SIGNATURE_PREFIX || input` and returns the hash name with the digest.
///
/// `p384ecdsa` selects SHA-384. Every other tag, known or not, falls back to SHA-256.
pub fn templated_hash(input: &[u8], mode: &str) -> (&'static str, Vec<u8>) {
    let mode = match mode.parse() {
        Ok(Mode::P384Ecdsa) => Mode::P384Ecdsa,
        _ => Mode::P256Ecdsa,
    };
    (mode.hash_algorithm(), mode.templated_hash(input))
}

fn digest_templated<D: Digest>(input: &[u8]) -> Vec<u8> {
    let mut md = D::new();
    md.update(SIGNATURE_PREFIX);
    md.update(input);
    md.finalize().to_vec()
}
