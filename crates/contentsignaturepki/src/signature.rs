use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::Error;
use crate::keys::PublicKey;
use crate::mode::Mode;

/// Shortest input `sign_data` accepts.
pub const MIN_INPUT_LEN: usize = 10;

/// A content signature: the ECDSA `(R, S)` pair plus what produced it.
///
/// `r` and `s` are big-endian and always exactly `mode.scalar_len()` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSignature {
    r: Vec<u8>,
    s: Vec<u8>,
    pub mode: Mode,
    pub x5u: String,
    pub id: String,
    /// Name of the hash the signed digest came from, when the signer hashed the data.
    pub hash_name: Option<&'static str>,
    pub finished: bool,
}

impl ContentSignature {
    /// Builds a signature from two big-endian unsigned integers, zero-padding
    /// each to half the mode's signature length.
    pub fn from_scalars(mode: Mode, r: &[u8], s: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            r: pad_scalar(mode, r)?,
            s: pad_scalar(mode, s)?,
            mode,
            x5u: String::new(),
            id: String::new(),
            hash_name: None,
            finished: false,
        })
    }

    /// Splits a fixed-width `R || S` encoding.
    pub fn from_fixed(mode: Mode, r_s: &[u8]) -> Result<Self, Error> {
        if r_s.len() != mode.signature_len() {
            return Err(Error::Decode(format!(
                "{mode} signature must be {} bytes, got {}",
                mode.signature_len(),
                r_s.len()
            )));
        }
        let (r, s) = r_s.split_at(mode.scalar_len());
        Self::from_scalars(mode, r, s)
    }

    pub fn r(&self) -> &[u8] {
        &self.r
    }

    pub fn s(&self) -> &[u8] {
        &self.s
    }

    /// Fixed-width `R || S`.
    pub fn to_fixed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.mode.signature_len());
        out.extend_from_slice(&self.r);
        out.extend_from_slice(&self.s);
        out
    }

    /// Wire form: base64url without padding of `R || S`.
    pub fn encode(&self) -> Result<String, Error> {
        if !self.finished {
            return Err(Error::Unfinished);
        }
        Ok(URL_SAFE_NO_PAD.encode(self.to_fixed()))
    }

    /// Parses the wire form. The mode follows from the decoded length.
    pub fn decode(wire: &str) -> Result<Self, Error> {
        let raw = URL_SAFE_NO_PAD
            .decode(wire.trim())
            .map_err(|e| Error::Decode(format!("invalid base64url signature: {e}")))?;
        let mode = Mode::from_signature_len(raw.len()).ok_or_else(|| {
            Error::Decode(format!(
                "unknown signature length {}, expected 64 or 96",
                raw.len()
            ))
        })?;
        let mut sig = Self::from_fixed(mode, &raw)?;
        sig.finished = true;
        Ok(sig)
    }

    /// Verifies the signature over the templated hash of `input`.
    ///
    /// Returns false on any mismatch, including a key on another curve.
    pub fn verify_data(&self, input: &[u8], key: &PublicKey) -> bool {
        if key.mode() != Some(self.mode) {
            return false;
        }
        let digest = self.mode.templated_hash(input);
        key.verify_prehash(&digest, &self.to_fixed())
    }
}

/// The wire form once finished, a placeholder otherwise.
impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(wire) => f.write_str(&wire),
            Err(_) => write!(f, "<unfinished {} signature>", self.mode),
        }
    }
}

fn pad_scalar(mode: Mode, value: &[u8]) -> Result<Vec<u8>, Error> {
    let width = mode.scalar_len();
    let start = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let significant = &value[start..];
    if significant.len() > width {
        return Err(Error::Decode(format!(
            "scalar of {} bytes does not fit a {mode} signature",
            significant.len()
        )));
    }
    let mut out = vec![0u8; width - significant.len()];
    out.extend_from_slice(significant);
    Ok(out)
}
