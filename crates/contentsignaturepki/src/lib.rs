//! Content signatures issued by an end-entity key under a fixed issuer.
//!
//! A [`ContentSigner`] finds or makes its end-entity key at construction,
//! publishes the certificate chain and only becomes usable once that chain
//! can be fetched back. [`verify`] checks a signature against a published chain.

pub mod config;
pub mod error;
pub mod keys;
pub mod mode;
pub mod registry;
pub mod signature;
pub mod signer;
pub mod verify;
pub mod x5u;

pub use config::SignerConfig;
pub use error::Error;
pub use mode::{Mode, SIGNATURE_PREFIX, hash_algorithm, signature_len, templated_hash};
pub use signature::ContentSignature;
pub use signer::{Collaborators, ContentSigner};
pub use verify::{verify, verify_with_chain};
