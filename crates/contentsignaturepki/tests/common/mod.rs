#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use contentsignaturepki::keys::{IssuerKeys, KeyProvider, PrivateKey, PublicKey};
use contentsignaturepki::registry::{
    EeLookup, EndEntityRecord, EndEntityRegistry, EndEntityTransaction, MemoryRegistry,
    NewEndEntity,
};
use contentsignaturepki::x5u::{ChainFetcher, ChainPublisher, MemoryPublisher};
use contentsignaturepki::{Collaborators, ContentSigner, Error, SignerConfig};
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_core::CryptoRngCore;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, SignatureAlgorithm};

pub const CHAINS: &str = "mem://chains/";

/// Issuer key (PKCS#8 PEM) and its self-signed CA certificate (PEM).
pub struct Issuer {
    pub key_pem: String,
    pub cert_pem: String,
}

pub fn issuer(alg: &'static SignatureAlgorithm) -> Issuer {
    let key = KeyPair::generate_for(alg).unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, "test content signature intermediate");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).unwrap();
    Issuer {
        key_pem: key.serialize_pem(),
        cert_pem: cert.pem(),
    }
}

pub fn p256_issuer() -> Issuer {
    issuer(&rcgen::PKCS_ECDSA_P256_SHA256)
}

pub fn p384_issuer() -> Issuer {
    issuer(&rcgen::PKCS_ECDSA_P384_SHA384)
}

pub fn config(id: &str, issuer: &Issuer) -> SignerConfig {
    SignerConfig {
        id: id.to_string(),
        kind: "contentsignaturepki".to_string(),
        private_key: issuer.key_pem.clone(),
        public_key: issuer.cert_pem.clone(),
        x5u: CHAINS.to_string(),
        chain_upload_location: CHAINS.to_string(),
        validity: 3600,
        clock_skew_tolerance: 10,
        ..Default::default()
    }
}

pub fn build(
    config: SignerConfig,
    keys: &dyn KeyProvider,
    registry: Option<&MemoryRegistry>,
    publisher: &MemoryPublisher,
) -> Result<ContentSigner, Error> {
    build_with(config, keys, registry.map(|r| r as &dyn EndEntityRegistry), publisher)
}

pub fn build_with(
    config: SignerConfig,
    keys: &dyn KeyProvider,
    registry: Option<&dyn EndEntityRegistry>,
    publisher: &dyn ChainPublisher,
) -> Result<ContentSigner, Error> {
    ContentSigner::new(
        config,
        Collaborators {
            keys,
            registry,
            publisher,
            logger: None,
        },
    )
}

/// Registry step a [`FailingRegistry`] errors at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Begin,
    Find,
    Insert,
    Commit,
}

/// In-memory registry that fails one step of the end-entity scope.
pub struct FailingRegistry {
    pub inner: MemoryRegistry,
    pub fail_at: FailAt,
}

impl FailingRegistry {
    pub fn new(fail_at: FailAt) -> Self {
        Self {
            inner: MemoryRegistry::new(),
            fail_at,
        }
    }

    pub fn records(&self, signer_id: &str) -> Vec<EndEntityRecord> {
        self.inner.records(signer_id)
    }
}

impl EndEntityRegistry for FailingRegistry {
    fn begin_end_entity_operations<'a>(
        &'a self,
        signer_id: &str,
    ) -> Result<Box<dyn EndEntityTransaction + 'a>> {
        if self.fail_at == FailAt::Begin {
            anyhow::bail!("database is unreachable");
        }
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin_end_entity_operations(signer_id)?,
            fail_at: self.fail_at,
        }))
    }
}

struct FailingTransaction<'a> {
    inner: Box<dyn EndEntityTransaction + 'a>,
    fail_at: FailAt,
}

impl EndEntityTransaction for FailingTransaction<'_> {
    fn find_suitable_ee(&mut self, signer_id: &str, validity: Duration) -> Result<EeLookup> {
        if self.fail_at == FailAt::Find {
            anyhow::bail!("select failed");
        }
        self.inner.find_suitable_ee(signer_id, validity)
    }

    fn insert_ee(&mut self, ee: NewEndEntity) -> Result<()> {
        if self.fail_at == FailAt::Insert {
            anyhow::bail!("insert failed");
        }
        self.inner.insert_ee(ee)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_at == FailAt::Commit {
            anyhow::bail!("commit failed");
        }
        self.inner.commit()
    }
}

/// Chain store that refuses every upload.
pub struct RefusingPublisher;

impl ChainFetcher for RefusingPublisher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        anyhow::bail!("nothing published at {location}")
    }
}

impl ChainPublisher for RefusingPublisher {
    fn publish(&self, location: &str, _chain: &[u8]) -> Result<()> {
        anyhow::bail!("upload to {location} denied")
    }
}

/// Key store whose issuer key is not usable for content signatures.
pub struct FixedIssuerKeys(pub PublicKey);

struct OpaqueKey(PublicKey);

impl PrivateKey for OpaqueKey {
    fn public_key(&self) -> PublicKey {
        self.0.clone()
    }

    fn sign_digest(&self, _rng: &mut dyn CryptoRngCore, _digest: &[u8]) -> Result<Vec<u8>> {
        anyhow::bail!("opaque key cannot sign")
    }

    fn handle(&self) -> String {
        "opaque".to_string()
    }
}

impl KeyProvider for FixedIssuerKeys {
    fn issuer_keys_and_rand(&self, _config: &SignerConfig) -> Result<IssuerKeys> {
        Ok(IssuerKeys {
            private: Arc::new(OpaqueKey(self.0.clone())),
            public: self.0.clone(),
            rand: Box::new(ChaCha20Rng::from_seed([1u8; 32])),
        })
    }

    fn make_key(&self, _issuer_public: &PublicKey, _label: &str) -> Result<Arc<dyn PrivateKey>> {
        anyhow::bail!("no keys can be made")
    }

    fn load_key(&self, _label: &str) -> Result<Arc<dyn PrivateKey>> {
        anyhow::bail!("no keys can be loaded")
    }
}
