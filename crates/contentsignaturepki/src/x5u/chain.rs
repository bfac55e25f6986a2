use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, RemoteKeyPair, SerialNumber,
};
use sha2::{Digest, Sha256, Sha384};
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;

use crate::keys::{EC_PUBLIC_KEY_OID, PrivateKey, PublicKey, RandomSource};
use crate::mode::Mode;

/// Domain suffix content signature end-entities are issued under.
pub const CS_NAMESPACE: &str = ".content-signature.mozilla.org";

const ECDSA_WITH_SHA256_OID: &str = "1.2.840.10045.4.3.2";
const ECDSA_WITH_SHA384_OID: &str = "1.2.840.10045.4.3.3";

/// Random source shared between a signer and the certificates it issues.
pub type SharedRandom = Arc<Mutex<RandomSource>>;

/// A parsed chain of DER certificates, end-entity first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<Vec<u8>>,
}

impl CertificateChain {
    /// Parses concatenated PEM `CERTIFICATE` blocks.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let mut certs = Vec::new();
        for (i, pem) in Pem::iter_from_buffer(data).enumerate() {
            let pem = pem.with_context(|| format!("decoding PEM block {i}"))?;
            if pem.label != "CERTIFICATE" {
                bail!("PEM block {i} is a {:?}, not a certificate", pem.label);
            }
            parse(&pem.contents).with_context(|| format!("parsing certificate {i}"))?;
            certs.push(pem.contents);
        }
        Ok(Self { certs })
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// DER certificates, end-entity first.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certs
    }

    pub fn end_entity_public_key(&self) -> Result<PublicKey> {
        let Some(der) = self.certs.first() else {
            bail!("no certificate found in chain");
        };
        public_key_of(&parse(der)?)
    }

    /// Every certificate must be within its validity period and signed by
    /// the next one. With a root, the last certificate must be the root or
    /// be signed by it.
    pub fn validate(&self, root_pem: Option<&str>) -> Result<()> {
        let parsed = self
            .certs
            .iter()
            .map(|der| parse(der))
            .collect::<Result<Vec<_>>>()?;
        let Some(last) = parsed.last() else {
            bail!("no certificate found in chain");
        };
        for (i, cert) in parsed.iter().enumerate() {
            if !cert.validity().is_valid() {
                bail!(
                    "certificate {i} ({}) is outside its validity period {} - {}",
                    cert.subject(),
                    cert.validity().not_before,
                    cert.validity().not_after
                );
            }
            if let Some(issuer) = parsed.get(i + 1) {
                check_signed_by(cert, issuer).with_context(|| {
                    format!("certificate {i} is not signed by certificate {}", i + 1)
                })?;
            }
        }
        if let Some(root_pem) = root_pem {
            let roots = CertificateChain::from_pem(root_pem.as_bytes())
                .context("parsing root certificate")?;
            let Some(root_der) = roots.certs.first() else {
                bail!("root certificate PEM holds no certificate");
            };
            if self.certs.last() != Some(root_der) {
                check_signed_by(last, &parse(root_der)?)
                    .context("chain does not terminate in the root")?;
            }
        }
        Ok(())
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| anyhow!("{e}"))?;
    Ok(cert)
}

fn public_key_of(cert: &X509Certificate<'_>) -> Result<PublicKey> {
    let spki = cert.public_key();
    let algorithm = spki.algorithm.algorithm.to_id_string();
    if algorithm != EC_PUBLIC_KEY_OID {
        return Ok(PublicKey::NotEc(algorithm));
    }
    PublicKey::from_ec_spki_der(spki.raw)
}

fn check_signed_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> Result<()> {
    let key = public_key_of(issuer)?;
    let tbs: &[u8] = cert.tbs_certificate.as_ref();
    let digest = match cert.signature_algorithm.algorithm.to_id_string().as_str() {
        ECDSA_WITH_SHA256_OID => Sha256::digest(tbs).to_vec(),
        ECDSA_WITH_SHA384_OID => Sha384::digest(tbs).to_vec(),
        other => bail!("unsupported certificate signature algorithm {other}"),
    };
    if !key.verify_der(&digest, &cert.signature_value.data) {
        bail!(
            "signature of {} does not verify with the key of {}",
            cert.subject(),
            issuer.subject()
        );
    }
    Ok(())
}

/// Plain digest the issuer signs certificates with, for the issuer's mode.
fn certificate_digest(mode: Mode, msg: &[u8]) -> Vec<u8> {
    match mode {
        Mode::P256Ecdsa => Sha256::digest(msg).to_vec(),
        Mode::P384Ecdsa => Sha384::digest(msg).to_vec(),
    }
}

/// Exposes a key-store key to rcgen, which hands over the TBS bytes to sign.
struct KeyStoreKeyPair {
    key: Arc<dyn PrivateKey>,
    public: Vec<u8>,
    mode: Mode,
    rng: SharedRandom,
}

impl KeyStoreKeyPair {
    fn boxed(key: Arc<dyn PrivateKey>, rng: SharedRandom) -> Result<KeyPair> {
        let public = key.public_key();
        let Some(mode) = public.mode() else {
            bail!("key-store key {public:?} has no supported curve");
        };
        let remote = KeyStoreKeyPair {
            public: public.to_sec1_bytes(),
            key,
            mode,
            rng,
        };
        KeyPair::from_remote(Box::new(remote)).context("wrapping key-store key")
    }
}

impl RemoteKeyPair for KeyStoreKeyPair {
    fn public_key(&self) -> &[u8] {
        &self.public
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        let digest = certificate_digest(self.mode, msg);
        let mut rng = self.rng.lock().map_err(|_| rcgen::Error::RemoteKeyError)?;
        self.key.sign_digest(&mut **rng, &digest).map_err(|e| {
            tracing::error!("key-store failed to sign certificate: {e:#}");
            rcgen::Error::RemoteKeyError
        })
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        match self.mode {
            Mode::P256Ecdsa => &rcgen::PKCS_ECDSA_P256_SHA256,
            Mode::P384Ecdsa => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }
}

/// Everything needed to issue an end-entity certificate under the issuer.
pub struct EndEntityCertificate<'a> {
    pub signer_id: &'a str,
    pub end_entity: Arc<dyn PrivateKey>,
    pub issuer: Arc<dyn PrivateKey>,
    /// PEM of the issuer certificate, appended to the chain verbatim.
    pub issuer_cert_pem: &'a str,
    pub validity: Duration,
    pub clock_skew_tolerance: Duration,
    pub rng: SharedRandom,
}

impl EndEntityCertificate<'_> {
    /// Issues the end-entity certificate and returns the PEM chain
    /// (end-entity then issuer).
    pub fn make_chain(&self) -> Result<String> {
        let issuer_key = KeyStoreKeyPair::boxed(self.issuer.clone(), self.rng.clone())?;
        let issuer = CertificateParams::from_ca_cert_pem(self.issuer_cert_pem)
            .context("parsing issuer certificate")?
            .self_signed(&issuer_key)
            .context("loading issuer certificate")?;

        let name = format!("{}{CS_NAMESPACE}", self.signer_id);
        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::new(vec![name.clone()])
            .with_context(|| format!("invalid end-entity name {name:?}"))?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.serial_number = Some(SerialNumber::from_slice(
            &(now.unix_timestamp_nanos() as u64).to_be_bytes(),
        ));
        params.not_before = now - self.clock_skew_tolerance;
        params.not_after = now + self.validity + self.clock_skew_tolerance;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
        params.use_authority_key_identifier_extension = true;

        let end_entity = KeyStoreKeyPair::boxed(self.end_entity.clone(), self.rng.clone())?;
        let cert = params
            .signed_by(&end_entity, &issuer, &issuer_key)
            .context("signing end-entity certificate")?;

        let mut chain = cert.pem();
        if !chain.ends_with('\n') {
            chain.push('\n');
        }
        chain.push_str(self.issuer_cert_pem.trim_start());
        Ok(chain)
    }
}
