use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{Dispatch, Span, dispatcher};

use crate::config::{DEFAULT_VALIDITY, SignerConfig, TYPE};
use crate::error::Error;
use crate::keys::{KeyProvider, PrivateKey, PublicKey, der_to_fixed};
use crate::mode::Mode;
use crate::registry::{EeLookup, EndEntityRegistry, EndEntityTransaction, NewEndEntity};
use crate::signature::{ContentSignature, MIN_INPUT_LEN};
use crate::x5u::{ChainPublisher, EndEntityCertificate, SharedRandom, chain_name, fetch_chain};

/// Digest lengths `sign_hash` accepts.
const HASH_LENGTHS: [usize; 3] = [32, 48, 64];

/// External collaborators a signer is constructed against.
pub struct Collaborators<'a> {
    pub keys: &'a dyn KeyProvider,
    /// Without a registry every construction makes a fresh end-entity.
    pub registry: Option<&'a dyn EndEntityRegistry>,
    pub publisher: &'a dyn ChainPublisher,
    /// Where the signer logs. `None` keeps the caller's current dispatcher.
    pub logger: Option<Dispatch>,
}

/// Issues content signatures with an end-entity key subordinate to the issuer.
pub struct ContentSigner {
    config: SignerConfig,
    mode: Mode,
    issuer_public: PublicKey,
    ee_key: Arc<dyn PrivateKey>,
    ee_label: String,
    x5u: String,
    /// PEM chain, when this signer made the end-entity.
    chain: Option<String>,
    validity: Duration,
    rng: SharedRandom,
    logger: Dispatch,
    span: Span,
}

impl std::fmt::Debug for ContentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSigner")
            .field("id", &self.config.id)
            .field("mode", &self.mode)
            .field("ee_label", &self.ee_label)
            .field("x5u", &self.x5u)
            .finish_non_exhaustive()
    }
}

impl ContentSigner {
    /// Binds the issuer key, finds or makes the end-entity and makes sure its
    /// chain is fetchable. The registry scope is committed last, so a failure
    /// at any step leaves no end-entity recorded.
    ///
    /// End-entity labels have one-second precision. Without a registry, or when
    /// a failed construction is retried, a second signer with the same id built
    /// within the same second on a shared key provider gets the label of a key
    /// that already exists. Key providers reject that label instead of replacing
    /// a key whose chain may already be published, so construction fails with
    /// [`Error::KeyStore`]. Wait for the next second before retrying.
    pub fn new(config: SignerConfig, with: Collaborators<'_>) -> Result<Self, Error> {
        let logger = with
            .logger
            .clone()
            .unwrap_or_else(|| dispatcher::get_default(|current| current.clone()));
        dispatcher::with_default(&logger, || {
            let span = tracing::info_span!("content_signer", id = %config.id);
            let _entered = span.enter();
            Self::init(config, &with, logger.clone(), span.clone())
        })
    }

    fn init(
        config: SignerConfig,
        with: &Collaborators<'_>,
        logger: Dispatch,
        span: Span,
    ) -> Result<Self, Error> {
        if config.kind != TYPE {
            return Err(Error::Config(format!(
                "invalid type {:?}, must be {TYPE:?}",
                config.kind
            )));
        }
        if config.id.is_empty() {
            return Err(Error::Config("missing signer ID in signer configuration".into()));
        }
        if config.private_key.is_empty() {
            return Err(Error::Config("missing private key in signer configuration".into()));
        }

        let issuer = with.keys.issuer_keys_and_rand(&config).map_err(Error::key_store(format!(
            "failed to get keys and rand for signer {:?}",
            config.id
        )))?;
        let validity = if config.validity == 0 {
            tracing::info!("no validity configured, defaulting to 30 days");
            DEFAULT_VALIDITY
        } else {
            config.validity()
        };
        if !issuer.public.is_ec() {
            return Err(Error::UnsupportedKey(
                "invalid public key type for issuer, must be ecdsa".into(),
            ));
        }
        let mode = issuer.public.mode().ok_or_else(|| {
            Error::UnsupportedKey(format!(
                "issuer key curve is not supported: {:?}",
                issuer.public
            ))
        })?;
        tracing::debug!(%mode, "bound issuer key");

        let rng: SharedRandom = Arc::new(Mutex::new(issuer.rand));
        let mut tx: Option<Box<dyn EndEntityTransaction + '_>> = match with.registry {
            Some(registry) => Some(
                registry
                    .begin_end_entity_operations(&config.id)
                    .map_err(Error::registry("failed to begin end-entity db operations"))?,
            ),
            None => None,
        };

        let lookup = match tx.as_mut() {
            Some(tx) => tx
                .find_suitable_ee(&config.id, validity)
                .map_err(Error::registry("failed to find suitable end-entity"))?,
            None => EeLookup::NotFound,
        };

        let (ee_key, ee_label, x5u, chain) = match lookup {
            EeLookup::Found(record) => {
                tracing::info!(
                    label = %record.label,
                    x5u = %record.x5u,
                    "using existing end-entity"
                );
                let key = with.keys.load_key(&record.label).map_err(Error::key_store(format!(
                    "failed to load end-entity key {:?}",
                    record.label
                )))?;
                (key, record.label, record.x5u, None)
            }
            EeLookup::NotFound => {
                tracing::info!("making new end-entity");
                let label = make_ee_label(&config.id)
                    .map_err(Error::key_store("failed to label end-entity key"))?;
                let key = with
                    .keys
                    .make_key(&issuer.public, &label)
                    .map_err(Error::key_store("failed to generate key for end entity"))?;
                let chain = EndEntityCertificate {
                    signer_id: &config.id,
                    end_entity: key.clone(),
                    issuer: issuer.private.clone(),
                    issuer_cert_pem: &config.public_key,
                    validity,
                    clock_skew_tolerance: config.clock_skew_tolerance(),
                    rng: rng.clone(),
                }
                .make_chain()
                .map_err(Error::chain("failed to make chain for end-entity"))?;

                let name = chain_name(&label);
                let upload = format!("{}{name}", config.chain_upload_location);
                with.publisher
                    .publish(&upload, chain.as_bytes())
                    .map_err(Error::chain(format!("failed to upload chain to {upload}")))?;
                let x5u = format!("{}{name}", config.x5u);
                tracing::info!(%label, %x5u, "uploaded end-entity chain");

                if let Some(tx) = tx.as_mut() {
                    tx.insert_ee(NewEndEntity {
                        x5u: x5u.clone(),
                        label: label.clone(),
                        signer_id: config.id.clone(),
                        key_handle: key.handle(),
                    })
                    .map_err(Error::registry("failed to insert new EE into database"))?;
                }
                (key, label, x5u, Some(chain))
            }
        };

        if ee_key.public_key().mode() != Some(mode) {
            return Err(Error::UnsupportedKey(format!(
                "end-entity {ee_label:?} is not on the {} curve of the issuer",
                mode.curve_name()
            )));
        }

        fetch_chain(with.publisher, &x5u, config.ca_cert.as_deref())
            .map_err(Error::chain("failed to verify x5u"))?;

        if let Some(tx) = tx.take() {
            tx.commit()
                .map_err(Error::registry("failed to commit end-entity operations in database"))?;
        }
        tracing::info!(label = %ee_label, %x5u, "signer ready");

        Ok(Self {
            config,
            mode,
            issuer_public: issuer.public,
            ee_key,
            ee_label,
            x5u,
            chain,
            validity,
            rng,
            logger,
            span,
        })
    }

    /// Configuration of the signer, with the derived mode and effective validity.
    pub fn config(&self) -> SignerConfig {
        SignerConfig {
            mode: Some(self.mode),
            validity: self.validity.as_secs(),
            ..self.config.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn x5u(&self) -> &str {
        &self.x5u
    }

    pub fn ee_label(&self) -> &str {
        &self.ee_label
    }

    pub fn issuer_public_key(&self) -> &PublicKey {
        &self.issuer_public
    }

    pub fn ee_public_key(&self) -> PublicKey {
        self.ee_key.public_key()
    }

    /// PEM chain this signer issued, `None` when it adopted an existing end-entity.
    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    /// Templates, hashes and signs `input`.
    pub fn sign_data(&self, input: &[u8]) -> Result<ContentSignature, Error> {
        if input.len() < MIN_INPUT_LEN {
            return Err(Error::InputTooShort(input.len()));
        }
        let digest = self.mode.templated_hash(input);
        let mut sig = self.sign_hash(&digest)?;
        sig.hash_name = Some(self.mode.hash_algorithm());
        Ok(sig)
    }

    /// Signs an already computed digest with the end-entity key.
    pub fn sign_hash(&self, digest: &[u8]) -> Result<ContentSignature, Error> {
        if !HASH_LENGTHS.contains(&digest.len()) {
            return Err(Error::InvalidHashLength(digest.len()));
        }
        self.in_scope(|| -> Result<ContentSignature, Error> {
            let der = {
                let mut rng = self
                    .rng
                    .lock()
                    .map_err(|_| anyhow!("random source lock poisoned"))
                    .map_err(Error::crypto("failed to sign hash"))?;
                self.ee_key
                    .sign_digest(&mut **rng, digest)
                    .map_err(Error::crypto("failed to sign hash"))?
            };
            let fixed = der_to_fixed(self.mode, &der)
                .map_err(Error::crypto("failed to parse signature"))?;
            let mut sig = ContentSignature::from_fixed(self.mode, &fixed)?;
            sig.x5u = self.x5u.clone();
            sig.id = self.config.id.clone();
            sig.finished = true;
            tracing::trace!(len = digest.len(), "signed hash");
            Ok(sig)
        })
    }

    fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.logger, || self.span.in_scope(f))
    }
}

/// `<signer id>-<UTC time to the second>`.
fn make_ee_label(signer_id: &str) -> anyhow::Result<String> {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day][hour][minute][second]"))?;
    Ok(format!("{signer_id}-{stamp}"))
}
