/// Errors surfaced by signer construction, signing and verification.
///
/// Variants carrying a `context` wrap the collaborator failure as their source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("contentsignaturepki: invalid configuration: {0}")]
    Config(String),
    #[error("contentsignaturepki: unsupported issuer key: {0}")]
    UnsupportedKey(String),
    #[error("contentsignaturepki: {context}")]
    KeyStore {
        context: String,
        source: anyhow::Error,
    },
    #[error("contentsignaturepki: {context}")]
    Registry {
        context: String,
        source: anyhow::Error,
    },
    #[error("contentsignaturepki: {context}")]
    Chain {
        context: String,
        source: anyhow::Error,
    },
    #[error("contentsignaturepki: refusing to sign input data shorter than 10 bytes, got {0}")]
    InputTooShort(usize),
    #[error("contentsignaturepki: refusing to sign input hash. length {0}, expected 32, 48 or 64")]
    InvalidHashLength(usize),
    #[error("contentsignaturepki: {context}")]
    Crypto {
        context: String,
        source: anyhow::Error,
    },
    #[error("contentsignature: {0}")]
    Decode(String),
    #[error("contentsignature: cannot encode unfinished signature")]
    Unfinished,
    #[error("ecdsa signature verification failed")]
    VerificationFailed,
}

impl Error {
    pub(crate) fn key_store(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> Self {
        let context = context.into();
        move |source| Error::KeyStore { context, source }
    }

    pub(crate) fn registry(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> Self {
        let context = context.into();
        move |source| Error::Registry { context, source }
    }

    pub(crate) fn chain(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> Self {
        let context = context.into();
        move |source| Error::Chain { context, source }
    }

    pub(crate) fn crypto(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> Self {
        let context = context.into();
        move |source| Error::Crypto { context, source }
    }
}
