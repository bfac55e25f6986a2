mod common;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use contentsignaturepki::keys::SoftwareKeyProvider;
use contentsignaturepki::x5u::{CertificateChain, ChainFetcher, FilePublisher, MemoryPublisher};
use contentsignaturepki::{Collaborators, ContentSigner, Error, verify, verify_with_chain};

use common::{build, config, p256_issuer, p384_issuer};

fn payloads() -> Vec<Vec<u8>> {
    vec![
        b"0123456789".to_vec(),
        b"{\"data\":[],\"last_modified\":\"1603992731957\"}".to_vec(),
        vec![0u8; 4096],
        (0..=255u8).cycle().take(10_000).collect(),
    ]
}

#[test]
fn sign_then_verify_for_both_modes() {
    for issuer in [p256_issuer(), p384_issuer()] {
        let keys = SoftwareKeyProvider::new();
        let publisher = MemoryPublisher::new();
        let signer = build(config("normandy", &issuer), &keys, None, &publisher).unwrap();
        for payload in payloads() {
            let wire = signer.sign_data(&payload).unwrap().encode().unwrap();
            verify(&publisher, signer.x5u(), &wire, &payload).unwrap();
        }
    }
}

#[test]
fn flipped_payload_bits_fail_verification() {
    let issuer = p256_issuer();
    let keys = SoftwareKeyProvider::new();
    let publisher = MemoryPublisher::new();
    let signer = build(config("normandy", &issuer), &keys, None, &publisher).unwrap();

    let payload = b"a payload long enough to sign".to_vec();
    let wire = signer.sign_data(&payload).unwrap().encode().unwrap();
    let chain = CertificateChain::from_pem(&publisher.fetch(signer.x5u()).unwrap()).unwrap();
    for byte in 0..payload.len() {
        let mut tampered = payload.clone();
        tampered[byte] ^= 0x01;
        let err = verify_with_chain(&chain, &wire, &tampered).unwrap_err();
        assert!(matches!(err, Error::VerificationFailed), "{err:?}");
    }
    verify_with_chain(&chain, &wire, &payload).unwrap();
}

#[test]
fn flipped_signature_bits_fail_verification() {
    let issuer = p384_issuer();
    let keys = SoftwareKeyProvider::new();
    let publisher = MemoryPublisher::new();
    let signer = build(config("normandy", &issuer), &keys, None, &publisher).unwrap();

    let payload = b"another payload to be signed";
    let raw = signer.sign_data(payload).unwrap().to_fixed();
    for byte in [0, 23, 47, 48, 70, 95] {
        let mut tampered = raw.clone();
        tampered[byte] ^= 0x80;
        let wire = URL_SAFE_NO_PAD.encode(&tampered);
        assert!(verify(&publisher, signer.x5u(), &wire, payload).is_err());
    }
}

#[test]
fn verification_errors_are_reported() {
    let issuer = p256_issuer();
    let keys = SoftwareKeyProvider::new();
    let publisher = MemoryPublisher::new();
    let signer = build(config("normandy", &issuer), &keys, None, &publisher).unwrap();
    let payload = b"payload for error paths";
    let wire = signer.sign_data(payload).unwrap().encode().unwrap();

    let err = verify(&publisher, "mem://chains/missing.chain", &wire, payload).unwrap_err();
    assert!(matches!(err, Error::Chain { .. }), "{err:?}");

    let err = verify(&publisher, signer.x5u(), "%%%", payload).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err:?}");

    let odd_length = URL_SAFE_NO_PAD.encode([7u8; 70]);
    let err = verify(&publisher, signer.x5u(), &odd_length, payload).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err:?}");

    let empty = CertificateChain::from_pem(b"").unwrap();
    assert!(verify_with_chain(&empty, &wire, payload).is_err());
}

#[test]
fn signature_from_another_mode_does_not_verify() {
    let p256 = p256_issuer();
    let p384 = p384_issuer();
    let keys = SoftwareKeyProvider::new();
    let publisher = MemoryPublisher::new();
    let small = build(config("small", &p256), &keys, None, &publisher).unwrap();
    let large = build(config("large", &p384), &keys, None, &publisher).unwrap();

    let payload = b"which curve signed this?";
    let wire = large.sign_data(payload).unwrap().encode().unwrap();
    let err = verify(&publisher, small.x5u(), &wire, payload).unwrap_err();
    assert!(matches!(err, Error::VerificationFailed), "{err:?}");
}

#[test]
fn file_published_chain_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("file://{}/chains/", dir.path().display());
    let issuer = p256_issuer();
    let keys = SoftwareKeyProvider::new();
    let mut conf = config("normandy", &issuer);
    conf.x5u = base.clone();
    conf.chain_upload_location = base;

    let signer = ContentSigner::new(
        conf,
        Collaborators {
            keys: &keys,
            registry: None,
            publisher: &FilePublisher,
            logger: None,
        },
    )
    .unwrap();
    let payload = b"payload stored on disk";
    let wire = signer.sign_data(payload).unwrap().encode().unwrap();
    verify(&FilePublisher, signer.x5u(), &wire, payload).unwrap();
    assert!(dir.path().join("chains").join(format!("{}.chain", signer.ee_label())).exists());
}
