mod common;

use common::{issued, pkcs12, Pki, CLIENT_EORI, PASSWORD};
use ishare::identity::{CertificateError, SigningIdentity};

#[test]
fn test_load_identity_from_bundle() {
    let pki = Pki::new();
    let identity = SigningIdentity::from_pkcs12_der(&pki.client_p12, PASSWORD).unwrap();

    assert_eq!(identity.serial_number(), CLIENT_EORI);
    assert_eq!(identity.certificate_chain().len(), 2);
    assert_eq!(identity.certificate_chain()[0], pki.client.x5c());
    assert_eq!(identity.certificate_chain()[1], pki.ca.x5c());
}

#[test]
fn test_serial_number_is_deterministic() {
    let pki = Pki::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client.p12");
    std::fs::write(&path, &pki.client_p12).unwrap();

    let first = SigningIdentity::from_pkcs12_file(&path, PASSWORD).unwrap();
    let second = SigningIdentity::from_pkcs12_file(&path, PASSWORD).unwrap();

    assert!(!first.serial_number().is_empty());
    assert_eq!(first.serial_number(), second.serial_number());
    assert_eq!(first.certificate_chain(), second.certificate_chain());
}

#[test]
fn test_serial_falls_back_to_certificate_serial() {
    let pki = Pki::new();
    let anonymous = issued(&pki.ca, "No Subject Serial", None);
    let bundle = pkcs12(&anonymous, &[], PASSWORD);

    let identity = SigningIdentity::from_pkcs12_der(&bundle, PASSWORD).unwrap();

    // 4242
    assert_eq!(identity.serial_number(), "1092");
    assert_eq!(identity.certificate_chain().len(), 1);
}

#[test]
fn test_wrong_password() {
    let pki = Pki::new();

    assert!(matches!(
        SigningIdentity::from_pkcs12_der(&pki.client_p12, "wrong"),
        Err(CertificateError::InvalidBundle(_))
    ));
}

#[test]
fn test_malformed_bundle() {
    assert!(matches!(
        SigningIdentity::from_pkcs12_der(b"definitely not pkcs12", PASSWORD),
        Err(CertificateError::InvalidBundle(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        SigningIdentity::from_pkcs12_file(dir.path().join("missing.p12"), PASSWORD),
        Err(CertificateError::Unreadable { .. })
    ));
}
