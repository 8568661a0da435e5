use std::path::Path;

use anyhow::Context;
use base64::prelude::*;
use jsonwebtoken::EncodingKey;
use openssl::{
    nid::Nid,
    pkcs12::{ParsedPkcs12_2, Pkcs12},
    pkey::{PKey, Private},
    x509::{X509Ref, X509},
};

#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    #[error("unable to read certificate file {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to open certificate bundle, wrong password or malformed file: {0}")]
    InvalidBundle(#[source] openssl::error::ErrorStack),
    #[error("certificate bundle does not contain a private key")]
    MissingPrivateKey,
    #[error("certificate bundle does not contain a certificate")]
    MissingCertificate,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Key material and certificate chain used to sign every token of a run.
pub struct SigningIdentity {
    private_key: PKey<Private>,
    certificate_chain: Vec<String>,
    serial_number: String,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("serial_number", &self.serial_number)
            .field("certificates", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    pub fn from_pkcs12_file(
        path: impl AsRef<Path>,
        password: &str,
    ) -> Result<Self, CertificateError> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| CertificateError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_pkcs12_der(&content, password)
    }

    pub fn from_pkcs12_der(der: &[u8], password: &str) -> Result<Self, CertificateError> {
        // Older bundles are encrypted with RC2/3DES, which only the legacy provider knows.
        let _provider = match openssl::provider::Provider::try_load(None, "legacy", true) {
            Ok(provider) => Some(provider),
            Err(e) => {
                tracing::debug!("OpenSSL legacy provider not available: {}", e);
                None
            }
        };

        let parsed = Pkcs12::from_der(der)
            .and_then(|pkcs12| pkcs12.parse2(password))
            .map_err(CertificateError::InvalidBundle)?;

        Self::from_parsed(parsed)
    }

    fn from_parsed(parsed: ParsedPkcs12_2) -> Result<Self, CertificateError> {
        let private_key = parsed.pkey.ok_or(CertificateError::MissingPrivateKey)?;
        let leaf = parsed.cert.ok_or(CertificateError::MissingCertificate)?;

        let mut certificate_chain = vec![encode_certificate(&leaf)?];
        if let Some(ca) = parsed.ca.as_ref() {
            for cert in ca.iter() {
                certificate_chain.push(encode_certificate(cert)?);
            }
        }

        let serial_number = parse_serial_number(&leaf)?;

        Ok(Self {
            private_key,
            certificate_chain,
            serial_number,
        })
    }

    /// Subject serial number of the leaf certificate, the default client id.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Base64 DER certificates, leaf first, ready for an `x5c` header.
    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }

    pub fn encoding_key(&self) -> Result<EncodingKey, CertificateError> {
        let pem = self
            .private_key
            .private_key_to_pem_pkcs8()
            .context("Error exporting private key")?;

        let key = EncodingKey::from_rsa_pem(&pem)
            .context("Private key is not usable for RS256 signing")?;

        Ok(key)
    }
}

fn encode_certificate(cert: &openssl::x509::X509Ref) -> Result<String, CertificateError> {
    let der = cert.to_der().context("Error encoding certificate")?;
    Ok(BASE64_STANDARD.encode(der))
}

/// The subject `serialNumber` attribute, where iSHARE parties carry their EORI.
pub(crate) fn subject_serial_number(cert: &X509Ref) -> anyhow::Result<Option<String>> {
    let serial = cert
        .subject_name()
        .entries_by_nid(Nid::SERIALNUMBER)
        .next()
        .map(|entry| entry.data().as_utf8().map(|s| s.to_string()))
        .transpose()
        .context("Error reading serial number from subject")?
        .filter(|s| !s.trim().is_empty());

    Ok(serial)
}

/// Certificates without a subject serial number fall back to the X.509
/// serial in hex.
fn parse_serial_number(cert: &X509) -> Result<String, CertificateError> {
    if let Some(serial) = subject_serial_number(cert)? {
        return Ok(serial);
    }

    let serial = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
        .context("Error reading certificate serial number")?;

    if serial.is_empty() {
        return Err(CertificateError::Unexpected(anyhow::anyhow!(
            "certificate has no usable serial number"
        )));
    }

    tracing::warn!(
        "No serialNumber in certificate subject, using certificate serial {}",
        serial
    );

    Ok(serial)
}
