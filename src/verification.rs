use std::path::Path;

use anyhow::Context;
use base64::prelude::*;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509StoreContext, X509};
use serde::de::DeserializeOwned;

use crate::identity::subject_serial_number;

#[derive(thiserror::Error, Debug)]
pub enum DecodeTokenError {
    #[error("x5c is missing from header")]
    MissingX5CHeader,
    #[error("x5c chain is not anchored in the trusted satellite certificate")]
    UntrustedChain,
    #[error("token is signed by {found:?}, expected the satellite {expected}")]
    UnexpectedSigner {
        expected: String,
        found: Option<String>,
    },
    #[error(transparent)]
    DecodingError(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Proof that the caller asked to skip signature checks. Only
/// [`TokenVerification::insecure_skip_verification`] hands one out.
#[derive(Debug, Clone)]
pub struct InsecureOverride(());

/// How tokens returned by the satellite are decoded.
#[derive(Debug, Clone)]
pub enum TokenVerification {
    /// The `x5c` chain has to lead up to `trust_anchor`, the signing
    /// certificate must belong to `satellite_eori` and the token must be
    /// issued by it for `audience`. Signature and expiry are checked.
    Verified {
        trust_anchor: X509,
        satellite_eori: String,
        audience: String,
    },
    /// Claims are read without any checks.
    Unverified(InsecureOverride),
}

impl TokenVerification {
    pub fn verified(
        trust_anchor: X509,
        satellite_eori: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self::Verified {
            trust_anchor,
            satellite_eori: satellite_eori.into(),
            audience: audience.into(),
        }
    }

    pub fn from_certificate_file(
        path: impl AsRef<Path>,
        satellite_eori: impl Into<String>,
        audience: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)
            .with_context(|| format!("Error reading satellite certificate {}", path.display()))?;

        let cert = X509::from_pem(&content)
            .or_else(|_| X509::from_der(&content))
            .with_context(|| format!("Error parsing satellite certificate {}", path.display()))?;

        Ok(Self::verified(cert, satellite_eori, audience))
    }

    pub fn insecure_skip_verification() -> Self {
        tracing::warn!(
            "Signature verification of satellite tokens is DISABLED, responses are trusted blindly"
        );
        Self::Unverified(InsecureOverride(()))
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

fn decode_x5c_entry(entry: &str) -> Result<X509, DecodeTokenError> {
    let der = BASE64_STANDARD
        .decode(entry.trim())
        .context("x5c entry is not valid base64")?;

    let cert = X509::from_der(&der).context("Error creating certificate from x5c entry")?;

    Ok(cert)
}

/// Builds a path from the leaf to the trust anchor with the rest of the chain
/// as untrusted intermediates. Issuers must be CAs and every certificate must
/// be within its validity period. The anchor does not have to be a root, so a
/// satellite certificate can be trusted directly.
fn verify_chain(chain: &[X509], trust_anchor: &X509) -> Result<(), DecodeTokenError> {
    let (leaf, intermediates) = chain.split_first().ok_or(DecodeTokenError::MissingX5CHeader)?;

    let mut store = X509StoreBuilder::new().context("Error creating certificate store")?;
    store
        .add_cert(trust_anchor.clone())
        .context("Error adding trust anchor to certificate store")?;
    store
        .set_flags(X509VerifyFlags::PARTIAL_CHAIN)
        .context("Error configuring certificate store")?;
    let store = store.build();

    let mut untrusted = Stack::new().context("Error creating certificate stack")?;
    for cert in intermediates {
        untrusted
            .push(cert.clone())
            .context("Error adding x5c certificate to stack")?;
    }

    let mut context = X509StoreContext::new().context("Error creating verification context")?;
    let failure = context
        .init(&store, leaf, &untrusted, |ctx| {
            Ok(if ctx.verify_cert()? {
                None
            } else {
                Some(ctx.error())
            })
        })
        .context("Error verifying x5c chain")?;

    match failure {
        None => Ok(()),
        Some(reason) => {
            tracing::warn!("Rejected satellite token chain: {}", reason);
            Err(DecodeTokenError::UntrustedChain)
        }
    }
}

fn decode_verified<T: DeserializeOwned>(
    token: &str,
    trust_anchor: &X509,
    satellite_eori: &str,
    audience: &str,
) -> Result<T, DecodeTokenError> {
    let header = decode_header(token)?;
    let x5c = header.x5c.ok_or(DecodeTokenError::MissingX5CHeader)?;

    let chain = x5c
        .iter()
        .map(|entry| decode_x5c_entry(entry))
        .collect::<Result<Vec<_>, _>>()?;

    verify_chain(&chain, trust_anchor)?;

    let signer = subject_serial_number(&chain[0])?;
    if signer.as_deref() != Some(satellite_eori) {
        return Err(DecodeTokenError::UnexpectedSigner {
            expected: satellite_eori.to_owned(),
            found: signer,
        });
    }

    let leaf_key = chain[0]
        .public_key()
        .and_then(|key| key.public_key_to_pem())
        .context("Error getting public key from x5c")?;

    let decoding_key =
        DecodingKey::from_rsa_pem(&leaf_key).context("Error creating decoding key from rsa pem")?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[satellite_eori]);

    let decoded = decode::<T>(token, &decoding_key, &validation)?;

    Ok(decoded.claims)
}

fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T, DecodeTokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let decoded = decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)?;

    Ok(decoded.claims)
}

/// Reads the claims of a token issued by the satellite.
pub fn decode_satellite_token<T: DeserializeOwned>(
    token: &str,
    verification: &TokenVerification,
) -> Result<T, DecodeTokenError> {
    match verification {
        TokenVerification::Verified {
            trust_anchor,
            satellite_eori,
            audience,
        } => decode_verified(token, trust_anchor, satellite_eori, audience),
        TokenVerification::Unverified(_) => decode_unverified(token),
    }
}
