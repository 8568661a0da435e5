use anyhow::Context;
use base64::prelude::*;
use chrono::{DateTime, SecondsFormat, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::{CertificateError, SigningIdentity};

/// Lifetime of every bearer assertion we mint.
pub const ASSERTION_LIFETIME_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IshareClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub exp: u64,
    pub iat: u64,
    pub nbf: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IshareClaimsWithExtra<ExtraClaims> {
    #[serde(flatten)]
    pub ishare_claims: IshareClaims,

    #[serde(flatten)]
    pub extra: ExtraClaims,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub party_id: String,
    pub party_name: String,
    pub capability_url: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntitledPartyClaims {
    pub parties_info: Map<String, Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("error signing token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub fn ishare_header(identity: &SigningIdentity) -> Header {
    Header {
        typ: Some("JWT".to_owned()),
        x5c: Some(identity.certificate_chain().to_vec()),
        alg: Algorithm::RS256,
        ..Default::default()
    }
}

pub fn create_ishare_claims(client_id: &str, audience: &str, now: DateTime<Utc>) -> IshareClaims {
    let iat = now.timestamp().max(0) as u64;

    IshareClaims {
        iss: client_id.to_owned(),
        sub: client_id.to_owned(),
        aud: audience.to_owned(),
        jti: uuid::Uuid::new_v4().to_string(),
        iat,
        nbf: iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

fn sign<T: Serialize>(identity: &SigningIdentity, claims: &T) -> Result<String, TokenError> {
    let header = ishare_header(identity);
    let encoding_key = identity.encoding_key()?;
    let token = encode(&header, claims, &encoding_key)?;

    Ok(token)
}

/// Client assertion for the OAuth2 client-credentials exchange. Valid for
/// 30 seconds, so mint a fresh one right before every token request.
pub fn build_client_assertion(
    identity: &SigningIdentity,
    client_id: &str,
    audience: &str,
) -> Result<String, TokenError> {
    let claims = create_ishare_claims(client_id, audience, Utc::now());
    sign(identity, &claims)
}

pub fn build_client_assertion_with_extra_claims<T: Serialize>(
    identity: &SigningIdentity,
    client_id: &str,
    audience: &str,
    extra_claims: T,
) -> Result<String, TokenError> {
    let claims = IshareClaimsWithExtra {
        ishare_claims: create_ishare_claims(client_id, audience, Utc::now()),
        extra: extra_claims,
    };

    sign(identity, &claims)
}

/// `2024-01-01T12:00:00.000Z`
pub fn spor_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Signed SPOR request for a party. The satellite expects the compact JWS
/// itself base64 encoded once more.
pub fn build_spor_token(
    identity: &SigningIdentity,
    party_id: &str,
    party_name: &str,
    capability_url: &str,
) -> Result<String, TokenError> {
    let eori = identity.serial_number();

    let claims = SporClaims {
        iss: eori.to_owned(),
        sub: eori.to_owned(),
        aud: eori.to_owned(),
        party_id: party_id.to_owned(),
        party_name: party_name.to_owned(),
        capability_url: capability_url.to_owned(),
        timestamp: spor_timestamp(Utc::now()),
    };

    let token = sign(identity, &claims)?;

    Ok(BASE64_STANDARD.encode(token))
}

/// Reverses the transport encoding of [`build_spor_token`].
pub fn unwrap_spor_token(encoded: &str) -> Result<String, TokenError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .context("SPOR token is not valid base64")?;

    let token = String::from_utf8(bytes).context("SPOR token is not valid utf-8")?;

    Ok(token)
}

pub fn build_ep_token(
    identity: &SigningIdentity,
    client_id: &str,
    audience: &str,
    party: &Map<String, Value>,
) -> Result<String, TokenError> {
    build_client_assertion_with_extra_claims(
        identity,
        client_id,
        audience,
        EntitledPartyClaims {
            parties_info: party.clone(),
        },
    )
}
