#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::prelude::*;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509NameBuilder, X509};
use serde_json::{json, Value};

pub const CLIENT_EORI: &str = "EU.EORI.NLCLIENT";
pub const SATELLITE_EORI: &str = "EU.EORI.NLSATELLITE";
pub const PASSWORD: &str = "correct horse";
pub const ACCESS_TOKEN: &str = "stub-access-token";

static INIT: std::sync::Once = std::sync::Once::new();

pub fn init_logs() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("warn".parse().unwrap()),
            )
            .with_test_writer()
            .try_init();
    });
}

#[derive(Clone)]
pub struct KeyPair {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl KeyPair {
    pub fn x5c(&self) -> String {
        BASE64_STANDARD.encode(self.cert.to_der().unwrap())
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(&self.key.private_key_to_pem_pkcs8().unwrap()).unwrap()
    }
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

/// Certificate for `common_name`, self signed when `issuer` is `None`.
pub fn certificate(
    common_name: &str,
    subject_serial: Option<&str>,
    serial: u32,
    key: &PKey<Private>,
    issuer: Option<&KeyPair>,
    is_ca: bool,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)
        .unwrap();
    if let Some(subject_serial) = subject_serial {
        name.append_entry_by_nid(Nid::SERIALNUMBER, subject_serial)
            .unwrap();
    }
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = Asn1Integer::from_bn(&BigNum::from_u32(serial).unwrap()).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some(issuer) => builder
            .set_issuer_name(issuer.cert.subject_name())
            .unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
    }

    let signing_key = issuer.map(|i| &i.key).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();

    builder.build()
}

pub fn ca(common_name: &str) -> KeyPair {
    let key = rsa_key();
    let cert = certificate(common_name, None, 1, &key, None, true);
    KeyPair { key, cert }
}

pub fn issued(issuer: &KeyPair, common_name: &str, subject_serial: Option<&str>) -> KeyPair {
    let key = rsa_key();
    let cert = certificate(common_name, subject_serial, 4242, &key, Some(issuer), false);
    KeyPair { key, cert }
}

pub fn pkcs12(pair: &KeyPair, chain: &[&X509], password: &str) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("client").pkey(&pair.key).cert(&pair.cert);

    if !chain.is_empty() {
        let mut ca = Stack::new().unwrap();
        for cert in chain {
            ca.push((*cert).clone()).unwrap();
        }
        builder.ca(ca);
    }

    builder.build2(password).unwrap().to_der().unwrap()
}

/// Client, satellite and the CA that issued both.
pub struct Pki {
    pub ca: KeyPair,
    pub client: KeyPair,
    pub satellite: KeyPair,
    pub client_p12: Vec<u8>,
}

impl Pki {
    pub fn new() -> Self {
        let ca = ca("Test iSHARE CA");
        let client = issued(&ca, "Test Client", Some(CLIENT_EORI));
        let satellite = issued(&ca, "Test Satellite", Some(SATELLITE_EORI));
        let client_p12 = pkcs12(&client, &[&ca.cert], PASSWORD);

        Self {
            ca,
            client,
            satellite,
            client_p12,
        }
    }

    pub fn identity(&self) -> ishare::identity::SigningIdentity {
        ishare::identity::SigningIdentity::from_pkcs12_der(&self.client_p12, PASSWORD).unwrap()
    }
}

/// Splits a compact JWS and returns its decoded header and payload.
pub fn jws_parts(token: &str) -> (Value, Value) {
    let mut parts = token.split('.');
    let header = parts.next().unwrap();
    let payload = parts.next().unwrap();
    assert!(parts.next().is_some(), "token has no signature part");

    let decode = |part: &str| -> Value {
        serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    };

    (decode(header), decode(payload))
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

pub struct StubConfig {
    pub token_status: StatusCode,
    pub existing: HashMap<String, Value>,
    pub rejected: HashSet<String>,
    pub audience: String,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            existing: HashMap::new(),
            rejected: HashSet::new(),
            audience: CLIENT_EORI.to_owned(),
        }
    }
}

#[derive(Clone)]
pub struct StubSatellite {
    config: Arc<StubConfig>,
    signer: Arc<KeyPair>,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubSatellite {
    pub fn new(config: StubConfig, signer: KeyPair) -> Self {
        Self {
            config: Arc::new(config),
            signer: Arc::new(signer),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn record(&self, path: String, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        self.requests.lock().unwrap().push(Recorded {
            path,
            authorization,
            body,
        });
    }

    fn sign(&self, claim: &str, value: Value) -> String {
        let iat = chrono::Utc::now().timestamp();
        let mut claims = json!({
            "iss": SATELLITE_EORI,
            "sub": SATELLITE_EORI,
            "aud": self.config.audience,
            "jti": uuid::Uuid::new_v4().to_string(),
            "iat": iat,
            "nbf": iat,
            "exp": iat + 30,
        });
        claims[claim] = value;

        let header = Header {
            typ: Some("JWT".to_owned()),
            x5c: Some(vec![self.signer.x5c()]),
            alg: Algorithm::RS256,
            ..Default::default()
        };

        jsonwebtoken::encode(&header, &claims, &self.signer.encoding_key()).unwrap()
    }

    /// Serves the stub on an ephemeral port and returns its base url.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/connect/token", post(token))
            .route("/parties", get(parties))
            .route("/parties/:party_id", get(party))
            .route("/trusted_list", get(trusted_list))
            .route("/ep_creation", post(ep_creation))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }
}

async fn token(
    State(stub): State<StubSatellite>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    stub.record(
        "/connect/token".to_owned(),
        &headers,
        serde_json::to_value(&form).unwrap(),
    );

    if stub.config.token_status != StatusCode::OK {
        return (stub.config.token_status, "invalid_client").into_response();
    }

    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

async fn party(
    State(stub): State<StubSatellite>,
    headers: HeaderMap,
    Path(party_id): Path<String>,
) -> Response {
    stub.record(format!("/parties/{}", party_id), &headers, Value::Null);

    let party_info = stub
        .config
        .existing
        .get(&party_id)
        .cloned()
        .unwrap_or_else(|| json!({}));

    Json(json!({ "party_token": stub.sign("party_info", party_info) })).into_response()
}

async fn parties(
    State(stub): State<StubSatellite>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    stub.record(
        "/parties".to_owned(),
        &headers,
        serde_json::to_value(&query).unwrap(),
    );

    let data: Vec<Value> = stub.config.existing.values().cloned().collect();
    let parties_info = json!({ "count": data.len(), "data": data });

    Json(json!({ "parties_token": stub.sign("parties_info", parties_info) })).into_response()
}

async fn trusted_list(State(stub): State<StubSatellite>, headers: HeaderMap) -> Response {
    stub.record("/trusted_list".to_owned(), &headers, Value::Null);

    let trusted_list = json!([{
        "subject": "CN=Test iSHARE CA",
        "certificate_fingerprint": "00",
        "validity": "valid",
        "status": "granted"
    }]);

    Json(json!({ "trusted_list_token": stub.sign("trusted_list", trusted_list) }))
        .into_response()
}

async fn ep_creation(
    State(stub): State<StubSatellite>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    stub.record("/ep_creation".to_owned(), &headers, body.clone());

    let party_id = match body.get("ep_creation_token").and_then(Value::as_str) {
        Some(token) => jws_parts(token).1["parties_info"]["party_id"].clone(),
        None => body["party_id"].clone(),
    };

    let rejected = party_id
        .as_str()
        .is_some_and(|id| stub.config.rejected.contains(id));

    if rejected {
        return (StatusCode::BAD_REQUEST, "party rejected").into_response();
    }

    (StatusCode::OK, "").into_response()
}
