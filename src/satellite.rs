use std::time::Instant;

use http::Extensions;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::verification::{decode_satellite_token, DecodeTokenError, TokenVerification};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[derive(thiserror::Error, Debug)]
pub enum SatelliteError {
    #[error("invalid satellite url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        source: reqwest_middleware::Error,
    },
    #[error("satellite answered {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response body from {url}: {source}")]
    Body {
        url: String,
        source: serde_json::Error,
    },
    #[error("error decoding token from {url}: {source}")]
    Token {
        url: String,
        source: DecodeTokenError,
    },
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct PartyResponse {
    party_token: String,
}

#[derive(Deserialize)]
struct PartiesResponse {
    parties_token: String,
}

#[derive(Deserialize)]
struct TrustedListResponse {
    trusted_list_token: String,
}

#[derive(Deserialize)]
struct PartyToken {
    #[serde(default)]
    party_info: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct PartiesToken {
    #[serde(default)]
    parties_info: Value,
}

#[derive(Deserialize)]
struct TrustedListToken {
    #[serde(default)]
    trusted_list: Value,
}

/// Body of an entitled party creation request.
#[derive(Debug, Clone, Copy)]
pub enum Submission<'a> {
    Token(&'a str),
    Raw(&'a Map<String, Value>),
}

impl Submission<'_> {
    fn body(&self) -> Value {
        match self {
            Submission::Token(token) => json!({ "ep_creation_token": token }),
            Submission::Raw(party) => Value::Object((*party).clone()),
        }
    }
}

/// Logs every satellite round trip with its duration. Failed answers are
/// logged with their body by the caller, which reads it.
struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_owned();
        let started = Instant::now();

        let res = next.run(req, extensions).await;

        match &res {
            Ok(res) => tracing::debug!(
                "satellite {} {} answered {} in {:?}",
                method,
                path,
                res.status(),
                started.elapsed()
            ),
            Err(err) => tracing::error!(
                "satellite {} {} unreachable after {:?}: {}",
                method,
                path,
                started.elapsed(),
                err
            ),
        }

        res
    }
}

/// Client for the satellite endpoints used during onboarding. Nothing is
/// retried, the first failure is returned to the caller.
pub struct SatelliteClient {
    base_url: String,
    client_id: String,
    verification: TokenVerification,
    http: ClientWithMiddleware,
}

impl std::fmt::Debug for SatelliteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatelliteClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl SatelliteClient {
    pub fn new(
        base_url: &str,
        client_id: &str,
        verification: TokenVerification,
    ) -> Result<Self, SatelliteError> {
        Url::parse(base_url)?;

        let http = ClientBuilder::new(reqwest::Client::new())
            .with(LoggingMiddleware)
            .build();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client_id: client_id.to_owned(),
            verification,
            http,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, SatelliteError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    async fn read_ok(&self, url: &Url, response: Response) -> Result<Vec<u8>, SatelliteError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport(url, e.into()))?;

        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::error!("{} answered {}: {}", url.path(), status, body);
            return Err(SatelliteError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        access_token: &str,
    ) -> Result<T, SatelliteError> {
        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let bytes = self.read_ok(&url, response).await?;

        serde_json::from_slice::<T>(&bytes).map_err(|source| SatelliteError::Body {
            url: url.to_string(),
            source,
        })
    }

    fn decode<T: DeserializeOwned>(&self, url: &Url, token: &str) -> Result<T, SatelliteError> {
        decode_satellite_token::<T>(token, &self.verification).map_err(|source| {
            SatelliteError::Token {
                url: url.to_string(),
                source,
            }
        })
    }

    /// Exchanges a client assertion for an access token.
    #[tracing::instrument(skip(self, client_assertion), fields(client_id = %self.client_id))]
    pub async fn authenticate(&self, client_assertion: &str) -> Result<String, SatelliteError> {
        let url = self.endpoint("/connect/token")?;

        let form_data = [
            ("grant_type", "client_credentials"),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_id", self.client_id.as_str()),
            ("scope", "iSHARE"),
            ("client_assertion", client_assertion),
        ];

        let response = self
            .http
            .post(url.clone())
            .header("Accept", "application/json")
            .form(&form_data)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let bytes = self.read_ok(&url, response).await?;
        let login = serde_json::from_slice::<LoginResponse>(&bytes).map_err(|source| {
            SatelliteError::Body {
                url: url.to_string(),
                source,
            }
        })?;

        Ok(login.access_token)
    }

    /// Party information registered for `party_id`; empty when the party is unknown.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn get_party(
        &self,
        access_token: &str,
        party_id: &str,
    ) -> Result<Map<String, Value>, SatelliteError> {
        let mut url = self.endpoint("/parties")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(party_id);

        let response: PartyResponse = self.get_json(url.clone(), access_token).await?;
        let token: PartyToken = self.decode(&url, &response.party_token)?;

        Ok(token.party_info.unwrap_or_default())
    }

    /// Active parties, optionally filtered on EORI (`*` when not).
    #[tracing::instrument(skip(self, access_token))]
    pub async fn get_parties(
        &self,
        access_token: &str,
        eori: Option<&str>,
    ) -> Result<Value, SatelliteError> {
        let mut url = self.endpoint("/parties")?;
        url.query_pairs_mut()
            .append_pair("eori", eori.unwrap_or("*"))
            .append_pair("active_only", "true");

        let response: PartiesResponse = self.get_json(url.clone(), access_token).await?;
        let token: PartiesToken = self.decode(&url, &response.parties_token)?;

        Ok(token.parties_info)
    }

    #[tracing::instrument(skip(self, access_token))]
    pub async fn get_trusted_list(&self, access_token: &str) -> Result<Value, SatelliteError> {
        let url = self.endpoint("/trusted_list")?;

        let response: TrustedListResponse = self.get_json(url.clone(), access_token).await?;
        let token: TrustedListToken = self.decode(&url, &response.trusted_list_token)?;

        Ok(token.trusted_list)
    }

    /// Posts an entitled party. Returns `true` only for a 200 answer; every
    /// other outcome is logged and reported as `false`.
    #[tracing::instrument(skip(self, access_token, submission))]
    pub async fn submit_party(&self, access_token: &str, submission: Submission<'_>) -> bool {
        let url = match self.endpoint("/ep_creation") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("{}", e);
                return false;
            }
        };

        let response = match self
            .http
            .post(url)
            .header("Accept", "application/json")
            .bearer_auth(access_token)
            .json(&submission.body())
            .send()
            .await
        {
            Ok(response) => response,
            Err(_) => return false,
        };

        let status = response.status();
        if status == StatusCode::OK {
            return true;
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!("/ep_creation answered {}: {}", status, body);

        false
    }
}

fn transport(url: &Url, source: reqwest_middleware::Error) -> SatelliteError {
    SatelliteError::Transport {
        url: url.to_string(),
        source,
    }
}
