use crate::identity::SigningIdentity;
use crate::pacing::Pacing;
use crate::verification::TokenVerification;

/// What is sent to the `/ep_creation` endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmissionMode {
    /// `{"ep_creation_token": <signed EP token>}`
    #[default]
    Token,
    /// The entitled party JSON as is.
    Raw,
}

/// Settings shared by every step of an onboarding run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub satellite_url: String,
    pub satellite_eori: String,
    pub client_id: Option<String>,
    pub verification: TokenVerification,
    pub submission: SubmissionMode,
    pub pacing: Pacing,
}

impl RunConfig {
    pub fn new(
        satellite_url: impl Into<String>,
        satellite_eori: impl Into<String>,
        verification: TokenVerification,
    ) -> Self {
        Self {
            satellite_url: satellite_url.into(),
            satellite_eori: satellite_eori.into(),
            client_id: None,
            verification,
            submission: SubmissionMode::default(),
            pacing: Pacing::default(),
        }
    }

    /// The explicitly configured client id, or the certificate serial number.
    pub fn client_id<'a>(&'a self, identity: &'a SigningIdentity) -> &'a str {
        self.client_id
            .as_deref()
            .unwrap_or_else(|| identity.serial_number())
    }
}
