//! Command line arguments shared by the binaries.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::config::{RunConfig, SubmissionMode};
use crate::identity::SigningIdentity;
use crate::pacing::Pacing;
use crate::verification::TokenVerification;

#[derive(Args, Debug)]
pub struct IdentityArgs {
    /// Path to certificate file (.p12)
    #[arg(long, env = "ISHARE_CERT")]
    pub cert: PathBuf,

    /// Certificate password
    #[arg(long, env = "ISHARE_CERT_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Client ID, defaults to the certificate serial number
    #[arg(long, env = "ISHARE_CLIENT_ID")]
    pub client_id: Option<String>,
}

impl IdentityArgs {
    pub fn load_identity(&self) -> anyhow::Result<SigningIdentity> {
        let identity = SigningIdentity::from_pkcs12_file(&self.cert, &self.password)
            .with_context(|| format!("Error loading certificate {}", self.cert.display()))?;

        tracing::info!("serial_nr: {}", identity.serial_number());

        Ok(identity)
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TrustArgs {
    /// Certificate (PEM or DER) that satellite token chains must lead up to
    #[arg(long, env = "ISHARE_SATELLITE_CERT")]
    pub satellite_cert: Option<PathBuf>,

    /// Read satellite tokens without verifying their signature
    #[arg(long)]
    pub insecure_skip_verify: bool,
}

impl TrustArgs {
    /// `audience` is the client id the satellite addresses its tokens to.
    pub fn verification(
        &self,
        satellite_eori: &str,
        audience: &str,
    ) -> anyhow::Result<TokenVerification> {
        match &self.satellite_cert {
            Some(path) => TokenVerification::from_certificate_file(path, satellite_eori, audience),
            None => Ok(TokenVerification::insecure_skip_verification()),
        }
    }
}

#[derive(Args, Debug)]
pub struct SatelliteArgs {
    /// iSHARE satellite URL
    #[arg(long, env = "ISHARE_SATELLITE_URL")]
    pub satellite_url: String,

    /// iSHARE satellite EORI, audience of the client assertion
    #[arg(long, env = "ISHARE_SATELLITE_EORI")]
    pub satellite_eori: String,

    #[command(flatten)]
    pub trust: TrustArgs,
}

impl SatelliteArgs {
    pub fn run_config(
        &self,
        identity: &SigningIdentity,
        client_id: Option<String>,
    ) -> anyhow::Result<RunConfig> {
        let audience = client_id
            .as_deref()
            .unwrap_or_else(|| identity.serial_number());
        let verification = self.trust.verification(&self.satellite_eori, audience)?;

        let mut config = RunConfig::new(
            self.satellite_url.clone(),
            self.satellite_eori.clone(),
            verification,
        );
        config.client_id = client_id;

        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct PacingArgs {
    /// Fixed delay between two entitled parties of a folder
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with_all = ["delay_min", "delay_max"])]
    pub delay: Option<Duration>,

    /// Lower bound of the random delay between two entitled parties
    #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    pub delay_min: Duration,

    /// Upper bound of the random delay between two entitled parties
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1500ms")]
    pub delay_max: Duration,

    /// Do not wait between entitled parties
    #[arg(long, conflicts_with_all = ["delay", "delay_min", "delay_max"])]
    pub no_delay: bool,
}

impl PacingArgs {
    pub fn pacing(&self) -> anyhow::Result<Pacing> {
        if self.no_delay {
            return Ok(Pacing::None);
        }

        if let Some(delay) = self.delay {
            return Ok(Pacing::Fixed(delay));
        }

        Ok(Pacing::jitter(self.delay_min, self.delay_max)?)
    }
}

pub fn submission_mode(raw: bool) -> SubmissionMode {
    if raw {
        SubmissionMode::Raw
    } else {
        SubmissionMode::Token
    }
}
