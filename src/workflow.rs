use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{RunConfig, SubmissionMode};
use crate::identity::SigningIdentity;
use crate::ishare::{build_client_assertion, build_ep_token, build_spor_token, TokenError};
use crate::party::{list_party_files, EntitledParty, PartyFileError};
use crate::satellite::{SatelliteClient, SatelliteError, Submission};

#[derive(thiserror::Error, Debug)]
pub enum OnboardError {
    #[error(transparent)]
    PartyFile(#[from] PartyFileError),
    #[error("error building token: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    Satellite(#[from] SatelliteError),
    #[error("unable to list entitled party folder {path}: {source}")]
    Folder {
        path: String,
        source: std::io::Error,
    },
}

/// Terminal state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyExists,
    Submitted,
    SubmitFailed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::SubmitFailed)
    }

    /// A party that exists already is not an error.
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub submitted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    pub fn total(&self) -> usize {
        self.submitted.len() + self.skipped.len() + self.failed.len()
    }

    fn record(&mut self, path: PathBuf, result: Result<Outcome, OnboardError>) {
        match result {
            Ok(Outcome::Submitted) => self.submitted.push(path),
            Ok(Outcome::AlreadyExists) => self.skipped.push(path),
            Ok(Outcome::SubmitFailed) => {
                self.failed
                    .push((path, "satellite rejected the entitled party".to_owned()));
            }
            Err(e) => self.failed.push((path, e.to_string())),
        }
    }
}

/// Authenticates and checks `party` against the satellite, and registers it
/// when the satellite does not know it yet.
#[tracing::instrument(skip_all, fields(party_id = %party.party_id()))]
pub async fn onboard_party(
    config: &RunConfig,
    identity: &SigningIdentity,
    mut party: EntitledParty,
) -> Result<Outcome, OnboardError> {
    let client_id = config.client_id(identity);
    let satellite =
        SatelliteClient::new(&config.satellite_url, client_id, config.verification.clone())?;

    let assertion = build_client_assertion(identity, client_id, &config.satellite_eori)?;
    let access_token = satellite.authenticate(&assertion).await?;
    tracing::debug!("Authenticated at satellite");

    let party_id = party.party_id().to_owned();
    let existing = satellite.get_party(&access_token, &party_id).await?;

    if !existing.is_empty() {
        tracing::info!("Party with id {} exists already, skipping", party_id);
        return Ok(Outcome::AlreadyExists);
    }

    tracing::info!("Create entitled party: {}", party_id);

    let spor_token = build_spor_token(
        identity,
        &party_id,
        party.party_name(),
        party.capability_url()?,
    )?;
    party.attach_registration(&spor_token, identity.serial_number());

    let submitted = match config.submission {
        SubmissionMode::Token => {
            let ep_token =
                build_ep_token(identity, client_id, &config.satellite_eori, party.fields())?;
            satellite
                .submit_party(&access_token, Submission::Token(&ep_token))
                .await
        }
        SubmissionMode::Raw => {
            satellite
                .submit_party(&access_token, Submission::Raw(party.fields()))
                .await
        }
    };

    if submitted {
        tracing::info!("Entitled party {} created", party_id);
        Ok(Outcome::Submitted)
    } else {
        tracing::error!("Failed to create entitled party {}", party_id);
        Ok(Outcome::SubmitFailed)
    }
}

pub async fn onboard_file(
    config: &RunConfig,
    identity: &SigningIdentity,
    path: &Path,
) -> Result<Outcome, OnboardError> {
    let party = EntitledParty::load(path)?;
    onboard_party(config, identity, party).await
}

/// Onboards every JSON file in `dir`, one after the other. A failing record
/// is reported and the batch moves on.
pub async fn onboard_folder(
    config: &RunConfig,
    identity: &SigningIdentity,
    dir: &Path,
) -> Result<BatchReport, OnboardError> {
    let files = list_party_files(dir).map_err(|source| OnboardError::Folder {
        path: dir.display().to_string(),
        source,
    })?;

    tracing::info!("Found {} entitled party files in {}", files.len(), dir.display());

    let mut report = BatchReport::default();

    for (idx, path) in files.into_iter().enumerate() {
        if idx > 0 {
            config.pacing.wait().await;
        }

        tracing::info!("Processing {}", path.display());
        let result = onboard_file(config, identity, &path).await;

        if let Err(e) = &result {
            tracing::error!("Error onboarding {}: {}", path.display(), e);
        }

        report.record(path, result);
    }

    tracing::info!(
        "Processed {} files: {} submitted, {} skipped, {} failed",
        report.total(),
        report.submitted.len(),
        report.skipped.len(),
        report.failed.len()
    );

    Ok(report)
}
