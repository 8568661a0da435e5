use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use ishare::cli::{submission_mode, IdentityArgs, PacingArgs, SatelliteArgs};
use ishare::workflow::{onboard_file, onboard_folder};

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PartySource {
    /// Path to entitled party file
    #[arg(long)]
    entitled_party_file: Option<PathBuf>,

    /// Folder of entitled party files, each one is onboarded in turn
    #[arg(long)]
    entitled_party_folder: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(version, about = "Onboard entitled parties into an iSHARE satellite", long_about = None)]
struct Cli {
    #[command(flatten)]
    identity: IdentityArgs,

    #[command(flatten)]
    source: PartySource,

    #[command(flatten)]
    satellite: SatelliteArgs,

    /// Post the entitled party JSON as is instead of a signed EP token
    #[arg(long)]
    submit_raw: bool,

    #[command(flatten)]
    pacing: PacingArgs,
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let identity = cli.identity.load_identity()?;

    let mut config = cli
        .satellite
        .run_config(&identity, cli.identity.client_id.clone())?;
    config.submission = submission_mode(cli.submit_raw);
    config.pacing = cli.pacing.pacing()?;

    if let Some(folder) = &cli.source.entitled_party_folder {
        let report = onboard_folder(&config, &identity, folder).await?;

        for (path, reason) in &report.failed {
            tracing::error!("{}: {}", path.display(), reason);
        }

        return Ok(report.exit_code());
    }

    let Some(file) = &cli.source.entitled_party_file else {
        anyhow::bail!("no entitled party source given");
    };

    let outcome = onboard_file(&config, &identity, file).await?;
    Ok(outcome.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    ishare::init_logging();
    let cli = Cli::parse();

    run(cli).await.unwrap_or_else(|e| {
        tracing::error!("{:#}", e);
        ExitCode::FAILURE
    })
}
