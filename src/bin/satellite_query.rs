use anyhow::Context;
use clap::{Parser, Subcommand};
use ishare::cli::{IdentityArgs, SatelliteArgs};
use ishare::ishare::build_client_assertion;
use ishare::satellite::SatelliteClient;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(version, about = "Read-only queries against an iSHARE satellite", long_about = None)]
struct Cli {
    #[command(flatten)]
    identity: IdentityArgs,

    #[command(flatten)]
    satellite: SatelliteArgs,

    #[command(subcommand)]
    query: Query,
}

#[derive(Subcommand, Debug)]
enum Query {
    /// Certificate authorities trusted by the satellite
    TrustedList,
    /// Active parties known to the satellite
    Parties {
        /// Only return the party with this EORI
        #[arg(long)]
        eori: Option<String>,
    },
    /// Party information for a single party id
    Party { party_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ishare::init_logging();
    let cli = Cli::parse();

    let identity = cli.identity.load_identity()?;
    let config = cli
        .satellite
        .run_config(&identity, cli.identity.client_id.clone())?;
    let client_id = config.client_id(&identity);

    let satellite =
        SatelliteClient::new(&config.satellite_url, client_id, config.verification.clone())?;
    let assertion = build_client_assertion(&identity, client_id, &config.satellite_eori)?;
    let access_token = satellite
        .authenticate(&assertion)
        .await
        .context("Error authenticating at satellite")?;

    let result = match &cli.query {
        Query::TrustedList => satellite.get_trusted_list(&access_token).await?,
        Query::Parties { eori } => satellite.get_parties(&access_token, eori.as_deref()).await?,
        Query::Party { party_id } => {
            Value::Object(satellite.get_party(&access_token, party_id).await?)
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
