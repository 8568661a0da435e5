use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ishare::transform::transform_csv;

/// Transform entitled party csv into json file format to be used in creation script
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON file to act as a base for all the properties that are not present in the csv
    #[arg(long)]
    template_file: PathBuf,

    /// CSV file containing rows of entitled parties to be created in the following format => party_id;party_name;start_date;end_date;description;logo;website;company_phone;company_email;ToU_sign_date;ToU_expiry_date;ToU_agreement_file;AA_sign_date;AA_expiry_date;AA_agreement_file
    #[arg(long)]
    ep_csv: PathBuf,

    /// Directory to store the resulting entitled party JSON files
    #[arg(long, default_value = "./eps")]
    output_dir: PathBuf,
}

fn main() -> ExitCode {
    ishare::init_logging();
    let cli = Cli::parse();

    match transform_csv(&cli.template_file, &cli.ep_csv, &cli.output_dir) {
        Ok(report) => {
            tracing::info!(
                "{} entitled party files written, {} rows skipped",
                report.written.len(),
                report.skipped.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
