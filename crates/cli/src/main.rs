use chart_core::{
    group_and_order_doses_by, to_submission_payload, DoseEntry, DoseSequence, GroupingKey,
};
use chart_types::ResourceId;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fhir::{ImmunizationBundle, VaccineCode};
use std::num::NonZeroU32;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chart")]
#[command(about = "Patient chart immunization tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Group an Immunization bundle by vaccine and print the groups as JSON
    Group {
        /// Path to a FHIR search-set bundle
        bundle: PathBuf,
        /// Group by vaccine code instead of display name
        #[arg(long)]
        by_code: bool,
    },
    /// Print the submission JSON for a dose
    Submission {
        /// Patient identifier
        #[arg(long)]
        patient: String,
        #[arg(long)]
        vaccine_code: String,
        #[arg(long)]
        vaccine_name: String,
        /// Vaccination date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Position in the series (1-based)
        #[arg(long)]
        dose_number: Option<NonZeroU32>,
        /// Series label, e.g. "2 Months"
        #[arg(long)]
        series: Option<String>,
        /// Lot expiration date (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<NaiveDate>,
        #[arg(long)]
        manufacturer: Option<String>,
        #[arg(long)]
        lot: Option<String>,
        /// Encounter the dose was given in
        #[arg(long)]
        encounter: Option<String>,
        /// Existing dose event to update (omit to create)
        #[arg(long)]
        record_id: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Group { bundle, by_code }) => {
            let text = std::fs::read_to_string(&bundle)?;
            let records = ImmunizationBundle::parse(&text)?;
            let key = if by_code {
                GroupingKey::Code
            } else {
                GroupingKey::DisplayName
            };
            let groups = group_and_order_doses_by(records, key);
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
        Some(Commands::Submission {
            patient,
            vaccine_code,
            vaccine_name,
            date,
            dose_number,
            series,
            expires,
            manufacturer,
            lot,
            encounter,
            record_id,
        }) => {
            let patient_id = ResourceId::parse(&patient)?;
            let encounter_id = encounter.as_deref().map(ResourceId::parse).transpose()?;
            let record_id = record_id.as_deref().map(ResourceId::parse).transpose()?;

            let dose = DoseEntry {
                vaccine: VaccineCode {
                    code: Some(vaccine_code),
                    display: Some(vaccine_name),
                },
                sequence: dose_number.map(|number| DoseSequence {
                    label: series.unwrap_or_else(|| number.to_string()),
                    number,
                }),
                vaccination_date: Some(date),
                expiration_date: expires,
                manufacturer,
                lot_number: lot,
            };

            let submission = to_submission_payload(
                &dose,
                &patient_id,
                encounter_id.as_ref(),
                record_id.as_ref(),
            );
            println!("{}", submission.render()?);
        }
        None => {
            println!("Use 'chart --help' for commands");
        }
    }

    Ok(())
}
