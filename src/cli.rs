use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "qsf-fhir",
    version,
    about = "Convert Qualtrics survey exports into FHIR Questionnaires"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a .qsf export and optionally publish it.
    Convert(ConvertArgs),

    /// Write a settings file with default values.
    InitConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Path to the exported survey definition.
    #[arg(value_name = "SURVEY_FILE")]
    pub survey_file: PathBuf,

    /// Qualtrics survey id the export belongs to.
    #[arg(long = "survey-id", value_name = "ID")]
    pub survey_id: String,

    /// Replace this existing questionnaire instead of creating one.
    #[arg(long = "questionnaire-id", value_name = "ID")]
    pub questionnaire_id: Option<String>,

    /// JSON settings file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// FHIR base URL (overrides settings and FHIR_URL).
    #[arg(long = "fhir-url", value_name = "URL")]
    pub fhir_url: Option<String>,

    /// Publish the questionnaire to the FHIR store.
    #[arg(long)]
    pub publish: bool,

    /// Write the questionnaire here instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
