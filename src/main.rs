//! Command-line entry point.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use qsf_fhir::clock::SystemClock;
use qsf_fhir::config::{load_settings, save_settings, Settings};
use qsf_fhir::error::{Error, Result};
use qsf_fhir::fhir::builder::ConvertOptions;
use qsf_fhir::fhir::types::Questionnaire;
use qsf_fhir::logging::{init_logging, LogConfig};
use qsf_fhir::publish::fhir_store::FhirStore;
use qsf_fhir::publish::Publisher;
use qsf_fhir::{convert_and_publish, convert_survey};
use tracing::{error, info};

mod cli;

use crate::cli::{Cli, Command, ConvertArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut log_config = LogConfig::from_flags(cli.verbose, cli.quiet);
    log_config.with_ansi = io::stderr().is_terminal();
    init_logging(&log_config);

    let result = match cli.command {
        Command::Convert(args) => run_convert(&args),
        Command::InitConfig { path } => save_settings(&path, &Settings::default()).map(|()| {
            info!(path = %path.display(), "wrote default settings");
        }),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_settings(args: &ConvertArgs) -> Result<Settings> {
    let settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    let mut settings = settings.with_env_overrides()?;
    if let Some(url) = &args.fhir_url {
        settings.fhir_url = url.trim().to_string();
    }
    Ok(settings)
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let settings = resolve_settings(args)?;
    let raw = fs::read(&args.survey_file)?;
    let target_id = args.questionnaire_id.as_deref();
    let clock = SystemClock;

    let questionnaire = if args.publish {
        let store = FhirStore::from_settings(&settings)?;
        let publisher = Publisher::from_settings(store, &settings);
        let (questionnaire, outcome) =
            convert_and_publish(&raw, &args.survey_id, target_id, &publisher, &clock)?;
        eprintln!(
            "{}: {}",
            outcome.label(),
            outcome.id().unwrap_or("(no id reported)")
        );
        questionnaire
    } else {
        let options = ConvertOptions {
            target_id,
            systems: &settings.identifier_systems,
            clock: &clock,
        };
        convert_survey(&raw, &args.survey_id, &options)?
    };
    write_questionnaire(args, &questionnaire)
}

fn write_questionnaire(args: &ConvertArgs, questionnaire: &Questionnaire) -> Result<()> {
    let payload = serde_json::to_string_pretty(questionnaire)
        .map_err(|e| Error::Io(io::Error::other(e)))?;
    match &args.output {
        Some(path) => {
            fs::write(path, payload)?;
            info!(path = %path.display(), "wrote questionnaire");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{payload}")?;
        }
    }
    Ok(())
}
