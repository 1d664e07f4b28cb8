mod keyboard;
mod kiosk;

use clap::{Args, Parser, Subcommand};
use kiosk::{Kiosk, KioskError};
use preesense_client::{NewPatient, UserId};
use preesense_common::config::Config;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "config.toml";

/// PreeSense urinalysis kiosk: camera capture and sample analysis.
#[derive(Debug, Parser)]
#[command(name = "preesense-kiosk", version)]
struct Cli {
    /// TOML config file [default: config.toml, built-in defaults if absent]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// Live camera preview until Ctrl-C
    Preview,
    /// List registered users whose name contains the query
    Users { query: Vec<String> },
    /// Register a patient, then capture and analyze a sample
    Register(PatientArgs),
    /// Capture and analyze a sample for a registered user
    Analyze { id: UserId },
}

/// Patient details. With none given, they are prompted for on the terminal.
#[derive(Debug, Default, PartialEq, Args)]
struct PatientArgs {
    #[arg(long)]
    first: Option<String>,
    #[arg(long)]
    middle: Option<String>,
    #[arg(long)]
    last: Option<String>,
    #[arg(long)]
    age: Option<String>,
    #[arg(long)]
    sex: Option<String>,
}

impl PatientArgs {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn validate(&self) -> Result<NewPatient, KioskError> {
        let field = |f: &Option<String>| f.clone().unwrap_or_default();
        Ok(NewPatient::validate(
            &field(&self.first),
            &field(&self.middle),
            &field(&self.last),
            &field(&self.age),
            &field(&self.sex),
        )?)
    }
}

/// Load the config. Only a missing default `config.toml` falls back to
/// built-in defaults; the flag is true in that case.
fn load_config(explicit: Option<&Path>) -> Result<(Config, bool), String> {
    let path = explicit.unwrap_or(Path::new(DEFAULT_CONFIG));
    if explicit.is_none() && !path.exists() {
        let config =
            Config::parse("").map_err(|e| format!("Failed to build default config: {e}"))?;
        return Ok((config, true));
    }
    Config::load(path)
        .map(|c| (c, false))
        .map_err(|e| format!("Failed to load config from {}: {e}", path.display()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, defaults) = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if defaults {
        warn!(path = DEFAULT_CONFIG, "config file not found, using built-in defaults");
    }

    info!(
        camera_source = ?config.camera.source,
        server = config.server.base_url,
        max_buffer_bytes = config.camera.max_buffer_bytes,
        "starting preesense kiosk"
    );

    let mut kiosk = match Kiosk::new(config) {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "failed to initialise kiosk");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&mut kiosk, cli.command).await {
        error!(error = %e, "command failed");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(kiosk: &mut Kiosk, command: Command) -> Result<(), KioskError> {
    match command {
        Command::Preview => kiosk.preview().await,
        Command::Users { query } => {
            let query = query.join(" ");
            let users = kiosk.find_users(&query).await?;
            if users.is_empty() {
                warn!(%query, "no registered users matched");
            }
            for user in users {
                println!(
                    "{}\t{}\tAge: {}\tSex: {}",
                    user.id,
                    user.full_name(),
                    user.age_text(),
                    user.gender_text()
                );
            }
        }
        Command::Register(fields) => {
            let patient = if fields.is_empty() {
                kiosk.prompt_patient().await?
            } else {
                fields.validate()?
            };
            println!("{}", kiosk.register_and_analyze(&patient).await?);
        }
        Command::Analyze { id } => {
            println!("{}", kiosk.analyze_registered(&id).await?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use preesense_client::PatientError;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("preesense-kiosk").chain(line.split_whitespace()))
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_path_is_any_file() {
        let cli = parse("--config /etc/preesense/kiosk.conf preview").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/preesense/kiosk.conf")));
        assert_eq!(cli.command, Command::Preview);

        let cli = parse("preview").unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse("users maria santos").unwrap().command,
            Command::Users {
                query: vec!["maria".into(), "santos".into()]
            }
        );
        assert_eq!(
            parse("users").unwrap().command,
            Command::Users { query: Vec::new() }
        );
        assert_eq!(
            parse("analyze 12").unwrap().command,
            Command::Analyze {
                id: UserId::Number(12)
            }
        );
        assert_eq!(
            parse("analyze u-2").unwrap().command,
            Command::Analyze {
                id: UserId::Text("u-2".into())
            }
        );
    }

    #[test]
    fn register_without_fields_prompts() {
        let Command::Register(fields) = parse("register").unwrap().command else {
            panic!("register did not parse");
        };
        assert!(fields.is_empty());
    }

    #[test]
    fn register_fields_are_validated() {
        let Command::Register(fields) =
            parse("register --first juan --middle - --last luna --age 7 --sex male")
                .unwrap()
                .command
        else {
            panic!("register did not parse");
        };
        assert!(!fields.is_empty());
        let patient = fields.validate().unwrap();
        assert_eq!(patient.middlename, "-");
        assert_eq!(patient.lastname, "Luna");

        let Command::Register(fields) = parse("register --first juan --age 7").unwrap().command
        else {
            panic!("register did not parse");
        };
        assert!(matches!(
            fields.validate(),
            Err(KioskError::Patient(PatientError::LastNameRequired))
        ));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse("analyze").is_err());
        assert!(parse("preview now").is_err());
        assert!(parse("register juan luna").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/kiosk.toml"))).unwrap_err();
        assert!(err.contains("/nonexistent/kiosk.toml"));
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kiosk.conf");
        std::fs::write(&path, "[server]\nbase_url = \"http://analysis:5000\"\n").unwrap();
        let (config, defaults) = load_config(Some(&path)).unwrap();
        assert!(!defaults);
        assert_eq!(config.server.base_url, "http://analysis:5000");
    }
}
