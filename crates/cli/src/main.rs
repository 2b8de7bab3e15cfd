use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use axon_config::{Domain, Settings};
use axon_ledger::{verify_ledger, VerifyOptions};

// Exit codes: 0 success, 2 config error, 3 role failure, 4 verifier
// integrity failure.
const EXIT_CONFIG: u8 = 2;
const EXIT_ROLE_FAILURE: u8 = 3;
const EXIT_INTEGRITY: u8 = 4;

#[derive(Parser)]
#[command(name = "axon", about = "Governed multi-role reasoning chains with a signed audit ledger", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: the user config dir).
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the five-role chain on an objective
    Run {
        /// The objective text
        objective: String,
        /// Domain label (see `axon domains`)
        #[arg(short, long)]
        domain: Option<String>,
        /// Reuse a session id instead of generating one
        #[arg(long)]
        session_id: Option<String>,
        /// Print the full result object instead of the report
        #[arg(long)]
        json: bool,
    },
    /// Re-verify the audit ledger's hashes and signatures
    Verify {
        /// HMAC secret file for hmac-signed entries
        #[arg(long)]
        hmac_secret: Option<PathBuf>,
    },
    /// Write the starter protocol tree and default settings
    Init,
    /// Create the Ed25519 signing key and publish the public key
    Keygen,
    /// Print the config fingerprint of the protocol files
    Fingerprint,
    /// List the supported domains
    Domains,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("axon=info".parse().expect("static directive")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("config error: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run_command(cli.command, settings).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("config error: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

async fn run_command(command: Commands, settings: Settings) -> Result<ExitCode> {
    match command {
        Commands::Run {
            objective,
            domain,
            session_id,
            json,
        } => {
            let domain = domain.map(|d| d.parse::<Domain>()).transpose()?;
            let chain = axon_core::Chain::from_settings(settings)?;
            let outcome = chain.run(&objective, domain, session_id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                match &outcome.results.report {
                    Some(report) => println!("{report}"),
                    None => {
                        for error in &outcome.results.errors {
                            eprintln!("error: {error}");
                        }
                    }
                }
                eprintln!(
                    "session {} | config {} | {} role(s) completed",
                    outcome.results.session_id,
                    outcome.results.config_hash,
                    outcome.results.roles.len()
                );
            }

            if outcome.results.failed_role.is_some() {
                return Ok(ExitCode::from(EXIT_ROLE_FAILURE));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { hmac_secret } => {
            let options = VerifyOptions { hmac_secret };
            let outcome = verify_ledger(&settings.paths.ledger_dir, &options)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.verified {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_INTEGRITY))
            }
        }
        Commands::Init => {
            settings.ensure_dirs()?;
            let created = axon_config::starter::write_starter_protocol(
                &settings.paths.protocol_dir,
                settings.chain.default_domain,
            )?;
            if created.is_empty() {
                println!("protocol tree already present, nothing written");
            } else {
                for file in created {
                    println!("wrote {file}");
                }
            }
            if !Settings::config_path().exists() {
                settings.save()?;
                println!("wrote {}", Settings::config_path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Keygen => {
            let signer =
                axon_ledger::EntrySigner::open(&settings.paths.ledger_dir, &settings.signing)?;
            println!("signer key id: {}", signer.key_id());
            println!(
                "public key: {}",
                settings.paths.ledger_dir.join("public.key").display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Fingerprint => {
            println!(
                "{}",
                axon_config::config_fingerprint(&settings.paths.protocol_dir)
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Domains => {
            for domain in Domain::all() {
                println!("{domain}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
