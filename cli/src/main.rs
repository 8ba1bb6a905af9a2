mod coach;
mod commands;
mod config;
mod server;
mod tls;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_coach, cmd_dial, cmd_events, cmd_import, cmd_log, cmd_plan, cmd_plan_status,
    cmd_profile_set, cmd_profile_show, cmd_profile_use, cmd_session_reset, cmd_session_start,
    cmd_session_status, cmd_summary, cmd_validate,
};
use crate::config::Config;
use waterbar_core::models::ProfileUpdate;
use waterbar_core::service::WaterBarService;

#[derive(Parser)]
#[command(
    name = "waterbar",
    version,
    about = "A local-first hydration tracker and coach",
    long_about = "\n\n  ██╗    ██╗ █████╗ ████████╗███████╗██████╗ ██████╗  █████╗ ██████╗
  ██║    ██║██╔══██╗╚══██╔══╝██╔════╝██╔══██╗██╔══██╗██╔══██╗██╔══██╗
  ██║ █╗ ██║███████║   ██║   █████╗  ██████╔╝██████╔╝███████║██████╔╝
  ██║███╗██║██╔══██║   ██║   ██╔══╝  ██╔══██╗██╔══██╗██╔══██║██╔══██╗
  ╚███╔███╔╝██║  ██║   ██║   ███████╗██║  ██║██████╔╝██║  ██║██║  ██║
   ╚══╝╚══╝ ╚═╝  ╚═╝   ╚═╝   ╚══════╝╚═╝  ╚═╝╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝
        know what you're drinking.
"
)]
struct Cli {
    /// Profile to operate on (default: the stored default profile)
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a hydration event (fluid, food, or activity)
    Log {
        /// Event type: fluid, food, activity
        event_type: String,
        /// What was consumed or done (e.g. "Water", "Morning run")
        name: String,
        /// Amount with optional unit (e.g. "500ml", "1.5l", "45min", "300")
        amount: String,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional note stored with the event
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List staged and validated events for a day
    Events {
        /// Date to list (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Confirm a day's staged events into the validated log
    Validate {
        /// Date to validate (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute the deterministic daily hydration plan
    Plan {
        #[command(subcommand)]
        command: Option<PlanCommands>,
        /// Height override in cm (default: profile height)
        #[arg(long)]
        height: Option<f64>,
        /// Weight override in kg (default: profile weight)
        #[arg(long)]
        weight: Option<f64>,
        /// Date whose validated events feed the plan (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Finalize a day and generate coached recommendations
    Coach {
        /// Date to coach (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Simulate hydration actions on the fluid-compartment model
    Dial {
        /// Actions to apply in order (water, miso, banana, run, electrolyte)
        actions: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's hydration dashboard (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Batch-stage events from a CSV export
    Import {
        /// Path to the CSV file (Date, Type, Name, Amount[, Unit, Notes])
        file: std::path::PathBuf,
        /// Preview the import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Enable TLS (HTTPS). Generates a self-signed certificate on first use.
        #[arg(long)]
        tls: bool,
        /// Path to TLS certificate file (PEM). Implies --tls.
        #[arg(long, value_name = "PATH")]
        tls_cert: Option<std::path::PathBuf>,
        /// Path to TLS private key file (PEM). Implies --tls.
        #[arg(long, value_name = "PATH")]
        tls_key: Option<std::path::PathBuf>,
        /// Print a pairing QR code on startup
        #[arg(long)]
        qr: bool,
    },
    /// Show or update the hydration profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Drive the daily check-in session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update profile fields
    Set {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Age in years
        #[arg(long)]
        age: Option<i64>,
        /// Sex: male or female
        #[arg(long)]
        sex: Option<String>,
        /// Measured body fat percentage
        #[arg(long)]
        body_fat: Option<f64>,
        /// Body-type label (lean, athletic, average, soft)
        #[arg(long)]
        body_type: Option<String>,
        /// Lean mass hydration multiplier override
        #[arg(long)]
        multiplier: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the default profile used by future commands
    Use {
        /// Profile ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start (or rejoin) the day's session
    Start {
        /// Session date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show where the day's session stands
    Status {
        /// Session date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Discard the day's session and staged events
    Reset {
        /// Session date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Accept a generated plan
    Accept {
        /// Plan ID (shown by coach and summary)
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reject a generated plan
    Reject {
        /// Plan ID (shown by coach and summary)
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let profile_id = cli
        .profile
        .unwrap_or_else(|| config.default_profile_id());
    let service = WaterBarService::new(&config.db_path)?;

    match cli.command {
        Commands::Log {
            event_type,
            name,
            amount,
            date,
            notes,
            json,
        } => cmd_log(
            &service,
            &profile_id,
            &event_type,
            &name,
            &amount,
            date,
            notes,
            json,
        ),
        Commands::Events { date, json } => cmd_events(&service, &profile_id, date, json),
        Commands::Validate { date, json } => cmd_validate(&service, &profile_id, date, json),
        Commands::Plan {
            command,
            height,
            weight,
            date,
            json,
        } => match command {
            Some(PlanCommands::Accept { plan_id, json }) => {
                cmd_plan_status(&service, plan_id, "accepted", json)
            }
            Some(PlanCommands::Reject { plan_id, json }) => {
                cmd_plan_status(&service, plan_id, "rejected", json)
            }
            None => cmd_plan(&service, &profile_id, height, weight, date, json),
        },
        Commands::Coach { date, json } => cmd_coach(&service, &profile_id, date, json),
        Commands::Dial { actions, json } => cmd_dial(&actions, json),
        Commands::Summary { date, json } => cmd_summary(&service, &profile_id, date, json),
        Commands::Import {
            file,
            dry_run,
            json,
        } => cmd_import(&service, &profile_id, &file, dry_run, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
            tls,
            tls_cert,
            tls_key,
            qr,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            let tls_config = if tls || tls_cert.is_some() || tls_key.is_some() {
                let (cert_path, key_path) = match (tls_cert, tls_key) {
                    (Some(cert), Some(key)) => (cert, key),
                    (cert, key) => {
                        let (default_cert, default_key) = tls::default_cert_paths()?;
                        (cert.unwrap_or(default_cert), key.unwrap_or(default_key))
                    }
                };
                Some(server::TlsConfig {
                    cert_path,
                    key_path,
                })
            } else {
                None
            };
            server::start_server(service, port, &bind, api_key, tls_config, new_api_key || qr)
                .await
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                height,
                weight,
                age,
                sex,
                body_fat,
                body_type,
                multiplier,
                json,
            } => {
                let update = ProfileUpdate {
                    name,
                    height_cm: height,
                    weight_kg: weight,
                    age,
                    sex,
                    body_fat_pct: body_fat,
                    lean_mass_multiplier: multiplier,
                    body_composition_label: body_type,
                };
                cmd_profile_set(&service, &profile_id, &update, json)
            }
            ProfileCommands::Show { json } => cmd_profile_show(&service, &profile_id, json),
            ProfileCommands::Use { id, json } => cmd_profile_use(&service, &config, &id, json),
        },
        Commands::Session { command } => match command {
            SessionCommands::Start { date, json } => {
                cmd_session_start(&service, &profile_id, date, json)
            }
            SessionCommands::Status { date, json } => {
                cmd_session_status(&service, &profile_id, date, json)
            }
            SessionCommands::Reset { date, json } => {
                cmd_session_reset(&service, &profile_id, date, json)
            }
        },
    }
}
