mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, ParamArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "frappe-provision",
    about = "Provision a Frappe development host: a root phase, then a user phase as the target user",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: /etc/frappe-provision/config.yaml)
    #[arg(long, global = true, env = "FRAPPE_PROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Run log directory (overrides the config)
    #[arg(long, global = true, env = "FRAPPE_PROVISION_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: root phase, switch to the target user, user phase
    Run {
        #[command(flatten)]
        params: ParamArgs,
    },

    /// Run the root phase only (must be run as root)
    RootPhase {
        /// Target user name
        #[arg(long, env = "FRAPPE_PROVISION_USER")]
        user: Option<String>,

        /// SSH public key to authorize for the target user
        #[arg(long, env = "FRAPPE_PROVISION_SSH_KEY")]
        ssh_key: Option<String>,
    },

    /// Run the user phase only (must be run as the target user)
    UserPhase {
        #[command(flatten)]
        params: ParamArgs,

        /// Read parameters as JSON from stdin instead of flags
        #[arg(long)]
        params_stdin: bool,

        /// Print the phase report as one JSON line on stdout
        #[arg(long)]
        report_json: bool,
    },

    /// List both phases' steps without running anything
    Plan,

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::RootPhase { .. } | Commands::UserPhase { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    // stdout carries reports; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = settings::Settings::load(cli.config.as_deref(), cli.log_dir, cli.json)
        .and_then(|settings| match cli.command {
            Commands::Run { params } => {
                cmd::run::run(&settings, params.into_raw()).map(|o| o.exit_code())
            }
            Commands::RootPhase { user, ssh_key } => {
                cmd::phase::root(&settings, user, ssh_key).map(|o| o.exit_code())
            }
            Commands::UserPhase {
                params,
                params_stdin,
                report_json,
            } => cmd::phase::user(&settings, params, params_stdin, report_json)
                .map(|o| o.exit_code()),
            Commands::Plan => cmd::plan::run(&settings).map(|()| 0),
            Commands::Config { subcommand } => {
                cmd::config::run(&settings, subcommand).map(|()| 0)
            }
        });

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
