mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{Connection, Failure};
use maasops_core::{install_signal_handler, process_token, DesiredState, Query, ReconcileOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "maasops",
    version,
    about = "Resolve MAAS machines and drive them to a desired state"
)]
struct Cli {
    /// MAAS service URL, e.g. http://maas.example:5240/MAAS (falls back to MAAS_URL).
    #[arg(long, global = true)]
    maas_url: Option<String>,

    /// MAAS API key "consumer:token:secret" (falls back to MAAS_APIKEY).
    #[arg(long, global = true)]
    maas_apikey: Option<String>,

    /// Config file (default: ~/.config/maasops/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ByHostnameOrId {
    /// Machine hostname (without domain).
    #[arg(long)]
    hostname: Option<String>,
    /// MAAS system ID; wins over --hostname.
    #[arg(long)]
    system_id: Option<String>,
}

impl ByHostnameOrId {
    fn query(&self) -> Query {
        Query::from_parts(self.hostname.as_deref(), self.system_id.as_deref(), None)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the full machine record and its power parameters.
    MachineInfo {
        #[command(flatten)]
        target: ByHostnameOrId,
    },
    /// Show the machine's lifecycle status and power state.
    StateInfo {
        #[command(flatten)]
        target: ByHostnameOrId,
    },
    /// Look up a machine's system ID by hostname or BMC address.
    SystemId {
        /// Machine hostname; wins over --power-address.
        #[arg(long)]
        hostname: Option<String>,
        /// BMC address as stored in the machine's power parameters.
        #[arg(long)]
        power_address: Option<String>,
    },
    /// Drive a machine to a desired state and wait for it.
    MachineState {
        #[command(flatten)]
        target: ByHostnameOrId,
        /// power-on, power-off, ready, commissioned or deployed.
        #[arg(long)]
        state: DesiredState,
        /// Give up waiting after this long (e.g. 90s, 10m).
        #[arg(long, default_value = "10m", value_parser = commands::parse_duration)]
        timeout: Duration,
        /// Delay between state polls.
        #[arg(long, default_value = "5s", value_parser = commands::parse_duration)]
        poll_interval: Duration,
        /// Report what would change without touching the machine.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Set a machine's hostname and, optionally, its DNS domain.
    SetHostname {
        #[arg(long)]
        system_id: String,
        #[arg(long)]
        hostname: String,
        /// Existing MAAS domain to move the machine into.
        #[arg(long)]
        domain: Option<String>,
        /// Report what would change without touching the machine.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn run(cli: Cli) -> Result<u8, Failure> {
    let json = cli.json;
    let conn = Connection {
        url: cli.maas_url.as_deref(),
        api_key: cli.maas_apikey.as_deref(),
        config: cli.config.as_deref(),
        request_timeout: cli.request_timeout,
    };
    let client = || commands::make_client(&conn);

    match cli.command {
        Commands::MachineInfo { target } => {
            commands::machine_info::run(&client()?, &target.query(), json)
        }
        Commands::StateInfo { target } => {
            commands::state_info::run(&client()?, &target.query(), json)
        }
        Commands::SystemId {
            hostname,
            power_address,
        } => {
            let query = Query::from_parts(hostname.as_deref(), None, power_address.as_deref());
            commands::system_id::run(&client()?, &query, json)
        }
        Commands::MachineState {
            target,
            state,
            timeout,
            poll_interval,
            check,
        } => {
            if poll_interval.is_zero() {
                return Err(Failure::new("invalid_query", "--poll-interval must be positive"));
            }
            let options = ReconcileOptions {
                timeout,
                poll_interval,
            };
            commands::machine_state::run(
                &client()?,
                &target.query(),
                state,
                &options,
                &process_token(),
                check,
                json,
            )
        }
        Commands::SetHostname {
            system_id,
            hostname,
            domain,
            check,
        } => commands::set_hostname::run(
            &client()?,
            &system_id,
            &hostname,
            domain.as_deref(),
            check,
            json,
        ),
        Commands::Completions { shell } => Ok(commands::completions::run::<Cli>(shell)),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MAASOPS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let json_output = cli.json;
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            if json_output {
                match commands::json_pretty(&failure.to_json()) {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("error: {e}"),
                }
            } else {
                eprintln!("error: {}", failure.msg);
            }
            ExitCode::from(failure.exit_code())
        }
    }
}
