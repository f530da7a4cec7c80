use clap::Parser;
use maasops_server::{Inventory, MaasSimServer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "maasops-server", about = "Simulated MAAS 2.0 endpoint")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 5240)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// JSON inventory of machines and domains. A small demo rack is used if omitted.
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Machine reads after which an accepted transition completes.
    #[arg(long, default_value_t = 2)]
    settle_reads: u32,

    /// Reject requests without an OAuth PLAINTEXT Authorization header.
    #[arg(long)]
    require_auth: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let inventory = match cli.inventory {
        Some(ref path) => match Inventory::load(path) {
            Ok(inv) => inv,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Inventory::demo(),
    };
    let machines = inventory.machines.len();
    let sim = Arc::new(inventory.into_simulator().with_settle_reads(cli.settle_reads));

    let mut state = MaasSimServer::new(sim);
    if cli.require_auth {
        state = state.with_required_auth();
    }

    let addr = format!("{}:{}", cli.bind, cli.port);
    info!("serving {machines} simulated machines on http://{addr}/MAAS/");
    match maasops_server::run_server(&Arc::new(state), &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
