mod broadcast;
mod chain;
mod events;
mod mesh;

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use ripple_core::{ColourState, RippleConfig};

#[derive(Parser)]
#[command(name = "ripple-sim", about = "Drive Ripple relay runtimes over an in-memory mesh")]
struct Cli {
    /// Application port (default: RIPPLE_MESH_PORT or 9001).
    #[arg(long)]
    port: Option<u16>,

    /// Per-step timeout in ms.
    #[arg(long, default_value = "5000")]
    timeout: u64,

    /// Emit JSONL events on stdout instead of a text trail.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Line of nodes: the first sends to the last, every hop repaints.
    Chain {
        /// Number of nodes in the line (at least 2).
        #[arg(long, default_value = "4")]
        nodes: usize,
        /// Colour to send.
        #[arg(long, default_value = "GREEN")]
        colour: ColourState,
    },

    /// Star: the hub sends its colour to every leaf.
    Broadcast {
        /// Number of leaves around the hub.
        #[arg(long, default_value = "3")]
        leaves: usize,
        /// Colour to send.
        #[arg(long, default_value = "BLUE")]
        colour: ColourState,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let mut config = RippleConfig::new();
    if let Some(port) = cli.port {
        config = config.mesh_port(port);
    }
    let settings = mesh::SimSettings {
        config,
        timeout: Duration::from_millis(cli.timeout),
        json: cli.json,
    };

    eprintln!("ripple-sim v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Port: {}", settings.config.port());
    eprintln!();

    match cli.command {
        Command::Chain { nodes, colour } => {
            if nodes < 2 {
                anyhow::bail!("a chain needs at least 2 nodes, got {nodes}");
            }
            chain::run(&settings, nodes, colour, start).await?;
        }
        Command::Broadcast { leaves, colour } => {
            if leaves == 0 {
                anyhow::bail!("a broadcast needs at least 1 leaf");
            }
            broadcast::run(&settings, leaves, colour, start).await?;
        }
    }

    Ok(())
}
