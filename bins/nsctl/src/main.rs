//! nsctl - show and apply declarative network state.

mod apply;
mod show;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use netstate::provider::netlink::NetlinkProvider;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nsctl", version, about = "Declarative network state tool")]
struct Cli {
    /// Operate on the network namespace bound at PATH (e.g. /var/run/netns/NAME).
    #[arg(long, global = true, value_name = "PATH")]
    netns: Option<PathBuf>,

    /// Log engine decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current network state.
    Show(show::ShowArgs),

    /// Converge the network state to a document.
    Apply(apply::ApplyArgs),

    /// Print the operations a document would take, without executing them.
    Plan(apply::PlanArgs),
}

impl Cli {
    fn provider(&self) -> netstate::netlink::Result<NetlinkProvider> {
        match &self.netns {
            Some(path) => {
                debug!(netns = %path.display(), "opening namespace");
                NetlinkProvider::in_namespace(path)
            }
            None => NetlinkProvider::new(),
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let provider = cli.provider()?;
    match cli.command {
        Command::Show(args) => show::run(&provider, args).await,
        Command::Apply(args) => apply::run(&provider, args).await,
        Command::Plan(args) => apply::plan(&provider, args).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<netstate::Error>() {
            Some(err) => eprintln!("error: {}: {}", err.kind(), err),
            None => match e.downcast_ref::<netstate::PlatformError>() {
                Some(err) => eprintln!("error: {}: {}", netstate::ErrorKind::PlatformError, err),
                None => eprintln!("error: {:#}", e),
            },
        }
        std::process::exit(1);
    }
}
