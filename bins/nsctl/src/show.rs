//! Show command - print the current network state.

use clap::Args;
use netstate::RetrieveFilter;
use netstate::provider::netlink::NetlinkProvider;

#[derive(Args)]
pub struct ShowArgs {
    /// Show only this interface.
    #[arg(short, long)]
    pub iface: Option<String>,

    /// Leave routes out.
    #[arg(long)]
    pub no_routes: bool,

    /// Print YAML instead of JSON.
    #[arg(long, conflicts_with = "json")]
    pub yaml: bool,

    /// Print JSON (the default).
    #[arg(long)]
    pub json: bool,
}

pub async fn run(provider: &NetlinkProvider, args: ShowArgs) -> anyhow::Result<()> {
    let mut filter = RetrieveFilter::default();
    if let Some(iface) = args.iface {
        filter = filter.iface(iface);
    }
    if args.no_routes {
        filter = filter.without_routes();
    }

    let state = netstate::retrieve_filtered(provider, &filter).await?;

    if args.yaml {
        print!("{}", serde_yaml::to_string(&state.to_value()?)?);
    } else {
        println!("{}", state.serialize_pretty()?);
    }
    Ok(())
}
