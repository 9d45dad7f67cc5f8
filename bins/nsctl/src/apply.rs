//! Apply and plan commands.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use netstate::NetworkState;
use netstate::apply::ApplyOptions;
use netstate::provider::netlink::NetlinkProvider;

#[derive(Args)]
pub struct ApplyArgs {
    /// Desired-state document (JSON or YAML), or `-` for stdin.
    pub file: PathBuf,

    /// Compute and print the plan without executing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not re-read the state after applying.
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Desired-state document (JSON or YAML), or `-` for stdin.
    pub file: PathBuf,
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    let mut text = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    to_json(text)
}

/// YAML documents are converted to JSON; JSON passes through untouched so
/// that syntax errors are reported by the JSON parser.
fn to_json(text: String) -> anyhow::Result<String> {
    if text.trim_start().starts_with('{') {
        return Ok(text);
    }
    let value: serde_json::Value =
        serde_yaml::from_str(&text).context("document is neither JSON nor YAML")?;
    Ok(serde_json::to_string(&value)?)
}

pub async fn run(provider: &NetlinkProvider, args: ApplyArgs) -> anyhow::Result<()> {
    let document = read_document(&args.file)?;
    let options = ApplyOptions {
        dry_run: args.dry_run,
        skip_verification: args.no_verify,
    };

    let result = netstate::apply::apply_document(provider, &document, options).await?;
    for line in &result.summary {
        println!("{}", line);
    }
    if !result.changes_made && !args.dry_run {
        eprintln!("already converged");
    }
    Ok(())
}

pub async fn plan(provider: &NetlinkProvider, args: PlanArgs) -> anyhow::Result<()> {
    let desired = NetworkState::parse(&read_document(&args.file)?)?;
    let plan = netstate::apply::plan(provider, &desired).await?;
    if plan.is_empty() {
        eprintln!("nothing to do");
    }
    for (i, op) in plan.operations.iter().enumerate() {
        println!("{:>3}. {}", i + 1, op);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_document() {
        let yaml = "ifaces:\n  - name: veth1\n    type: veth\n    veth:\n      peer: veth1.ep\n";
        let state = NetworkState::parse(&to_json(yaml.into()).unwrap()).unwrap();
        assert_eq!(state.ifaces[0].name, "veth1");
    }

    #[test]
    fn test_json_passes_through() {
        assert_eq!(to_json("{".into()).unwrap(), "{");
        assert_eq!(to_json("  {}".into()).unwrap(), "  {}");
    }
}
