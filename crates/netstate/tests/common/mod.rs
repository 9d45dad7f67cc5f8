//! Namespace fixture and helpers for real-kernel tests.

use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use netstate::apply::{ApplyOptions, ApplyResult, apply_document};
use netstate::provider::netlink::NetlinkProvider;
use netstate::{NetworkState, PlatformError, Result};

static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("netstate-test-{}-{}-{}", prefix, std::process::id(), id)
}

/// A network namespace deleted on drop.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);
        let status = Command::new("ip")
            .args(["netns", "add", &name])
            .status()
            .map_err(PlatformError::Io)?;
        if !status.success() {
            return Err(PlatformError::InvalidMessage(format!(
                "failed to create namespace: {}",
                name
            ))
            .into());
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> Result<NetlinkProvider> {
        Ok(NetlinkProvider::in_namespace(format!(
            "/var/run/netns/{}",
            self.name
        ))?)
    }

    pub async fn retrieve(&self) -> Result<NetworkState> {
        netstate::retrieve(&self.provider()?).await
    }

    pub async fn apply(&self, doc: &str) -> Result<ApplyResult> {
        apply_document(&self.provider()?, doc, ApplyOptions::default()).await
    }

    /// Run `ip` inside the namespace.
    pub fn ip(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("ip")
            .args(["-n", &self.name])
            .args(args)
            .output()
            .map_err(PlatformError::Io)?;
        if !output.status.success() {
            return Err(PlatformError::InvalidMessage(format!(
                "ip {:?}: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            ))
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test unless running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let a = unique_ns_name("test");
        let b = unique_ns_name("test");
        assert_ne!(a, b);
        assert!(a.starts_with("netstate-test-test-"));
    }
}
