//! Plan execution: failures, dry runs and post-apply verification.

use std::sync::atomic::{AtomicUsize, Ordering};

use netstate::apply::{ApplyOptions, apply_document, plan};
use netstate::netlink::Result;
use netstate::netlink::types::rt_proto;
use netstate::provider::memory::{MemoryOp, MemoryProvider};
use netstate::provider::{
    ARPHRD_ETHER, CreateSpec, InterfaceDelta, KernelProvider, LinkDetail, LinkSummary, RouteDetail,
};
use netstate::{
    Error, ErrorKind, InterfaceState, LinkConfig, MAIN_TABLE, NetworkState, RouteRule, VethConfig,
};

use crate::{VETH_DOC, apply, host, snapshot};

/// Accepts MTU changes without performing them.
struct MtuBlackhole(MemoryProvider);

impl KernelProvider for MtuBlackhole {
    async fn list_interfaces(&self) -> Result<Vec<LinkSummary>> {
        self.0.list_interfaces().await
    }

    async fn get_interface_detail(&self, name: &str) -> Result<LinkDetail> {
        self.0.get_interface_detail(name).await
    }

    async fn create_interface(&self, spec: &CreateSpec) -> Result<()> {
        self.0.create_interface(spec).await
    }

    async fn modify_interface(&self, name: &str, delta: &InterfaceDelta) -> Result<()> {
        let delta = InterfaceDelta {
            mtu: None,
            ..delta.clone()
        };
        self.0.modify_interface(name, &delta).await
    }

    async fn delete_interface(&self, name: &str) -> Result<()> {
        self.0.delete_interface(name).await
    }

    async fn list_route_rules(&self) -> Result<Vec<RouteRule>> {
        self.0.list_route_rules().await
    }
}

/// Loses `eth1` right after listing it, as if another actor deleted it.
/// Counts single and batched detail requests.
struct RacingDelete {
    inner: MemoryProvider,
    single: AtomicUsize,
    batched: AtomicUsize,
}

impl RacingDelete {
    fn new(inner: MemoryProvider) -> Self {
        Self {
            inner,
            single: AtomicUsize::new(0),
            batched: AtomicUsize::new(0),
        }
    }
}

impl KernelProvider for RacingDelete {
    async fn list_interfaces(&self) -> Result<Vec<LinkSummary>> {
        let links = self.inner.list_interfaces().await?;
        self.inner.remove_externally("eth1");
        Ok(links)
    }

    async fn get_interface_detail(&self, name: &str) -> Result<LinkDetail> {
        self.single.fetch_add(1, Ordering::Relaxed);
        self.inner.get_interface_detail(name).await
    }

    async fn get_interface_details(
        &self,
        links: &[LinkSummary],
    ) -> Result<Vec<Result<LinkDetail>>> {
        self.batched.fetch_add(1, Ordering::Relaxed);
        let mut details = Vec::new();
        for link in links {
            details.push(self.inner.get_interface_detail(&link.name).await);
        }
        Ok(details)
    }

    async fn create_interface(&self, spec: &CreateSpec) -> Result<()> {
        self.inner.create_interface(spec).await
    }

    async fn modify_interface(&self, name: &str, delta: &InterfaceDelta) -> Result<()> {
        self.inner.modify_interface(name, delta).await
    }

    async fn delete_interface(&self, name: &str) -> Result<()> {
        self.inner.delete_interface(name).await
    }

    async fn list_route_rules(&self) -> Result<Vec<RouteRule>> {
        self.inner.list_route_rules().await
    }
}

#[tokio::test]
async fn test_failed_step_stops_the_plan() {
    let provider = host();
    provider.fail_on(MemoryOp::Create, "dummy1", libc::EPERM);

    let err = apply(
        &provider,
        r#"{"ifaces": [
            {"name": "dummy0", "type": "dummy"},
            {"name": "dummy1", "type": "dummy"}
        ]}"#,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PlatformError);
    match &err {
        Error::Apply {
            index,
            total,
            operation,
            source,
        } => {
            assert_eq!((*index, *total), (2, 4));
            assert_eq!(operation, "create dummy dummy1");
            assert!(source.is_permission_denied());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // No rollback: the first step stays applied, nothing after the failure ran.
    let state = snapshot(&provider).await;
    let dummy0 = state.iface("dummy0").unwrap();
    assert_eq!(dummy0.state, Some(InterfaceState::Down));
    assert!(state.iface("dummy1").is_none());
    assert_eq!(provider.mutation_count(), 2);
}

#[tokio::test]
async fn test_delete_of_vanished_interface_is_a_noop() {
    let provider = host();
    apply(&provider, r#"{"ifaces": [{"name": "dummy0", "type": "dummy"}]}"#)
        .await
        .unwrap();
    provider.fail_on(MemoryOp::Delete, "dummy0", libc::ENODEV);

    let result = apply_document(
        &provider,
        r#"{"ifaces": [{"name": "dummy0", "state": "absent"}]}"#,
        ApplyOptions {
            skip_verification: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(result.changes_made);
}

#[tokio::test]
async fn test_busy_delete_fails() {
    let provider = host();
    apply(&provider, r#"{"ifaces": [{"name": "dummy0", "type": "dummy"}]}"#)
        .await
        .unwrap();
    provider.fail_on(MemoryOp::Delete, "dummy0", libc::EBUSY);

    let err = apply(&provider, r#"{"ifaces": [{"name": "dummy0", "state": "absent"}]}"#)
        .await
        .unwrap_err();
    assert!(err.platform_error().unwrap().is_busy());
    assert!(err.to_string().starts_with("step 1/1 (delete dummy0) failed"));
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let provider = host();
    let before = snapshot(&provider).await;

    let result = apply_document(
        &provider,
        VETH_DOC,
        ApplyOptions {
            dry_run: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(!result.changes_made);
    assert_eq!(
        result.summary,
        vec![
            "create veth veth1 (peer veth1.ep)",
            "modify veth1: set state up",
            "modify veth1.ep: set state up",
        ]
    );
    assert_eq!(result.verified, NetworkState::default());
    assert_eq!(provider.mutation_count(), 0);
    assert_eq!(snapshot(&provider).await, before);
}

#[tokio::test]
async fn test_plan_preview() {
    let provider = host();
    let desired = NetworkState::parse(r#"{"ifaces": [{"name": "eth1", "mtu": 9000}]}"#).unwrap();

    let preview = plan(&provider, &desired).await.unwrap();
    assert_eq!(preview.summary(), vec!["modify eth1: set mtu 9000"]);
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn test_verified_state_covers_touched_interfaces() {
    let provider = host();
    let result = apply(&provider, VETH_DOC).await.unwrap();

    let names: Vec<_> = result.verified.ifaces.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["veth1", "veth1.ep"]);
    assert!(
        result
            .verified
            .ifaces
            .iter()
            .all(|i| i.state == Some(InterfaceState::Up))
    );
}

#[tokio::test]
async fn test_unconverged_state_is_a_verification_error() {
    let provider = MtuBlackhole(host());

    let err = apply_document(
        &provider,
        r#"{"ifaces": [{"name": "eth0", "mtu": 9000}]}"#,
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationError);
    assert_eq!(err.to_string(), "eth0: mtu is 1500, expected 9000");

    let result = apply_document(
        &provider,
        r#"{"ifaces": [{"name": "eth0", "mtu": 9000}]}"#,
        ApplyOptions {
            skip_verification: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(result.changes_made);
    assert_eq!(result.verified.iface("eth0").unwrap().mtu, Some(1500));
}

#[tokio::test]
async fn test_interface_vanishing_during_retrieve_is_skipped() {
    let provider = RacingDelete::new(host());

    let state = netstate::retrieve(&provider).await.unwrap();
    assert!(state.iface("eth1").is_none());
    assert!(state.iface("eth0").is_some());
    assert!(state.iface("lo").is_some());
}

#[tokio::test]
async fn test_retrieve_fetches_details_in_one_batch() {
    let provider = RacingDelete::new(host());
    netstate::retrieve(&provider).await.unwrap();
    assert_eq!(provider.batched.load(Ordering::Relaxed), 1);
    assert_eq!(provider.single.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_kernel_route_can_be_removed() {
    let provider = host();
    provider
        .add_route(
            "eth0",
            RouteDetail {
                dst: "192.0.2.0".parse().unwrap(),
                prefix_len: 24,
                gateway: None,
                metric: 0,
                table: MAIN_TABLE,
                protocol: rt_proto::KERNEL,
            },
        )
        .unwrap();
    assert_eq!(snapshot(&provider).await.routes.len(), 1);

    let result = apply(
        &provider,
        r#"{"routes": [{"dst": "192.0.2.0/24", "oif": "eth0", "state": "absent"}]}"#,
    )
    .await
    .unwrap();
    assert_eq!(
        result.summary,
        vec!["modify eth0: remove route 192.0.2.0/24 dev eth0 metric 0"]
    );
    assert!(snapshot(&provider).await.routes.is_empty());
}

#[tokio::test]
async fn test_vlan_mtu_raised_after_its_base() {
    let provider = host();
    apply(
        &provider,
        r#"{"ifaces": [
            {"name": "zbase", "type": "dummy"},
            {"name": "b.10", "type": "vlan", "vlan": {"base_iface": "zbase", "vlan_id": 10}}
        ]}"#,
    )
    .await
    .unwrap();

    let result = apply(
        &provider,
        r#"{"ifaces":[{"name":"b.10","mtu":9000},{"name":"zbase","mtu":9000}]}"#,
    )
    .await
    .unwrap();
    assert_eq!(
        result.summary,
        vec!["modify zbase: set mtu 9000", "modify b.10: set mtu 9000"]
    );

    let state = snapshot(&provider).await;
    assert_eq!(state.iface("zbase").unwrap().mtu, Some(9000));
    assert_eq!(state.iface("b.10").unwrap().mtu, Some(9000));
}

#[tokio::test]
async fn test_veth_with_peer_in_another_namespace() {
    let provider = host();
    // eth0 is ifindex 2 here; the peer is ifindex 2 of namespace 0.
    provider.add_link(LinkDetail {
        name: "veth0".into(),
        kind: Some("veth".into()),
        hw_type: ARPHRD_ETHER,
        mtu: Some(1500),
        mac: Some(vec![0x02, 0, 0, 0, 0, 0x99]),
        link: Some(2),
        link_netnsid: Some(0),
        ..Default::default()
    });

    let state = snapshot(&provider).await;
    assert_eq!(
        state.iface("veth0").unwrap().link,
        Some(LinkConfig::Veth(VethConfig {
            peer: Some("2".into()),
            peer_netnsid: Some(0),
        }))
    );
    let text = state.serialize().unwrap();
    assert_eq!(NetworkState::parse(&text).unwrap(), state);
    assert!(!apply(&provider, &text).await.unwrap().changes_made);

    let result = apply(&provider, r#"{"ifaces": [{"name": "veth0", "state": "absent"}]}"#)
        .await
        .unwrap();
    assert_eq!(result.summary, vec!["delete veth0"]);
    assert_eq!(provider.names(), vec!["eth0", "eth1", "lo"]);
}
