//! Retrieval from a real namespace.

use netstate::{
    Family, InterfaceState, InterfaceType, LinkConfig, MAIN_TABLE, MacvlanConfig, MacvlanMode,
    NetworkState, Result, RetrieveFilter, RouteRule,
};

use crate::common::TestNamespace;

#[tokio::test]
async fn test_fresh_namespace_has_only_loopback() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("fresh")?;
    let state = ns.retrieve().await?;

    assert_eq!(state.ifaces.len(), 1);
    let lo = state.iface("lo").unwrap();
    assert_eq!(lo.iface_type(), Some(InterfaceType::Loopback));
    assert_eq!(lo.state, Some(InterfaceState::Down));
    assert!(
        !state
            .ifaces
            .iter()
            .any(|i| i.iface_type() == Some(InterfaceType::Veth))
    );
    Ok(())
}

#[tokio::test]
async fn test_snapshot_round_trips() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("roundtrip")?;
    ns.ip(&["link", "add", "veth0", "type", "veth", "peer", "name", "veth0.ep"])?;
    ns.ip(&["link", "add", "br0", "type", "bridge"])?;
    ns.ip(&["link", "set", "veth0.ep", "master", "br0"])?;
    ns.ip(&["link", "set", "veth0", "up"])?;
    ns.ip(&["addr", "add", "192.0.2.1/24", "dev", "veth0"])?;

    let state = ns.retrieve().await?;
    assert_eq!(NetworkState::parse(&state.serialize()?)?, state);

    let br0 = state.iface("br0").unwrap();
    assert_eq!(
        br0.link.as_ref().and_then(|l| l.ports()),
        Some(&["veth0.ep".to_string()][..])
    );
    // Kernel prefix route of the address.
    assert!(state.routes_of("veth0").any(|r| r.dst.to_string() == "192.0.2.0/24"));
    Ok(())
}

#[tokio::test]
async fn test_filtered_retrieve() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("filter")?;
    ns.ip(&["link", "add", "dummy0", "type", "dummy"])?;

    let provider = ns.provider()?;
    let filter = RetrieveFilter::default().iface("dummy0").without_routes();
    let state = netstate::retrieve_filtered(&provider, &filter).await?;
    assert_eq!(state.ifaces.len(), 1);
    assert_eq!(state.ifaces[0].iface_type(), Some(InterfaceType::Dummy));

    let missing = RetrieveFilter::default().iface("nope0");
    let err = netstate::retrieve_filtered(&provider, &missing)
        .await
        .unwrap_err();
    assert!(err.platform_error().unwrap().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_default_route_rules() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("rules")?;
    let state = ns.retrieve().await?;
    for family in [Family::Ipv4, Family::Ipv6] {
        let main = RouteRule::lookup(family, 32766, MAIN_TABLE);
        assert!(state.route_rules.contains(&main), "{:?}", state.route_rules);
    }
    assert_eq!(NetworkState::parse(&state.serialize()?)?, state);
    Ok(())
}

#[tokio::test]
async fn test_macvlan_and_vxlan() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("stacked")?;
    ns.ip(&["link", "add", "dummy0", "type", "dummy"])?;
    ns.ip(&["link", "add", "mv0", "link", "dummy0", "type", "macvlan", "mode", "bridge"])?;
    ns.ip(&[
        "link", "add", "vx0", "type", "vxlan", "id", "42", "remote", "192.0.2.9", "dev", "dummy0",
        "dstport", "4789",
    ])?;

    let state = ns.retrieve().await?;
    assert_eq!(
        state.iface("mv0").unwrap().link,
        Some(LinkConfig::Macvlan(MacvlanConfig {
            base_iface: Some("dummy0".into()),
            mode: Some(MacvlanMode::Bridge),
        }))
    );
    match state.iface("vx0").unwrap().link.as_ref() {
        Some(LinkConfig::Vxlan(vxlan)) => {
            assert_eq!(vxlan.vni, Some(42));
            assert_eq!(vxlan.remote, Some("192.0.2.9".parse().unwrap()));
            assert_eq!(vxlan.base_iface.as_deref(), Some("dummy0"));
            assert_eq!(vxlan.dst_port, Some(4789));
        }
        other => panic!("unexpected link {:?}", other),
    }
    assert_eq!(NetworkState::parse(&state.serialize()?)?, state);

    // Both go with their lower device.
    let result = ns
        .apply(r#"{"ifaces": [{"name": "dummy0", "state": "absent"}]}"#)
        .await?;
    assert!(result.changes_made);
    let state = ns.retrieve().await?;
    assert!(state.iface("mv0").is_none());
    assert!(state.iface("vx0").is_none());
    Ok(())
}
