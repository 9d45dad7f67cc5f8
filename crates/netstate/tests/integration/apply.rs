//! Apply against a real namespace.

use netstate::{ErrorKind, InterfaceState, InterfaceType, LinkConfig, Result, VethConfig};

use crate::common::TestNamespace;

const VETH_DOC: &str = r#"{
    "ifaces": [
        {"name": "veth1", "type": "veth", "veth": {"peer": "veth1.ep"}},
        {"name": "veth1.ep", "type": "veth"}
    ]
}"#;

#[tokio::test]
async fn test_veth_scenario() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("veth")?;
    let before = ns.retrieve().await?;

    let result = ns.apply(VETH_DOC).await?;
    assert!(result.changes_made);

    let after = ns.retrieve().await?;
    let new: Vec<_> = after
        .ifaces
        .iter()
        .filter(|i| before.iface(&i.name).is_none())
        .map(|i| (i.name.as_str(), i.iface_type()))
        .collect();
    assert_eq!(
        new,
        vec![
            ("veth1", Some(InterfaceType::Veth)),
            ("veth1.ep", Some(InterfaceType::Veth)),
        ]
    );
    assert_eq!(
        after.iface("veth1").unwrap().link.as_ref().unwrap().veth_peer(),
        Some("veth1.ep")
    );

    let again = ns.apply(VETH_DOC).await?;
    assert!(!again.changes_made);

    ns.apply(r#"{"ifaces": [{"name": "veth1", "state": "absent"}]}"#)
        .await?;
    let gone = ns.retrieve().await?;
    assert!(gone.iface("veth1").is_none());
    assert!(gone.iface("veth1.ep").is_none());
    Ok(())
}

#[tokio::test]
async fn test_bridge_vlan_addresses_and_routes() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("lab")?;
    let doc = r#"{
        "ifaces": [
            {"name": "br0", "type": "bridge"},
            {"name": "dummy0", "type": "dummy", "controller": "br0"},
            {"name": "dummy1", "type": "dummy", "mac_address": "02:00:00:00:10:01",
             "ipv4": {"addresses": [{"address": "198.51.100.1", "prefix_len": 24}]},
             "ipv6": {"addresses": [{"address": "2001:db8::1", "prefix_len": 64}]}},
            {"name": "dummy1.7", "type": "vlan", "vlan": {"base_iface": "dummy1", "vlan_id": 7}}
        ],
        "routes": [
            {"dst": "203.0.113.0/24", "oif": "dummy1", "via": "198.51.100.254", "metric": 50}
        ]
    }"#;

    ns.apply(doc).await?;
    let state = ns.retrieve().await?;

    assert_eq!(state.iface("dummy0").unwrap().controller.as_deref(), Some("br0"));
    let dummy1 = state.iface("dummy1").unwrap();
    assert_eq!(dummy1.state, Some(InterfaceState::Up));
    assert_eq!(
        dummy1.mac_address.as_ref().unwrap().to_string(),
        "02:00:00:00:10:01"
    );
    assert!(
        state
            .routes_of("dummy1")
            .any(|r| r.dst.to_string() == "203.0.113.0/24" && r.metric == Some(50))
    );
    assert_eq!(
        state.iface("dummy1.7").unwrap().iface_type(),
        Some(InterfaceType::Vlan)
    );

    assert!(!ns.apply(doc).await?.changes_made);

    // Detach and drop the route.
    ns.apply(
        r#"{
            "ifaces": [{"name": "dummy0", "controller": ""}],
            "routes": [{"dst": "203.0.113.0/24", "oif": "dummy1", "state": "absent"}]
        }"#,
    )
    .await?;
    let state = ns.retrieve().await?;
    assert_eq!(state.iface("dummy0").unwrap().controller, None);
    assert!(!state.routes_of("dummy1").any(|r| r.dst.to_string() == "203.0.113.0/24"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_document_leaves_namespace_alone() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("malformed")?;
    let before = ns.retrieve().await?;

    let err = ns.apply("{").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    assert_eq!(ns.retrieve().await?, before);
    Ok(())
}

#[tokio::test]
async fn test_kernel_prefix_route_can_be_removed() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("kroute")?;
    ns.apply(
        r#"{"ifaces": [{"name": "dummy0", "type": "dummy",
            "ipv4": {"addresses": [{"address": "192.0.2.1", "prefix_len": 24}]}}]}"#,
    )
    .await?;
    let state = ns.retrieve().await?;
    assert!(state.routes_of("dummy0").any(|r| r.dst.to_string() == "192.0.2.0/24"));

    ns.apply(r#"{"routes": [{"dst": "192.0.2.0/24", "oif": "dummy0", "state": "absent"}]}"#)
        .await?;
    let state = ns.retrieve().await?;
    assert!(!state.routes_of("dummy0").any(|r| r.dst.to_string() == "192.0.2.0/24"));
    Ok(())
}

#[tokio::test]
async fn test_vlan_mtu_raised_with_its_base() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("vlanmtu")?;
    ns.apply(
        r#"{"ifaces": [
            {"name": "zbase", "type": "dummy"},
            {"name": "b.10", "type": "vlan", "vlan": {"base_iface": "zbase", "vlan_id": 10}}
        ]}"#,
    )
    .await?;

    let result = ns
        .apply(r#"{"ifaces":[{"name":"b.10","mtu":9000},{"name":"zbase","mtu":9000}]}"#)
        .await?;
    assert_eq!(
        result.summary,
        vec!["modify zbase: set mtu 9000", "modify b.10: set mtu 9000"]
    );
    assert_eq!(ns.retrieve().await?.iface("b.10").unwrap().mtu, Some(9000));
    Ok(())
}

#[tokio::test]
async fn test_veth_with_peer_in_another_namespace() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("near")?;
    let other = TestNamespace::new("far")?;
    ns.ip(&[
        "link", "add", "veth0", "type", "veth", "peer", "name", "vfar", "netns", other.name(),
    ])?;

    let state = ns.retrieve().await?;
    let link = state.iface("veth0").unwrap().link.clone().unwrap();
    match &link {
        LinkConfig::Veth(VethConfig {
            peer: Some(peer),
            peer_netnsid: Some(_),
        }) => assert!(peer.parse::<u32>().is_ok(), "{}", peer),
        unexpected => panic!("unexpected link {:?}", unexpected),
    }
    assert!(state.iface("vfar").is_none());

    let result = ns
        .apply(r#"{"ifaces": [{"name": "veth0", "state": "absent"}]}"#)
        .await?;
    assert_eq!(result.summary, vec!["delete veth0"]);
    assert!(other.retrieve().await?.iface("vfar").is_none());
    Ok(())
}
