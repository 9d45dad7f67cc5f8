//! Behavioural guarantees of retrieve and apply.

use netstate::{ErrorKind, InterfaceState, InterfaceType, NetworkState};

use crate::{VETH_DOC, apply, host, snapshot};

const LAB_DOC: &str = r#"{
    "ifaces": [
        {"name": "br0", "type": "bridge", "bridge": {"ports": ["eth1"]}},
        {"name": "eth0", "state": "up", "mtu": 9000,
         "ipv4": {"addresses": [{"address": "192.0.2.10", "prefix_len": 24}]}},
        {"name": "eth0.100", "type": "vlan", "vlan": {"base_iface": "eth0", "vlan_id": 100}},
        {"name": "bond0", "type": "bond", "bond": {"mode": "active-backup"}},
        {"name": "veth1", "type": "veth", "veth": {"peer": "veth1.ep"}},
        {"name": "veth1.ep", "type": "veth", "mtu": 1400}
    ],
    "routes": [
        {"dst": "198.51.100.0/24", "oif": "eth0", "via": "192.0.2.1"}
    ]
}"#;

#[tokio::test]
async fn test_retrieved_state_round_trips() {
    let provider = host();
    apply(&provider, LAB_DOC).await.unwrap();

    let state = snapshot(&provider).await;
    let text = state.serialize().unwrap();
    assert_eq!(NetworkState::parse(&text).unwrap(), state);

    let pretty = state.serialize_pretty().unwrap();
    assert_eq!(NetworkState::parse(&pretty).unwrap(), state);
}

#[tokio::test]
async fn test_second_apply_is_a_noop() {
    let provider = host();

    let first = apply(&provider, LAB_DOC).await.unwrap();
    assert!(first.changes_made);
    let after_first = snapshot(&provider).await;
    let mutations = provider.mutation_count();

    let second = apply(&provider, LAB_DOC).await.unwrap();
    assert!(!second.changes_made);
    assert!(second.summary.is_empty());
    assert_eq!(provider.mutation_count(), mutations);
    assert_eq!(snapshot(&provider).await, after_first);
}

#[tokio::test]
async fn test_lab_document_converges() {
    let provider = host();
    apply(&provider, LAB_DOC).await.unwrap();
    let state = snapshot(&provider).await;

    let eth0 = state.iface("eth0").unwrap();
    assert_eq!(eth0.mtu, Some(9000));
    assert_eq!(eth0.state, Some(InterfaceState::Up));

    let vlan = state.iface("eth0.100").unwrap();
    assert_eq!(vlan.iface_type(), Some(InterfaceType::Vlan));
    assert_eq!(vlan.state, Some(InterfaceState::Up));

    let eth1 = state.iface("eth1").unwrap();
    assert_eq!(eth1.controller.as_deref(), Some("br0"));

    let br0 = state.iface("br0").unwrap();
    assert_eq!(br0.link.as_ref().unwrap().ports(), Some(&["eth1".to_string()][..]));

    let routes: Vec<_> = state.routes_of("eth0").collect();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].dst.to_string(), "198.51.100.0/24");
}

#[tokio::test]
async fn test_partial_update_changes_only_named_fields() {
    let provider = host();
    apply(
        &provider,
        r#"{"ifaces": [{"name": "eth0", "state": "up", "mac_address": "02:aa:bb:cc:dd:ee",
            "ipv4": {"addresses": [{"address": "192.0.2.1", "prefix_len": 24}]}}]}"#,
    )
    .await
    .unwrap();
    let before = snapshot(&provider).await;

    let result = apply(&provider, r#"{"ifaces": [{"name": "eth0", "mtu": 1400}]}"#)
        .await
        .unwrap();
    assert_eq!(result.summary, vec!["modify eth0: set mtu 1400"]);

    let after = snapshot(&provider).await;
    let mut expected = before.iface("eth0").unwrap().clone();
    expected.mtu = Some(1400);
    assert_eq!(after.iface("eth0").unwrap(), &expected);
    assert_eq!(after.iface("eth1"), before.iface("eth1"));
    assert_eq!(after.routes, before.routes);
}

#[tokio::test]
async fn test_absent_missing_interface_is_a_noop() {
    let provider = host();
    let result = apply(&provider, r#"{"ifaces": [{"name": "X", "state": "absent"}]}"#)
        .await
        .unwrap();
    assert!(!result.changes_made);
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn test_absent_entry_extra_fields_are_ignored() {
    let provider = host();
    apply(&provider, r#"{"ifaces": [{"name": "dummy0", "type": "dummy"}]}"#)
        .await
        .unwrap();

    apply(
        &provider,
        r#"{"ifaces": [{"name": "dummy0", "type": "nonsense", "state": "absent", "mtu": 0}]}"#,
    )
    .await
    .unwrap();
    assert!(!provider.names().contains(&"dummy0".to_string()));
}

#[tokio::test]
async fn test_veth_pairing() {
    let provider = host();
    apply(&provider, VETH_DOC).await.unwrap();

    let state = snapshot(&provider).await;
    let veth1 = state.iface("veth1").unwrap();
    let peer = state.iface("veth1.ep").unwrap();
    assert_eq!(veth1.link.as_ref().unwrap().veth_peer(), Some("veth1.ep"));
    assert_eq!(peer.link.as_ref().unwrap().veth_peer(), Some("veth1"));

    apply(&provider, r#"{"ifaces": [{"name": "veth1", "state": "absent"}]}"#)
        .await
        .unwrap();
    let state = snapshot(&provider).await;
    assert!(state.iface("veth1").is_none());
    assert!(state.iface("veth1.ep").is_none());
}

#[tokio::test]
async fn test_deleting_both_veth_ends_is_one_operation() {
    let provider = host();
    apply(&provider, VETH_DOC).await.unwrap();
    let mutations = provider.mutation_count();

    let result = apply(
        &provider,
        r#"{"ifaces": [
            {"name": "veth1", "state": "absent"},
            {"name": "veth1.ep", "state": "absent"}
        ]}"#,
    )
    .await
    .unwrap();
    assert_eq!(result.summary, vec!["delete veth1 (and its peer veth1.ep)"]);
    assert_eq!(provider.mutation_count(), mutations + 1);
}

#[tokio::test]
async fn test_malformed_input_never_mutates() {
    let provider = host();
    let before = snapshot(&provider).await;

    for doc in [
        "{",
        "[]",
        r#"{"ifaces": [{"name": "dummy0", "type": "dummy"}, {"name": "dummy0"}]}"#,
        r#"{"ifaces": [{"name": "v1", "type": "vlan", "vlan": {"base_iface": "eth0", "vlan_id": 5000}}]}"#,
        r#"{"ifaces": [{"name": "eth0", "type": "dummy"}]}"#,
        r#"{"ifaces": [{"name": "dummy0", "type": "dummy", "controller": "eth1"}]}"#,
    ] {
        let err = apply(&provider, doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError, "{}", doc);
    }

    assert_eq!(provider.mutation_count(), 0);
    assert_eq!(snapshot(&provider).await, before);
}

#[tokio::test]
async fn test_veth_scenario() {
    let provider = host();

    let before = snapshot(&provider).await;
    assert!(
        !before
            .ifaces
            .iter()
            .any(|i| i.iface_type() == Some(InterfaceType::Veth))
    );

    apply(&provider, VETH_DOC).await.unwrap();

    let after = snapshot(&provider).await;
    let new: Vec<_> = after
        .ifaces
        .iter()
        .filter(|i| before.iface(&i.name).is_none())
        .collect();
    let names: Vec<_> = new.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["veth1", "veth1.ep"]);
    assert!(new.iter().all(|i| i.iface_type() == Some(InterfaceType::Veth)));
}
