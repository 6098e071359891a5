//! End-to-end fill cycles against the simulated device.
//!
//! Each test builds a `Mesh` over `SimDevice`, scripts the device, runs one
//! or more fill cycles and checks the master cache.

use std::time::Duration;

use moca_cache::device::sim::Fault;
use moca_cache::device::{EventCounters, NodeInfo, TabooChannels, TxStatus};
use moca_cache::{Config, Disposition, MacAddr, Mesh, NodeId, NodeMask, Param, SelectionSet, SimDevice, Value};
use pretty_assertions::assert_eq;

const TIMEOUT: Duration = Duration::from_secs(5);

fn mesh(members: impl IntoIterator<Item = u8>) -> Mesh<SimDevice> {
    let members = NodeMask::from_nodes(members.into_iter().map(NodeId));
    Mesh::open_sim(Config::default().unpaced(), members).unwrap()
}

fn no_wait(_: Duration) {}

fn select(mesh: &Mesh<SimDevice>, text: &str) -> SelectionSet {
    mesh.parse_selection(text).unwrap()
}

// ============================================================================
// 1. Local value through node info
// ============================================================================

#[test]
fn test_local_node_value() {
    let mut mesh = mesh(0..8);
    mesh.device().set_node_info(
        NodeId(3),
        NodeInfo {
            mac: MacAddr([0, 1, 2, 3, 4, 5]),
            moca_version: 42,
            preferred_nc: 0,
            protocol_caps: NodeInfo::CAP_L2ME,
            admitted_seconds: 10,
        },
    );

    let sel = select(&mesh, "/node_moca_version-3");
    let report = mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(report.transactions, 0);
    assert_eq!(mesh.master().view(Param::NodeMocaVersion, NodeId(3), NodeId::ZERO), (Some(Value::UInt32(42)), Disposition::Fresh));
    assert_eq!(mesh.master().view(Param::NodeMocaVersion, NodeId(4), NodeId::ZERO), (None, Disposition::Unknown));
    assert_eq!(mesh.master().disposition(Param::NodeMacAddr, NodeId(3), NodeId::ZERO), Disposition::Unknown);
}

// ============================================================================
// 2. L2ME value after one timeout
// ============================================================================

#[test]
fn test_l2me_value_after_timeout() {
    let mut mesh = mesh(0..8);
    mesh.device().set_value(Param::NodeUptime, NodeId(3), NodeId::ZERO, Value::UInt32(7));
    mesh.device().push_fault(Fault::Reply(TxStatus::Timeout));

    let sel = select(&mesh, "/node_uptime-3");
    let report = mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(mesh.device().sends(), 2);
    assert_eq!(report.transactions, 2);
    assert_eq!(report.retries, 1);
    assert_eq!(report.failures, 0);
    assert!(report.complete());
    assert_eq!(mesh.master().view(Param::NodeUptime, NodeId(3), NodeId::ZERO), (Some(Value::UInt32(7)), Disposition::Fresh));
}

// ============================================================================
// 3. Node departure during the cycle
// ============================================================================

#[test]
fn test_departed_node_ends_nin() {
    let mut mesh = mesh(0..8);
    mesh.device().depart_after(NodeId(5), 1);

    let sel = select(&mesh, "/node_uptime-5/link_snr-1:5");
    let report = mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert!(!report.membership.contains(NodeId(5)));
    assert_eq!(mesh.master().view(Param::NodeUptime, NodeId(5), NodeId::ZERO), (None, Disposition::Nin));
    assert_eq!(mesh.master().view(Param::LinkSnr, NodeId(1), NodeId(5)), (None, Disposition::Nin));
    assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(4), NodeId::ZERO), Disposition::Unknown);
}

#[test]
fn test_departure_then_rejoin() {
    let mut mesh = mesh(0..6);
    let sel = select(&mesh, "/node_uptime-5/node_mac-5");
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(5), NodeId::ZERO), Disposition::Fresh);
    assert_eq!(mesh.master().disposition(Param::NodeMacAddr, NodeId(5), NodeId::ZERO), Disposition::Fresh);

    mesh.device().remove_node(NodeId(5));
    mesh.fill(&SelectionSet::empty(), TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(mesh.master().view(Param::NodeUptime, NodeId(5), NodeId::ZERO), (None, Disposition::Nin));
    assert_eq!(mesh.master().view(Param::NodeMacAddr, NodeId(5), NodeId::ZERO), (None, Disposition::Nin));

    mesh.device().add_node(NodeId(5));
    mesh.fill(&SelectionSet::empty(), TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(5), NodeId::ZERO), Disposition::Unknown);
}

// ============================================================================
// 4. Failure handling across a whole cycle
// ============================================================================

#[test]
fn test_mixed_faults_within_budget() {
    let mut mesh = mesh(0..4);
    mesh.device().push_fault(Fault::Transport);
    mesh.device().push_fault(Fault::Reply(TxStatus::Timeout));
    mesh.device().push_fault(Fault::Transport);

    let sel = select(&mesh, "/node_uptime/link_snr");
    let report = mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(report.failures, 2);
    assert_eq!(report.retries, 1);
    assert!(report.complete());
    for q in 0..4 {
        assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(q), NodeId::ZERO), Disposition::Fresh);
    }
    assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(9), NodeId::ZERO), Disposition::Nin);
}

#[test]
fn test_stale_values_survive_failed_cycle() {
    let mut mesh = mesh(0..4);
    let sel = select(&mesh, "/node_temperature-2");
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();
    let (before, _) = mesh.master().view(Param::NodeTemperature, NodeId(2), NodeId::ZERO);
    assert!(before.is_some());

    for _ in 0..Config::default().failure_budget {
        mesh.device().push_fault(Fault::Reply(TxStatus::Failed(5)));
    }
    let report = mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert!(report.budget_exhausted);
    assert_eq!(mesh.master().view(Param::NodeTemperature, NodeId(2), NodeId::ZERO), (before, Disposition::Stale));
}

// ============================================================================
// 5. Local counters and misc getters
// ============================================================================

#[test]
fn test_local_counters_and_missing_taboo() {
    let mut mesh = mesh(0..3);
    mesh.device().set_event_counters(EventCounters { link_up_events: 4, link_down_events: 1, admission_failures: 0, link_up_seconds: 3600 });
    mesh.device().set_taboo_channels(Some(TabooChannels { start_channel: 41, channel_mask: 0x0f }));

    let mut sel = select(&mesh, "/link_up_events/link_up_seconds");
    sel.union_with(&select(&mesh, "/taboo_start_channel"));
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    let (uptime, _) = mesh.master().view(Param::LinkUpSeconds, NodeId::ZERO, NodeId::ZERO);
    assert_eq!(uptime.and_then(|v| v.as_u32()), Some(3600));
    assert_eq!(mesh.master().view(Param::LinkUpEvents, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(4)), Disposition::Fresh));
    assert_eq!(mesh.master().view(Param::TabooStartChannel, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(41)), Disposition::Fresh));
    assert_eq!(mesh.master().disposition(Param::LinkDownEvents, NodeId::ZERO, NodeId::ZERO), Disposition::Unknown);

    mesh.device().set_taboo_channels(None);
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(mesh.master().view(Param::TabooStartChannel, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(41)), Disposition::Stale));
    assert_eq!(mesh.master().disposition(Param::LinkUpEvents, NodeId::ZERO, NodeId::ZERO), Disposition::Fresh);
}

#[test]
fn test_unstorable_password_leaves_slot_unknown() {
    let mut mesh = mesh(0..2);
    mesh.device().set_password(Some("x".repeat(300)));

    let sel = select(&mesh, "/password");
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(mesh.master().view(Param::Password, NodeId::ZERO, NodeId::ZERO), (None, Disposition::Unknown));
}
