//! Round trips through the L2ME path and the double-buffered refresh.
//!
//! The first tests drive the builder, the simulated device and the decoder
//! by hand; the rest go through `Mesh`.

use std::sync::Arc;
use std::time::Duration;

use moca_cache::device::{Device, Request, TxStatus};
use moca_cache::pool::{PoolCounters, SizeClass};
use moca_cache::l2me::{build_submit, decode_concatenated, install_response, Limits};
use moca_cache::{Cache, Config, Context, Disposition, Mesh, NodeId, NodeMask, Param, SelectionSet, SimDevice, Value};
use pretty_assertions::assert_eq;

const TIMEOUT: Duration = Duration::from_secs(5);

fn no_wait(_: Duration) {}

fn members(n: u8) -> NodeMask {
    NodeMask::from_nodes((0..n).map(NodeId))
}

// ============================================================================
// 1. Builder -> device -> decoder
// ============================================================================

#[test]
fn test_every_l2me_triple_round_trips() {
    let ctx = Context::new(Config::default()).unwrap();
    let members = members(5);
    let sim = SimDevice::new(&ctx, members);
    let mut cache = Cache::new(&ctx).unwrap();

    let mut wanted = ctx.presets().in_network(ctx.params(), members);
    wanted.intersect_with(&ctx.presets().l2me);
    let mut needed = wanted.clone();
    let limits = Limits::from(ctx.config());

    let mut transactions = 0;
    while !needed.is_empty() {
        let submit = build_submit(&ctx, &needed).unwrap();
        assert!(!submit.is_empty());
        assert!(submit.stats(&limits).fits(&limits));

        let reply = sim.send(&Request::get_queryables(&submit)).unwrap();
        assert_eq!(reply.status, TxStatus::Success);
        let responses = decode_concatenated(&reply.payload, &limits);
        let outcome = install_response(&ctx, &mut cache, None, &mut needed, &submit, &responses);
        assert_eq!(outcome.unretrievable, 0);
        assert_eq!(outcome.failed, 0);

        transactions += 1;
        assert!(transactions < 500, "drain does not converge");
    }

    for (p, q, r) in wanted.triples(&ctx) {
        assert_eq!(cache.view(p, q, r), (Some(sim.value(p, q, r)), Disposition::Fresh), "{p} ({q}, {r})");
    }
}

#[test]
fn test_full_fill_of_everything_in_network() {
    let members = members(4);
    let mut mesh = Mesh::open_sim(Config::default().unpaced(), members).unwrap();
    let all = mesh.context().presets().in_network(mesh.context().params(), members);

    let report = mesh.fill(&all, TIMEOUT, &mut no_wait).unwrap();

    assert!(report.complete());
    assert_eq!(report.failures, 0);
    assert_eq!(report.membership, members);
    for (p, q, r) in all.triples(mesh.context()) {
        assert_eq!(mesh.master().disposition(p, q, r), Disposition::Fresh, "{p} ({q}, {r})");
    }
    assert_eq!(
        mesh.master().view(Param::LinkRxUnicastProfile, NodeId(1), NodeId(3)),
        (Some(mesh.device().value(Param::LinkRxUnicastProfile, NodeId(1), NodeId(3))), Disposition::Fresh)
    );
}

// ============================================================================
// 2. Copies and refresh
// ============================================================================

#[test]
fn test_copy_is_independent_of_master() {
    let mut mesh = Mesh::open_sim(Config::default().unpaced(), members(3)).unwrap();
    let sel = mesh.parse_selection("/node_uptime-1").unwrap();
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();
    let snapshot = mesh.new_cache().unwrap();

    mesh.device().set_value(Param::NodeUptime, NodeId(1), NodeId::ZERO, Value::UInt32(99));
    mesh.fill(&sel, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(mesh.master().view(Param::NodeUptime, NodeId(1), NodeId::ZERO), (Some(Value::UInt32(99)), Disposition::Fresh));
    let (old, disposition) = snapshot.view(Param::NodeUptime, NodeId(1), NodeId::ZERO);
    assert_eq!(disposition, Disposition::Fresh);
    assert_ne!(old, Some(Value::UInt32(99)));
}

#[test]
fn test_refresh_swaps_master() {
    let mut mesh = Mesh::open_sim(Config::default().unpaced(), members(3)).unwrap();
    let nc = mesh.parse_selection("/nc_node").unwrap();
    mesh.refresh(&nc, TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(mesh.master().view(Param::NcNode, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(0)), Disposition::Fresh));

    let uptime = mesh.parse_selection("/node_uptime-2").unwrap();
    let report = mesh.refresh(&uptime, TIMEOUT, &mut no_wait).unwrap();

    assert_eq!(report.transactions, 1);
    assert_eq!(mesh.master().disposition(Param::NodeUptime, NodeId(2), NodeId::ZERO), Disposition::Fresh);
    assert_eq!(mesh.master().view(Param::NcNode, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(0)), Disposition::Stale));
}

#[test]
fn test_release_returns_pool_blocks() {
    let counters = Arc::new(PoolCounters::new());
    let ctx = Context::new(Config::default().unpaced()).unwrap().with_stats(counters.clone());
    let sim = SimDevice::new(&ctx, members(3));
    let mut cache = Cache::new(&ctx).unwrap();
    let sel = SelectionSet::parse(&ctx, "/node_map_profile/node_uptime").unwrap();

    moca_cache::fill_cache(&ctx, &sim, &mut cache, &sel, TIMEOUT, &mut no_wait).unwrap();
    assert_eq!(counters.snapshot(SizeClass::Block).in_use(), 3);
    assert_eq!(counters.snapshot(SizeClass::Word).in_use(), 3);

    let copy = {
        let mut copy = Cache::new(&ctx).unwrap();
        copy.copy_from(&cache);
        copy
    };
    cache.release();
    assert_eq!(counters.snapshot(SizeClass::Block).in_use(), 3);
    drop(copy);
    for class in SizeClass::ALL {
        assert_eq!(counters.snapshot(class).in_use(), 0);
    }
    assert_eq!(cache.count(Disposition::Fresh), 0);
}
