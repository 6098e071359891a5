//! In-memory simulated network.
//!
//! Answers every getter from its own state and echoes L2ME queries with
//! stored values, or with deterministic synthesized ones for triples
//! nobody set. Faults can be queued ahead of transactions and nodes can be
//! scheduled to leave after a number of transactions, which is how the
//! collector's retry, budget and reconcile paths are tested.
//!
//! Clones share state, so a test can keep a handle after moving the
//! device into a `Mesh`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::context::Context;
use crate::l2me::{encode_concatenated, Limits, NodeResponses, Submit, SubmitMap};
use crate::model::{MacAddr, NodeId, NodeMask, Profile, Value, ValueType};
use crate::param::{Param, ParamTable};
use crate::{Error, Result};

use super::{
    Device, EventCounters, FullMeshRates, LinkRate, LinkRateStatus, NetworkInfo, NodeInfo, Reply, Request,
    TabooChannels, TxStatus,
};

/// A scripted transaction outcome, consumed by the next `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Deliver a reply with this status and no payload.
    Reply(TxStatus),
    /// Fail at the transport level.
    Transport,
}

/// Single-shot local values. `None` makes the getter unsupported.
#[derive(Debug, Clone)]
struct Misc {
    password: Option<String>,
    taboo: Option<TabooChannels>,
    line_of_sight: Option<i32>,
    advanced_link_counter: Option<u32>,
    link_status: Option<u32>,
    full_mesh: bool,
}

struct SimInner {
    params: ParamTable,
    map: SubmitMap,
    limits: Limits,
    network: RwLock<NetworkInfo>,
    nodes: RwLock<HashMap<NodeId, NodeInfo>>,
    values: RwLock<HashMap<(Param, NodeId, NodeId), Value>>,
    rates: RwLock<HashMap<(NodeId, NodeId), LinkRate>>,
    counters: RwLock<EventCounters>,
    misc: RwLock<Misc>,
    faults: Mutex<VecDeque<Fault>>,
    /// (after this many sends, node) pairs still pending.
    departures: Mutex<Vec<(u64, NodeId)>>,
    sends: AtomicU64,
}

/// Simulated network device.
#[derive(Clone)]
pub struct SimDevice {
    inner: Arc<SimInner>,
}

impl SimDevice {
    /// A network of `members`, all L2ME capable, with the lowest member
    /// as network coordinator and local node.
    pub fn new(ctx: &Context, members: NodeMask) -> Self {
        let first = members.first().unwrap_or(NodeId::ZERO);
        let network = NetworkInfo {
            nc_node: first,
            backup_nc_node: members.iter().nth(1).unwrap_or(first),
            network_state: 3,
            beacon_channel: 1150,
            moca_version: 0x25,
            self_node: first,
            membership: members,
        };
        let nodes = members.iter().map(|n| (n, default_node_info(n))).collect();
        Self {
            inner: Arc::new(SimInner {
                params: ctx.params().clone(),
                map: ctx.submit_map().clone(),
                limits: Limits::from(ctx.config()),
                network: RwLock::new(network),
                nodes: RwLock::new(nodes),
                values: RwLock::new(HashMap::new()),
                rates: RwLock::new(HashMap::new()),
                counters: RwLock::new(EventCounters { link_up_events: 1, link_down_events: 0, admission_failures: 0, link_up_seconds: 3600 }),
                misc: RwLock::new(Misc {
                    password: Some("99999999988888888".into()),
                    taboo: Some(TabooChannels { start_channel: 40, channel_mask: 0x00ff_0000 }),
                    line_of_sight: Some(-1234),
                    advanced_link_counter: Some(0),
                    link_status: Some(1),
                    full_mesh: true,
                }),
                faults: Mutex::new(VecDeque::new()),
                departures: Mutex::new(Vec::new()),
                sends: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Override the value reported for a triple.
    pub fn set_value(&self, param: Param, queried: NodeId, remote: NodeId, value: Value) {
        self.inner.values.write().insert((param, queried, remote), value);
    }

    pub fn set_node_info(&self, node: NodeId, info: NodeInfo) {
        self.inner.nodes.write().insert(node, info);
    }

    /// Make `node_info` fail for a node that stays in the network.
    pub fn forget_node_info(&self, node: NodeId) {
        self.inner.nodes.write().remove(&node);
    }

    pub fn set_l2me_capable(&self, node: NodeId, capable: bool) {
        let mut nodes = self.inner.nodes.write();
        let info = nodes.entry(node).or_insert_with(|| default_node_info(node));
        if capable {
            info.protocol_caps |= NodeInfo::CAP_L2ME;
        } else {
            info.protocol_caps &= !NodeInfo::CAP_L2ME;
        }
    }

    pub fn set_event_counters(&self, counters: EventCounters) {
        *self.inner.counters.write() = counters;
    }

    pub fn set_rate(&self, queried: NodeId, remote: NodeId, rate: LinkRate) {
        self.inner.rates.write().insert((queried, remote), rate);
    }

    pub fn set_password(&self, password: Option<String>) {
        self.inner.misc.write().password = password;
    }

    pub fn set_taboo_channels(&self, taboo: Option<TabooChannels>) {
        self.inner.misc.write().taboo = taboo;
    }

    pub fn set_line_of_sight(&self, centi_db: Option<i32>) {
        self.inner.misc.write().line_of_sight = centi_db;
    }

    pub fn set_full_mesh_supported(&self, supported: bool) {
        self.inner.misc.write().full_mesh = supported;
    }

    /// Queue an outcome for an upcoming transaction.
    pub fn push_fault(&self, fault: Fault) {
        self.inner.faults.lock().push_back(fault);
    }

    /// Remove `node` from the network once `sends` transactions were sent.
    pub fn depart_after(&self, node: NodeId, sends: u64) {
        if self.sends() >= sends {
            self.remove_node(node);
        } else {
            self.inner.departures.lock().push((sends, node));
        }
    }

    pub fn remove_node(&self, node: NodeId) {
        self.inner.network.write().membership.remove(node);
    }

    pub fn add_node(&self, node: NodeId) {
        self.inner.network.write().membership.insert(node);
        self.inner.nodes.write().entry(node).or_insert_with(|| default_node_info(node));
    }

    /// Transactions received so far, faulted ones included.
    pub fn sends(&self) -> u64 {
        self.inner.sends.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// The value this device reports for a triple.
    ///
    /// Values not set with `set_value` depend on the parameter and the
    /// queried node only, as every remote of a Link parameter reads the
    /// same response words.
    pub fn value(&self, param: Param, queried: NodeId, remote: NodeId) -> Value {
        if let Some(v) = self.inner.values.read().get(&(param, queried, remote)) {
            return v.clone();
        }
        let seed = (param.index() as u32) << 16 | (queried.0 as u32) << 8;
        match self.inner.params.describe(param).value_type {
            ValueType::UInt32 => Value::UInt32(seed),
            ValueType::Int32 => Value::Int32(-(seed as i32 & 0xffff)),
            ValueType::CentiDecibel => Value::CentiDecibel(-100 * queried.0 as i32),
            ValueType::MacAddr => Value::MacAddr(MacAddr([0x00, 0x11, 0x22, 0x33, queried.0, 0])),
            ValueType::Profile => Value::Profile(Profile::uniform(queried.0)),
            ValueType::Password => Value::Password(String::new()),
        }
    }

    fn responses(&self, submit: &Submit) -> NodeResponses {
        let members = self.inner.network.read().membership;
        let nodes = self.inner.nodes.read();
        let mut responses = NodeResponses::none();
        for q in submit.queried().iter() {
            let capable = nodes.get(&q).is_some_and(NodeInfo::l2me_capable);
            if !members.contains(q) || !capable {
                continue;
            }
            let mut words = vec![0u32; submit.stats(&self.inner.limits).per_node_words[q.index()]];
            let mut written = None;
            for item in submit.response_items(&self.inner.map, q) {
                // Remotes of a Link parameter share its words; the lowest one answers.
                if written == Some(item.offset) {
                    continue;
                }
                written = Some(item.offset);
                if let (Some(w), Some(slot)) =
                    (self.value(item.param, q, item.remote).to_words(), words.get_mut(item.offset..item.offset + item.width))
                {
                    for (dst, src) in slot.iter_mut().zip(&w) {
                        *dst = *src;
                    }
                }
            }
            if words.len() <= self.inner.limits.max_words_per_node {
                responses.set(q, words);
            }
        }
        responses
    }

    fn apply_departures(&self, sent: u64) {
        let mut pending = self.inner.departures.lock();
        let (due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|(after, _)| *after <= sent);
        *pending = rest;
        drop(pending);
        for (_, node) in due {
            trace!(node = %node, sent, "simulated node departs");
            self.remove_node(node);
        }
    }
}

fn default_node_info(node: NodeId) -> NodeInfo {
    NodeInfo {
        mac: MacAddr([0x00, 0x11, 0x22, 0x00, 0x00, node.0]),
        moca_version: 0x25,
        preferred_nc: u32::from(node.0 == 0),
        protocol_caps: NodeInfo::CAP_L2ME,
        admitted_seconds: 100 * node.0 as u32,
    }
}

impl Device for SimDevice {
    fn send(&self, request: &Request) -> Result<Reply> {
        let sent = self.inner.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let fault = self.inner.faults.lock().pop_front();
        let reply = match fault {
            Some(Fault::Transport) => Err(Error::Transport("simulated transport failure".into())),
            Some(Fault::Reply(status)) => Ok(Reply { status, payload: Vec::new() }),
            None => Submit::decode(&request.submit).map(|submit| Reply {
                status: TxStatus::Success,
                payload: encode_concatenated(&self.responses(&submit)),
            }),
        };
        self.apply_departures(sent);
        reply
    }

    fn network_info(&self) -> Result<NetworkInfo> {
        Ok(self.inner.network.read().clone())
    }

    fn node_info(&self, node: NodeId) -> Result<NodeInfo> {
        if !self.inner.network.read().membership.contains(node) {
            return Err(Error::NotFound(format!("node {node} is not in the network")));
        }
        self.inner
            .nodes
            .read()
            .get(&node)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no info for node {node}")))
    }

    fn event_counters(&self) -> Result<EventCounters> {
        Ok(*self.inner.counters.read())
    }

    fn full_mesh_rates(&self, _budget: Duration) -> Result<FullMeshRates> {
        if !self.inner.misc.read().full_mesh {
            return Err(Error::NotSupported("full_mesh_rates".into()));
        }
        let members = self.inner.network.read().membership;
        let overrides = self.inner.rates.read();
        let mut rates = FullMeshRates::default();
        for q in NodeId::all() {
            for r in NodeId::all().filter(|r| *r != q) {
                let rate = overrides.get(&(q, r)).copied().unwrap_or_else(|| {
                    if members.contains(q) && members.contains(r) {
                        LinkRate { status: LinkRateStatus::Ok, tx_phy_rate: 500_000 + 1000 * q.0 as u32 + r.0 as u32, tx_nbas: 900 }
                    } else {
                        LinkRate { status: LinkRateStatus::NotInNetwork, ..LinkRate::default() }
                    }
                });
                rates.set(q, r, rate);
            }
        }
        Ok(rates)
    }

    fn password(&self) -> Result<String> {
        self.inner.misc.read().password.clone().ok_or_else(|| Error::NotSupported("password".into()))
    }

    fn taboo_channels(&self) -> Result<TabooChannels> {
        self.inner.misc.read().taboo.ok_or_else(|| Error::NotSupported("taboo_channels".into()))
    }

    fn line_of_sight(&self) -> Result<i32> {
        self.inner.misc.read().line_of_sight.ok_or_else(|| Error::NotSupported("line_of_sight".into()))
    }

    fn advanced_link_counter(&self) -> Result<u32> {
        self.inner.misc.read().advanced_link_counter.ok_or_else(|| Error::NotSupported("advanced_link_counter".into()))
    }

    fn link_status(&self) -> Result<u32> {
        self.inner.misc.read().link_status.ok_or_else(|| Error::NotSupported("link_status".into()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::Config;
    use crate::l2me::{decode_concatenated, Section};

    fn setup() -> (Context, SimDevice) {
        let ctx = Context::new(Config::default()).unwrap();
        let sim = SimDevice::new(&ctx, NodeMask::from_nodes((0..4).map(NodeId)));
        (ctx, sim)
    }

    #[test]
    fn test_network_info_from_members() {
        let (_, sim) = setup();
        let info = sim.network_info().unwrap();
        assert_eq!(info.nc_node, NodeId(0));
        assert_eq!(info.backup_nc_node, NodeId(1));
        assert_eq!(sim.membership().unwrap().len(), 4);
        assert!(sim.node_info(NodeId(9)).is_err());
    }

    #[test]
    fn test_echo_returns_stored_values() {
        let (ctx, sim) = setup();
        sim.set_value(Param::NodeUptime, NodeId(2), NodeId::ZERO, Value::UInt32(77));
        let mut submit = Submit::new();
        submit.section_mut(Section::Node1).queried = NodeMask::from_nodes([NodeId(2), NodeId(8)]);
        submit.select(ctx.submit_map().entry_for(Param::NodeUptime).unwrap());

        let reply = sim.send(&Request::get_queryables(&submit)).unwrap();
        assert_eq!(reply.status, TxStatus::Success);
        let responses = decode_concatenated(&reply.payload, &Limits::from(ctx.config()));
        assert_eq!(responses.node(NodeId(2)).words, vec![77]);
        assert!(!responses.node(NodeId(8)).valid);
        assert_eq!(sim.sends(), 1);
    }

    #[test]
    fn test_link_word_answered_once_per_parameter() {
        let (ctx, sim) = setup();
        sim.set_value(Param::LinkSnr, NodeId(1), NodeId(2), Value::CentiDecibel(-310));
        sim.set_value(Param::LinkSnr, NodeId(1), NodeId(3), Value::CentiDecibel(-999));
        let mut submit = Submit::new();
        let bits = submit.section_mut(Section::Link1);
        bits.queried = NodeMask::single(NodeId(1));
        bits.remote = NodeMask::from_nodes([NodeId(1), NodeId(2), NodeId(3)]);
        submit.select(ctx.submit_map().entry_for(Param::LinkSnr).unwrap());

        let reply = sim.send(&Request::get_queryables(&submit)).unwrap();
        let responses = decode_concatenated(&reply.payload, &Limits::from(ctx.config()));
        assert_eq!(responses.node(NodeId(1)).words, vec![-310i32 as u32]);
    }

    #[test]
    fn test_incapable_node_stays_silent() {
        let (ctx, sim) = setup();
        sim.set_l2me_capable(NodeId(1), false);
        assert_eq!(sim.l2me_capable().unwrap(), NodeMask::from_nodes([NodeId(0), NodeId(2), NodeId(3)]));
        let mut submit = Submit::new();
        submit.section_mut(Section::Node1).queried = NodeMask::single(NodeId(1));
        submit.select(ctx.submit_map().entry_for(Param::NodeUptime).unwrap());
        let reply = sim.send(&Request::get_queryables(&submit)).unwrap();
        let responses = decode_concatenated(&reply.payload, &Limits::from(ctx.config()));
        assert_eq!(responses.valid_nodes(), NodeMask::EMPTY);
    }

    #[test]
    fn test_faults_consumed_in_order() {
        let (_, sim) = setup();
        sim.push_fault(Fault::Reply(TxStatus::Timeout));
        sim.push_fault(Fault::Transport);
        let request = Request::get_queryables(&Submit::new());
        assert_eq!(sim.send(&request).unwrap().status, TxStatus::Timeout);
        assert!(matches!(sim.send(&request), Err(Error::Transport(_))));
        assert_eq!(sim.send(&request).unwrap().status, TxStatus::Success);
        assert_eq!(sim.sends(), 3);
    }

    #[test]
    fn test_departure_after_sends() {
        let (_, sim) = setup();
        sim.depart_after(NodeId(3), 2);
        let request = Request::get_queryables(&Submit::new());
        sim.send(&request).unwrap();
        assert!(sim.membership().unwrap().contains(NodeId(3)));
        sim.send(&request).unwrap();
        assert!(!sim.membership().unwrap().contains(NodeId(3)));
    }

    #[test]
    fn test_full_mesh_marks_absent_links() {
        let (_, sim) = setup();
        let rates = sim.full_mesh_rates(Duration::from_secs(1)).unwrap();
        assert_eq!(rates.get(NodeId(0), NodeId(1)).status, LinkRateStatus::Ok);
        assert_eq!(rates.get(NodeId(0), NodeId(7)).status, LinkRateStatus::NotInNetwork);
        sim.set_full_mesh_supported(false);
        assert!(sim.full_mesh_rates(Duration::from_secs(1)).is_err());
    }
}
