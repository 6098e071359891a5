//! # Collection Orchestrator
//!
//! Brings a cache up to date for a selection, routing every parameter to
//! the cheapest source that serves it.
//!
//! ```text
//! Idle ─▶ Staleifying ─▶ LocalFill ─▶ FullMeshFill ─▶ PasswordFill
//!                                                        │
//!      Done ◀─ Reconcile ◀─ L2meDrain ◀─ MiscFill ◀──────┘
//! ```
//!
//! Local getters are fault tolerant one by one: a failing getter is
//! reported as a non-fatal condition and its slots are left as they were.
//! The L2ME drain ends early, without error, when the deadline passes or
//! the failure budget runs out.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::cache::Cache;
use crate::context::Context;
use crate::device::{Device, LinkRateStatus, NetworkInfo, Reply, Request, TxStatus};
use crate::l2me::{build_submit, decode_concatenated, install_response, Limits};
use crate::model::{Disposition, NodeId, NodeMask, Value};
use crate::param::{Param, Source};
use crate::select::SelectionSet;
use crate::{Error, Result};

// ============================================================================
// Phases and deadline
// ============================================================================

/// Steps of one fill cycle, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Staleifying,
    LocalFill,
    FullMeshFill,
    PasswordFill,
    MiscFill,
    L2meDrain,
    Reconcile,
    Done,
}

/// A point in time after which no new transaction starts.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    /// `None` when the timeout does not fit an `Instant`.
    end: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let start = Instant::now();
        Self { start, end: start.checked_add(timeout) }
    }

    pub fn expired(&self) -> bool {
        self.end.is_some_and(|end| Instant::now() >= end)
    }

    pub fn remaining(&self) -> Duration {
        self.end.map_or(Duration::MAX, |end| end.saturating_duration_since(Instant::now()))
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// What one fill cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub phases: Vec<Phase>,
    /// L2ME transactions sent, retries included.
    pub transactions: u32,
    /// Transactions repeated after a timeout.
    pub retries: u32,
    /// Persistent failures charged to the budget.
    pub failures: u32,
    /// Slots written `Fresh`.
    pub fresh: usize,
    /// Slots written `Unretrievable`.
    pub unretrievable: usize,
    pub timed_out: bool,
    pub budget_exhausted: bool,
    /// Membership seen by the reconcile phase.
    pub membership: NodeMask,
}

impl FillReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            phases: vec![Phase::Idle],
            transactions: 0,
            retries: 0,
            failures: 0,
            fresh: 0,
            unretrievable: 0,
            timed_out: false,
            budget_exhausted: false,
            membership: NodeMask::EMPTY,
        }
    }

    /// Whether the cycle covered everything it was asked for.
    pub fn complete(&self) -> bool {
        !self.timed_out && !self.budget_exhausted
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Run one fill cycle of `cache` for `select`.
///
/// `spin` is called whenever the collector has to wait, with the time it
/// wants to wait; callers normally sleep. Only a failure to read the final
/// membership is an error; everything else is reflected in dispositions
/// and in the returned report.
pub fn fill_cache<D: Device + ?Sized>(
    ctx: &Context,
    device: &D,
    cache: &mut Cache,
    select: &SelectionSet,
    timeout: Duration,
    spin: &mut dyn FnMut(Duration),
) -> Result<FillReport> {
    let mut collector = Collector {
        ctx,
        device,
        cache,
        select,
        deadline: Deadline::after(timeout),
        spin,
        report: FillReport::new(),
        budget: ctx.config().failure_budget,
        last_tx: None,
        network: None,
    };
    collector.run()?;
    let mut report = collector.report;
    report.elapsed_ms = u64::try_from(collector.deadline.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        transactions = report.transactions,
        retries = report.retries,
        failures = report.failures,
        fresh = report.fresh,
        timed_out = report.timed_out,
        budget_exhausted = report.budget_exhausted,
        "fill cycle finished"
    );
    Ok(report)
}

struct Collector<'a, D: Device + ?Sized> {
    ctx: &'a Context,
    device: &'a D,
    cache: &'a mut Cache,
    select: &'a SelectionSet,
    deadline: Deadline,
    spin: &'a mut dyn FnMut(Duration),
    report: FillReport,
    budget: u32,
    last_tx: Option<Instant>,
    network: Option<NetworkInfo>,
}

impl<D: Device + ?Sized> Collector<'_, D> {
    fn run(&mut self) -> Result<()> {
        self.enter(Phase::Staleifying);
        let staled = self.cache.staleify();
        trace!(staled, "fresh slots marked stale");

        self.enter(Phase::LocalFill);
        self.fill_network_info();
        self.fill_node_info();
        self.fill_event_counters();

        self.enter(Phase::FullMeshFill);
        self.fill_full_mesh();

        self.enter(Phase::PasswordFill);
        self.fill_network(&[Param::Password], |d| d.password(), |password, _| Some(Value::Password(password.clone())));

        self.enter(Phase::MiscFill);
        self.fill_misc();

        self.enter(Phase::L2meDrain);
        self.drain_l2me()?;

        self.enter(Phase::Reconcile);
        let membership = self.device.membership()?;
        let (to_nin, revived) = self.cache.reconcile(membership);
        debug!(%membership, to_nin, revived, "cache reconciled");
        self.report.membership = membership;

        self.enter(Phase::Done);
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        debug!(?phase, "fill phase");
        self.report.phases.push(phase);
    }

    // ========================================================================
    // Local sources
    // ========================================================================

    fn wants(&self, params: &[Param]) -> bool {
        params.iter().any(|p| !self.select.param_is_empty(*p))
    }

    fn wants_source(&self, source: Source) -> bool {
        self.select.selected_params().iter().any(|p| self.ctx.describe(*p).source == source)
    }

    fn fill_network_info(&mut self) {
        const PARAMS: [Param; 6] = [
            Param::NcNode,
            Param::BackupNcNode,
            Param::NetworkState,
            Param::BeaconChannel,
            Param::NetworkMocaVersion,
            Param::SelfNode,
        ];
        if !self.wants(&PARAMS) && !self.wants_source(Source::NodeInfo) {
            return;
        }
        match self.device.network_info() {
            Ok(info) => {
                for p in PARAMS {
                    let value = match p {
                        Param::NcNode => info.nc_node.0 as u32,
                        Param::BackupNcNode => info.backup_nc_node.0 as u32,
                        Param::NetworkState => info.network_state,
                        Param::BeaconChannel => info.beacon_channel,
                        Param::NetworkMocaVersion => info.moca_version,
                        _ => info.self_node.0 as u32,
                    };
                    self.install(p, NodeId::ZERO, NodeId::ZERO, Value::UInt32(value));
                }
                self.network = Some(info);
            }
            Err(e) => self.unavailable("network_info", &e),
        }
    }

    fn fill_node_info(&mut self) {
        const PARAMS: [Param; 5] = [
            Param::NodeMacAddr,
            Param::NodeMocaVersion,
            Param::NodePreferredNc,
            Param::NodeProtocolCaps,
            Param::NodeAdmittedSeconds,
        ];
        let Some(members) = self.network.as_ref().map(|n| n.membership) else {
            return;
        };
        let selected = PARAMS.iter().fold(NodeMask::EMPTY, |acc, p| acc | self.select.queried_any(*p));
        for node in (selected & members).iter() {
            match self.device.node_info(node) {
                Ok(info) => {
                    self.install(Param::NodeMacAddr, node, NodeId::ZERO, Value::MacAddr(info.mac));
                    self.install(Param::NodeMocaVersion, node, NodeId::ZERO, Value::UInt32(info.moca_version));
                    self.install(Param::NodePreferredNc, node, NodeId::ZERO, Value::UInt32(info.preferred_nc));
                    self.install(Param::NodeProtocolCaps, node, NodeId::ZERO, Value::UInt32(info.protocol_caps));
                    self.install(Param::NodeAdmittedSeconds, node, NodeId::ZERO, Value::UInt32(info.admitted_seconds));
                }
                Err(e) => self.unavailable("node_info", &e),
            }
        }
    }

    fn fill_event_counters(&mut self) {
        self.fill_network(
            &[Param::LinkUpEvents, Param::LinkDownEvents, Param::AdmissionFailures, Param::LinkUpSeconds],
            |d| d.event_counters(),
            |counters, p| {
                let v = match p {
                    Param::LinkUpEvents => counters.link_up_events,
                    Param::LinkDownEvents => counters.link_down_events,
                    Param::AdmissionFailures => counters.admission_failures,
                    _ => counters.link_up_seconds,
                };
                Some(Value::UInt32(v))
            },
        );
    }

    fn fill_full_mesh(&mut self) {
        const PARAMS: [Param; 2] = [Param::LinkTxPhyRate, Param::LinkTxNbas];
        if !self.wants(&PARAMS) {
            return;
        }
        let rates = match self.device.full_mesh_rates(self.deadline.remaining()) {
            Ok(rates) => rates,
            Err(e) => return self.unavailable("full_mesh_rates", &e),
        };
        for q in NodeId::all() {
            for r in NodeId::all().filter(|r| *r != q) {
                let rate = rates.get(q, r);
                for p in PARAMS {
                    let value = if p == Param::LinkTxPhyRate { rate.tx_phy_rate } else { rate.tx_nbas };
                    match rate.status {
                        LinkRateStatus::Ok => self.install(p, q, r, Value::UInt32(value)),
                        LinkRateStatus::NotInNetwork => self.mark(p, q, r, Disposition::Nin),
                        LinkRateStatus::Unavailable => self.mark(p, q, r, Disposition::Unretrievable),
                        LinkRateStatus::QueryFailed => {}
                    }
                }
            }
        }
    }

    fn fill_misc(&mut self) {
        self.fill_network(
            &[Param::TabooStartChannel, Param::TabooChannelMask],
            |d| d.taboo_channels(),
            |taboo, p| {
                Some(Value::UInt32(if p == Param::TabooStartChannel { taboo.start_channel } else { taboo.channel_mask }))
            },
        );
        self.fill_network(&[Param::LineOfSight], |d| d.line_of_sight(), |v, _| Some(Value::CentiDecibel(*v)));
        self.fill_network(&[Param::AdvancedLinkCounter], |d| d.advanced_link_counter(), |v, _| Some(Value::UInt32(*v)));
        self.fill_network(&[Param::LinkStatus], |d| d.link_status(), |v, _| Some(Value::UInt32(*v)));
    }

    /// One local getter serving Network parameters.
    fn fill_network<T>(
        &mut self,
        params: &[Param],
        fetch: impl FnOnce(&D) -> Result<T>,
        extract: impl Fn(&T, Param) -> Option<Value>,
    ) {
        if !self.wants(params) {
            return;
        }
        match fetch(self.device) {
            Ok(got) => {
                for p in params {
                    if let Some(value) = extract(&got, *p) {
                        self.install(*p, NodeId::ZERO, NodeId::ZERO, value);
                    }
                }
            }
            Err(e) => {
                let getter = self.ctx.describe(params[0]).name;
                self.unavailable(getter, &e);
            }
        }
    }

    /// A failed local getter leaves its slots as they were.
    fn unavailable(&self, getter: &str, error: &Error) {
        self.ctx.report(false, "fill_cache", &format!("{getter} failed: {error}"), 0, 0);
    }

    // ========================================================================
    // Cache writes
    // ========================================================================

    fn install(&mut self, param: Param, queried: NodeId, remote: NodeId, value: Value) {
        match self.cache.set(param, Some(self.select), queried, remote, Some(value), Disposition::Fresh) {
            Ok(true) => self.report.fresh += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(param = %param, queried = %queried, remote = %remote, error = %e, "install failed");
                self.charge(&e);
            }
        }
    }

    fn mark(&mut self, param: Param, queried: NodeId, remote: NodeId, disposition: Disposition) {
        match self.cache.set(param, Some(self.select), queried, remote, None, disposition) {
            Ok(true) if disposition == Disposition::Unretrievable => self.report.unretrievable += 1,
            Ok(_) => {}
            Err(e) => warn!(param = %param, error = %e, "marking slot failed"),
        }
    }

    fn mark_all(&mut self, set: &SelectionSet, disposition: Disposition) {
        for (p, q, r) in set.triples(self.ctx) {
            self.mark(p, q, r, disposition);
        }
    }

    /// Spend one unit of the failure budget.
    fn charge(&mut self, error: &Error) {
        self.report.failures += 1;
        self.budget = self.budget.saturating_sub(1);
        debug!(%error, budget = self.budget, "failure charged");
    }

    // ========================================================================
    // L2ME
    // ========================================================================

    fn drain_l2me(&mut self) -> Result<()> {
        let mut wanted = self.select.clone();
        wanted.intersect_with(&self.ctx.presets().l2me);
        if wanted.is_empty() {
            return Ok(());
        }

        let capable = self.device.l2me_capable().unwrap_or_else(|e| {
            warn!(error = %e, "reading L2ME capability failed");
            NodeMask::EMPTY
        });
        let mut needed = wanted.clone();
        needed.restrict_queried(self.ctx, capable);
        wanted.subtract(&needed);
        self.mark_all(&wanted, Disposition::Unretrievable);

        let limits = Limits::from(self.ctx.config());
        while !needed.is_empty() {
            if self.deadline.expired() {
                self.report.timed_out = true;
                break;
            }
            if self.budget == 0 {
                self.report.budget_exhausted = true;
                break;
            }
            let submit = build_submit(self.ctx, &needed)?;
            if submit.is_empty() {
                debug!("outstanding triples have no submit bit");
                let rest = std::mem::take(&mut needed);
                self.mark_all(&rest, Disposition::Unretrievable);
                break;
            }

            self.pace();
            self.report.transactions += 1;
            self.last_tx = Some(Instant::now());
            match self.device.send(&Request::get_queryables(&submit)) {
                Ok(Reply { status: TxStatus::Success, payload }) => {
                    let responses = decode_concatenated(&payload, &limits);
                    let outcome = install_response(self.ctx, self.cache, Some(self.select), &mut needed, &submit, &responses);
                    trace!(?outcome, nodes = %responses.valid_nodes(), "response installed");
                    self.report.fresh += outcome.fresh;
                    self.report.unretrievable += outcome.unretrievable;
                    if outcome.failed > 0 {
                        self.charge(&Error::Internal(format!("{} values could not be stored", outcome.failed)));
                    }
                }
                Ok(Reply { status: TxStatus::Timeout, .. }) => {
                    debug!("transaction timed out, retrying");
                    self.report.retries += 1;
                }
                Ok(Reply { status: TxStatus::Failed(code), .. }) => self.charge(&Error::Transaction(code)),
                Err(e) => self.charge(&e),
            }
        }
        Ok(())
    }

    /// Wait out the minimum spacing since the previous transaction.
    fn pace(&mut self) {
        let spacing = self.ctx.config().min_tx_spacing();
        let Some(last) = self.last_tx else { return };
        let since = last.elapsed();
        if since < spacing {
            (self.spin)((spacing - since).min(self.deadline.remaining()));
        }
    }
}
