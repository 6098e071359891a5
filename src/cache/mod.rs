//! # Parameter Cache
//!
//! A flat array of slots, each an optional pooled `Element` plus its
//! `Disposition`. Every parameter owns a fixed range of slots (see
//! `CacheLayout`), so copying a cache is a slot-wise clone that shares
//! elements by reference count.
//!
//! ## Install ordering
//!
//! A new value is written into a freshly allocated element which then
//! replaces the slot's element; the old element is dropped only after the
//! replacement. A slot therefore never refers to a released block.

mod layout;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::model::{Disposition, NodeId, NodeMask, Value, MAX_NODES};
use crate::param::{Cardinality, Param};
use crate::pool::Element;
use crate::select::SelectionSet;
use crate::{Error, Result};

pub use layout::{CacheLayout, SlotRange};

#[derive(Clone, Default)]
struct Slot {
    element: Option<Element>,
    disposition: Disposition,
}

/// One meaningful slot of a parameter, as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub queried: NodeId,
    pub remote: NodeId,
    pub value: Option<Value>,
    pub disposition: Disposition,
}

/// The parameter cache.
pub struct Cache {
    ctx: Context,
    layout: Arc<CacheLayout>,
    slots: Vec<Slot>,
}

impl Cache {
    /// Lay out every parameter and fill each slot with no value, `Unknown`.
    pub fn new(ctx: &Context) -> Result<Self> {
        let layout = match CacheLayout::new(ctx.params(), ctx.config().cache_capacity) {
            Ok(layout) => layout,
            Err(e) => {
                ctx.report(true, "Cache::new", &e.to_string(), ctx.config().cache_capacity as i64, 0);
                return Err(e);
            }
        };
        let slots = vec![Slot::default(); layout.total()];
        Ok(Self { ctx: ctx.clone(), layout: Arc::new(layout), slots })
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Slot index of a triple. Out-of-range ids are reported as fatal and
    /// yield the parameter's base slot.
    pub fn index_of(&self, param: Param, queried: NodeId, remote: NodeId) -> usize {
        self.checked_index(param, queried, remote, "Cache::index_of")
            .unwrap_or_else(|_| self.layout.range(param).base)
    }

    fn checked_index(&self, param: Param, queried: NodeId, remote: NodeId, location: &'static str) -> Result<usize> {
        let d = self.ctx.describe(param);
        self.layout.index_of(d, queried, remote).ok_or_else(|| {
            self.ctx.report(true, location, &format!("slot of '{}' out of range", d.name), queried.0 as i64, remote.0 as i64);
            Error::Structural {
                location,
                message: format!("({queried}, {remote}) outside the slots of '{}'", d.name),
            }
        })
    }

    // ========================================================================
    // Read / write
    // ========================================================================

    /// Store a value (or no value) with a disposition.
    ///
    /// Returns `Ok(false)` when `select` is given and does not contain the
    /// triple; nothing is touched then. A missing value is only accepted
    /// with `Unknown`, `Nin` or `Unretrievable`.
    ///
    /// When the pool cannot allocate, the slot is left as it was. When the
    /// new block cannot be written, an old value stays with `Stale` and an
    /// empty slot keeps its disposition.
    pub fn set(
        &mut self,
        param: Param,
        select: Option<&SelectionSet>,
        queried: NodeId,
        remote: NodeId,
        value: Option<Value>,
        disposition: Disposition,
    ) -> Result<bool> {
        if let Some(select) = select {
            if !select.test_single(&self.ctx, param, queried, remote) {
                return Ok(false);
            }
        }
        let index = self.checked_index(param, queried, remote, "Cache::set")?;
        let d = self.ctx.describe(param);

        let Some(value) = value else {
            if !disposition.allows_empty() {
                self.ctx.report(true, "Cache::set", &format!("'{}' set without a value as {disposition}", d.name), queried.0 as i64, remote.0 as i64);
                return Err(Error::Internal(format!("no value given for {disposition} '{}'", d.name)));
            }
            let slot = &mut self.slots[index];
            let old = slot.element.take();
            slot.disposition = disposition;
            drop(old);
            return Ok(true);
        };

        if value.value_type() != d.value_type {
            self.ctx.report(true, "Cache::set", &format!("'{}' given a {:?}", d.name, value.value_type()), queried.0 as i64, remote.0 as i64);
            return Err(Error::TypeError { expected: format!("{:?}", d.value_type), got: format!("{:?}", value.value_type()) });
        }

        match Element::allocate(self.ctx.pool(), &value) {
            Ok(element) => {
                let slot = &mut self.slots[index];
                let old = slot.element.replace(element);
                slot.disposition = disposition;
                drop(old);
                trace!(param = %param, queried = %queried, remote = %remote, %disposition, "slot set");
                Ok(true)
            }
            Err(e @ Error::PoolExhausted(_)) => {
                self.ctx.report(false, "Cache::set", &format!("no pool block for '{}'", d.name), queried.0 as i64, remote.0 as i64);
                Err(e)
            }
            Err(e) => {
                self.ctx.report(false, "Cache::set", &format!("writing '{}' failed: {e}", d.name), queried.0 as i64, remote.0 as i64);
                let slot = &mut self.slots[index];
                if slot.element.is_some() {
                    slot.disposition = Disposition::Stale;
                }
                Err(e)
            }
        }
    }

    /// Current value and disposition of a triple.
    pub fn view(&self, param: Param, queried: NodeId, remote: NodeId) -> (Option<Value>, Disposition) {
        let Ok(index) = self.checked_index(param, queried, remote, "Cache::view") else {
            return (None, Disposition::Unknown);
        };
        let slot = &self.slots[index];
        let value = slot.element.as_ref().and_then(|e| match e.value() {
            Ok(v) => Some(v),
            Err(err) => {
                self.ctx.report(false, "Cache::view", &format!("unreadable element: {err}"), param.index() as i64, index as i64);
                None
            }
        });
        (value, slot.disposition)
    }

    /// Disposition alone, without decoding the value.
    pub fn disposition(&self, param: Param, queried: NodeId, remote: NodeId) -> Disposition {
        self.checked_index(param, queried, remote, "Cache::disposition")
            .map_or(Disposition::Unknown, |i| self.slots[i].disposition)
    }

    /// Every meaningful slot of `param`: one for Network, one per node for
    /// Node, one per distinct ordered pair for Link.
    pub fn entries(&self, param: Param) -> Vec<Entry> {
        meaningful(self.ctx.describe(param).cardinality)
            .map(|(queried, remote)| {
                let (value, disposition) = self.view(param, queried, remote);
                Entry { queried, remote, value, disposition }
            })
            .collect()
    }

    // ========================================================================
    // Whole-cache operations
    // ========================================================================

    /// Copy every slot of `src`, sharing its elements.
    ///
    /// A parameter whose slot count differs between the two caches is
    /// reported and skipped.
    pub fn copy_from(&mut self, src: &Cache) {
        for p in Param::ALL {
            let (dst_range, src_range) = (self.layout.range(p), src.layout.range(p));
            if dst_range.len != src_range.len {
                self.ctx.report(true, "Cache::copy_from", &format!("slot count mismatch for '{p}'"), dst_range.len as i64, src_range.len as i64);
                continue;
            }
            self.slots[dst_range.base..dst_range.end()].clone_from_slice(&src.slots[src_range.base..src_range.end()]);
        }
    }

    /// Drop every element and reset every slot to `Unknown`.
    pub fn release(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
    }

    /// Mark every `Fresh` slot `Stale`. Returns how many changed.
    pub fn staleify(&mut self) -> usize {
        let mut changed = 0;
        for slot in self.slots.iter_mut().filter(|s| s.disposition == Disposition::Fresh) {
            slot.disposition = Disposition::Stale;
            changed += 1;
        }
        changed
    }

    /// Force slots of absent nodes to `Nin` and give `Nin` slots of present
    /// nodes back to `Unknown`. Returns `(to_nin, revived)`.
    pub fn reconcile(&mut self, membership: NodeMask) -> (usize, usize) {
        let (mut to_nin, mut revived) = (0, 0);
        for p in Param::ALL {
            let d = *self.ctx.describe(p);
            if d.cardinality == Cardinality::Network {
                continue;
            }
            for (q, r) in meaningful(d.cardinality) {
                let present = membership.contains(q) && (d.cardinality == Cardinality::Node || membership.contains(r));
                let Some(index) = self.layout.index_of(&d, q, r) else { continue };
                let slot = &mut self.slots[index];
                if !present {
                    if slot.disposition != Disposition::Nin || slot.element.is_some() {
                        slot.element = None;
                        slot.disposition = Disposition::Nin;
                        to_nin += 1;
                    }
                } else if slot.disposition == Disposition::Nin {
                    slot.element = None;
                    slot.disposition = Disposition::Unknown;
                    revived += 1;
                }
            }
        }
        (to_nin, revived)
    }

    /// Slots currently in `disposition`.
    pub fn count(&self, disposition: Disposition) -> usize {
        self.slots.iter().filter(|s| s.disposition == disposition).count()
    }
}

/// (queried, remote) pairs that carry meaning for a cardinality.
fn meaningful(cardinality: Cardinality) -> Box<dyn Iterator<Item = (NodeId, NodeId)>> {
    match cardinality {
        Cardinality::Network => Box::new(std::iter::once((NodeId::ZERO, NodeId::ZERO))),
        Cardinality::Node => Box::new(NodeId::all().map(|q| (q, NodeId::ZERO))),
        Cardinality::Link => Box::new(
            (0..MAX_NODES * MAX_NODES)
                .map(|i| (NodeId((i / MAX_NODES) as u8), NodeId((i % MAX_NODES) as u8)))
                .filter(|(q, r)| q != r),
        ),
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("slots", &self.slots.len())
            .field("capacity", &self.layout.capacity())
            .field("fresh", &self.count(Disposition::Fresh))
            .field("stale", &self.count(Disposition::Stale))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::Config;
    use crate::context::RecordingReporter;
    use crate::model::{MacAddr, Profile};
    use crate::pool::{ElementPool, SizeClass, SlabPool};

    fn ctx() -> (Context, Arc<RecordingReporter>) {
        let recorder = Arc::new(RecordingReporter::new());
        let ctx = Context::new(Config::default()).unwrap().with_reporter(recorder.clone());
        (ctx, recorder)
    }

    #[test]
    fn test_new_cache_is_unknown() {
        let (ctx, _) = ctx();
        let cache = Cache::new(&ctx).unwrap();
        assert_eq!(cache.view(Param::NodeUptime, NodeId(3), NodeId::ZERO), (None, Disposition::Unknown));
        assert_eq!(cache.count(Disposition::Unknown), cache.layout().total());
    }

    #[test]
    fn test_capacity_too_small_reported() {
        let recorder = Arc::new(RecordingReporter::new());
        let config = Config { cache_capacity: 10, ..Config::default() };
        let ctx = Context::new(config).unwrap().with_reporter(recorder.clone());
        assert!(Cache::new(&ctx).is_err());
        assert_eq!(recorder.fatal_count(), 1);
    }

    #[test]
    fn test_set_and_view() {
        let (ctx, _) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        let mac = MacAddr([0, 1, 2, 3, 4, 5]);
        assert!(cache.set(Param::NodeMacAddr, None, NodeId(2), NodeId::ZERO, Some(mac.into()), Disposition::Fresh).unwrap());
        assert_eq!(cache.view(Param::NodeMacAddr, NodeId(2), NodeId::ZERO), (Some(Value::MacAddr(mac)), Disposition::Fresh));
        assert!(cache.set(Param::LinkSnr, None, NodeId(1), NodeId(2), Some(Value::CentiDecibel(-250)), Disposition::Fresh).unwrap());
        assert_eq!(cache.view(Param::LinkSnr, NodeId(2), NodeId(1)).1, Disposition::Unknown);
    }

    #[test]
    fn test_set_filtered_by_selection() {
        let (ctx, _) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        let mut select = SelectionSet::empty();
        select.include_single(&ctx, Param::NodeUptime, NodeId(3), NodeId::ZERO);
        assert!(!cache.set(Param::NodeUptime, Some(&select), NodeId(4), NodeId::ZERO, Some(1u32.into()), Disposition::Fresh).unwrap());
        assert!(cache.set(Param::NodeUptime, Some(&select), NodeId(3), NodeId::ZERO, Some(1u32.into()), Disposition::Fresh).unwrap());
        assert_eq!(cache.view(Param::NodeUptime, NodeId(4), NodeId::ZERO), (None, Disposition::Unknown));
    }

    #[test]
    fn test_empty_value_needs_empty_disposition() {
        let (ctx, recorder) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        assert!(cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, None, Disposition::Fresh).is_err());
        assert_eq!(recorder.fatal_count(), 1);
        assert!(cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, None, Disposition::Unretrievable).unwrap());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let (ctx, _) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        let err = cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, Some(Value::Int32(1)), Disposition::Fresh);
        assert!(matches!(err, Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_out_of_range_reports_and_uses_base() {
        let (ctx, recorder) = ctx();
        let cache = Cache::new(&ctx).unwrap();
        let base = cache.layout().range(Param::NodeUptime).base;
        assert_eq!(cache.index_of(Param::NodeUptime, NodeId(40), NodeId::ZERO), base);
        assert_eq!(recorder.fatal_count(), 1);
    }

    #[test]
    fn test_replace_releases_old_block() {
        let (ctx, _) = ctx();
        let pool = Arc::new(SlabPool::new([4, 1, 1]));
        let ctx = ctx.with_pool(pool.clone());
        let mut cache = Cache::new(&ctx).unwrap();
        for v in 0..10u32 {
            cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, Some(v.into()), Disposition::Fresh).unwrap();
        }
        assert_eq!(pool.in_use(SizeClass::Word), 1);
        assert_eq!(cache.view(Param::NodeUptime, NodeId(1), NodeId::ZERO).0, Some(Value::UInt32(9)));
    }

    #[test]
    fn test_pool_exhaustion_keeps_prior_value() {
        let (ctx, recorder) = ctx();
        let pool: Arc<dyn ElementPool> = Arc::new(SlabPool::new([1, 1, 1]));
        let ctx = ctx.with_pool(pool);
        let mut cache = Cache::new(&ctx).unwrap();
        cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, Some(5u32.into()), Disposition::Fresh).unwrap();
        let err = cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, Some(6u32.into()), Disposition::Fresh);
        assert!(matches!(err, Err(Error::PoolExhausted(SizeClass::Word))));
        assert_eq!(cache.view(Param::NodeUptime, NodeId(1), NodeId::ZERO), (Some(Value::UInt32(5)), Disposition::Fresh));
        assert_eq!(recorder.reports().len(), 1);
        assert!(!recorder.reports()[0].fatal);
    }

    #[test]
    fn test_failed_block_write_keeps_empty_slot_empty() {
        let (ctx, recorder) = ctx();
        let pool = Arc::new(SlabPool::new([2, 2, 2]));
        let ctx = ctx.with_pool(pool.clone());
        let mut cache = Cache::new(&ctx).unwrap();
        let long = Value::Password("x".repeat(300));

        assert!(cache.set(Param::Password, None, NodeId::ZERO, NodeId::ZERO, Some(long.clone()), Disposition::Fresh).is_err());
        assert_eq!(cache.view(Param::Password, NodeId::ZERO, NodeId::ZERO), (None, Disposition::Unknown));
        assert_eq!(recorder.fatal_count(), 0);

        let short = Value::Password("1234567890123".into());
        cache.set(Param::Password, None, NodeId::ZERO, NodeId::ZERO, Some(short.clone()), Disposition::Fresh).unwrap();
        assert!(cache.set(Param::Password, None, NodeId::ZERO, NodeId::ZERO, Some(long), Disposition::Fresh).is_err());
        assert_eq!(cache.view(Param::Password, NodeId::ZERO, NodeId::ZERO), (Some(short), Disposition::Stale));
        assert_eq!(pool.in_use(SizeClass::Block), 1);
    }

    #[test]
    fn test_copy_shares_and_stays_independent() {
        let (ctx, _) = ctx();
        let mut master = Cache::new(&ctx).unwrap();
        master.set(Param::NodeMapProfile, None, NodeId(0), NodeId::ZERO, Some(Profile::uniform(3).into()), Disposition::Fresh).unwrap();
        let mut copy = Cache::new(&ctx).unwrap();
        copy.copy_from(&master);
        assert_eq!(copy.view(Param::NodeMapProfile, NodeId(0), NodeId::ZERO), master.view(Param::NodeMapProfile, NodeId(0), NodeId::ZERO));

        copy.set(Param::NodeMapProfile, None, NodeId(0), NodeId::ZERO, Some(Profile::uniform(9).into()), Disposition::Fresh).unwrap();
        assert_eq!(master.view(Param::NodeMapProfile, NodeId(0), NodeId::ZERO).0, Some(Value::Profile(Profile::uniform(3))));
        master.release();
        assert_eq!(copy.view(Param::NodeMapProfile, NodeId(0), NodeId::ZERO).0, Some(Value::Profile(Profile::uniform(9))));
        assert_eq!(master.view(Param::NodeMapProfile, NodeId(0), NodeId::ZERO), (None, Disposition::Unknown));
    }

    #[test]
    fn test_staleify_only_touches_fresh() {
        let (ctx, _) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        cache.set(Param::NcNode, None, NodeId::ZERO, NodeId::ZERO, Some(1u32.into()), Disposition::Fresh).unwrap();
        cache.set(Param::NodeUptime, None, NodeId(1), NodeId::ZERO, None, Disposition::Nin).unwrap();
        assert_eq!(cache.staleify(), 1);
        assert_eq!(cache.view(Param::NcNode, NodeId::ZERO, NodeId::ZERO), (Some(Value::UInt32(1)), Disposition::Stale));
        assert_eq!(cache.disposition(Param::NodeUptime, NodeId(1), NodeId::ZERO), Disposition::Nin);
    }

    #[test]
    fn test_reconcile_membership() {
        let (ctx, _) = ctx();
        let mut cache = Cache::new(&ctx).unwrap();
        cache.set(Param::NodeUptime, None, NodeId(5), NodeId::ZERO, Some(3u32.into()), Disposition::Fresh).unwrap();
        cache.set(Param::LinkSnr, None, NodeId(1), NodeId(5), Some(Value::CentiDecibel(1)), Disposition::Fresh).unwrap();
        cache.set(Param::NodeUptime, None, NodeId(2), NodeId::ZERO, None, Disposition::Nin).unwrap();

        let members = NodeMask::from_nodes([NodeId(0), NodeId(1), NodeId(2)]);
        cache.reconcile(members);
        assert_eq!(cache.view(Param::NodeUptime, NodeId(5), NodeId::ZERO), (None, Disposition::Nin));
        assert_eq!(cache.view(Param::LinkSnr, NodeId(1), NodeId(5)), (None, Disposition::Nin));
        assert_eq!(cache.disposition(Param::NodeUptime, NodeId(2), NodeId::ZERO), Disposition::Unknown);
        assert_eq!(cache.disposition(Param::LinkSnr, NodeId(0), NodeId(1)), Disposition::Unknown);
        assert_eq!(cache.disposition(Param::NcNode, NodeId::ZERO, NodeId::ZERO), Disposition::Unknown);
    }

    #[test]
    fn test_entries_skip_diagonal() {
        let (ctx, _) = ctx();
        let cache = Cache::new(&ctx).unwrap();
        assert_eq!(cache.entries(Param::NcNode).len(), 1);
        assert_eq!(cache.entries(Param::NodeUptime).len(), MAX_NODES);
        let link = cache.entries(Param::LinkSnr);
        assert_eq!(link.len(), MAX_NODES * (MAX_NODES - 1));
        assert!(link.iter().all(|e| e.queried != e.remote));
    }
}
