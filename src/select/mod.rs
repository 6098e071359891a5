//! # Selection Sets
//!
//! The request vocabulary: which (parameter, queried node, remote node)
//! triples a caller is interested in.
//!
//! For every parameter a selection set keeps `MAX_NODES` node masks, one
//! per remote node. Their meaning depends on cardinality:
//!
//! | Cardinality | Slot used   | Mask holds                               |
//! |-------------|-------------|------------------------------------------|
//! | Network     | 0           | nonzero ⇒ selected                       |
//! | Node        | 0           | queried nodes wanted                     |
//! | Link        | remote `r`  | queried nodes wanted together with `r`   |
//!
//! A Link mask never contains its own remote node: self-links do not exist.
//! Node and Network operations quietly treat an out-of-domain remote (or
//! queried) argument as 0 and report it when a nonzero value was passed.

mod parser;
mod presets;

use smallvec::SmallVec;

use crate::context::Context;
use crate::model::{NodeId, NodeMask, MAX_NODES};
use crate::param::{Cardinality, Descriptor, Param};

pub use presets::Presets;

/// Node argument of a wildcard operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeSel {
    All,
    One(NodeId),
}

impl NodeSel {
    pub fn mask(self) -> NodeMask {
        match self {
            NodeSel::All => NodeMask::ALL,
            NodeSel::One(n) => NodeMask::single(n),
        }
    }
}

impl From<NodeId> for NodeSel {
    fn from(n: NodeId) -> Self {
        NodeSel::One(n)
    }
}

/// Per-parameter, per-remote-node masks of queried nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    masks: Vec<[NodeMask; MAX_NODES]>,
}

impl Default for SelectionSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl SelectionSet {
    pub fn empty() -> Self {
        Self { masks: vec![[NodeMask::EMPTY; MAX_NODES]; Param::COUNT] }
    }

    // ========================================================================
    // Raw slot access
    // ========================================================================

    /// Raw mask of `param` at remote slot `remote`.
    #[inline]
    pub fn slot(&self, param: Param, remote: NodeId) -> NodeMask {
        self.masks[param.index()].get(remote.index()).copied().unwrap_or_default()
    }

    /// Remote nodes whose slot of `param` contains `queried`.
    pub fn remotes_for(&self, param: Param, queried: NodeId) -> NodeMask {
        NodeMask::from_nodes(
            NodeId::all().filter(|r| self.masks[param.index()][r.index()].contains(queried)),
        )
    }

    /// Union of every slot of `param`.
    pub fn queried_any(&self, param: Param) -> NodeMask {
        self.masks[param.index()].iter().fold(NodeMask::EMPTY, |acc, m| acc | *m)
    }

    pub fn param_is_empty(&self, param: Param) -> bool {
        self.masks[param.index()].iter().all(|m| m.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        Param::ALL.iter().all(|p| self.param_is_empty(*p))
    }

    /// Parameters with at least one selected triple.
    pub fn selected_params(&self) -> SmallVec<[Param; 16]> {
        Param::ALL.iter().copied().filter(|p| !self.param_is_empty(*p)).collect()
    }

    // ========================================================================
    // Cardinality-aware operations
    // ========================================================================

    /// Whether exactly (`queried`, `remote`) of `param` is selected.
    pub fn test_single(&self, ctx: &Context, param: Param, queried: NodeId, remote: NodeId) -> bool {
        let d = ctx.describe(param);
        match d.cardinality {
            Cardinality::Network => {
                normalize_zero(ctx, d, "queried", queried);
                normalize_zero(ctx, d, "remote", remote);
                !self.masks[param.index()][0].is_empty()
            }
            Cardinality::Node => {
                normalize_zero(ctx, d, "remote", remote);
                self.masks[param.index()][0].contains(queried)
            }
            Cardinality::Link => {
                if !link_pair_ok(ctx, d, "SelectionSet::test_single", queried, remote) {
                    return false;
                }
                self.masks[param.index()][remote.index()].contains(queried)
            }
        }
    }

    /// Whether any triple covered by the wildcards is selected.
    pub fn test_any(&self, ctx: &Context, param: Param, queried: NodeSel, remote: NodeSel) -> bool {
        let d = ctx.describe(param);
        let slots = &self.masks[param.index()];
        match d.cardinality {
            Cardinality::Network => {
                normalize_sel(ctx, d, "queried", queried);
                normalize_sel(ctx, d, "remote", remote);
                !slots[0].is_empty()
            }
            Cardinality::Node => {
                normalize_sel(ctx, d, "remote", remote);
                !(slots[0] & queried.mask()).is_empty()
            }
            Cardinality::Link => remote
                .mask()
                .iter()
                .any(|r| !((slots[r.index()] - NodeMask::single(r)) & queried.mask()).is_empty()),
        }
    }

    /// Select every triple covered by the wildcards.
    pub fn include_wildcard(&mut self, ctx: &Context, param: Param, queried: NodeSel, remote: NodeSel) {
        let d = ctx.describe(param);
        let slots = &mut self.masks[param.index()];
        match d.cardinality {
            Cardinality::Network => {
                normalize_sel(ctx, d, "queried", queried);
                normalize_sel(ctx, d, "remote", remote);
                slots[0] = NodeMask::single(NodeId::ZERO);
            }
            Cardinality::Node => {
                normalize_sel(ctx, d, "remote", remote);
                slots[0] = slots[0] | queried.mask();
            }
            Cardinality::Link => {
                if let (NodeSel::One(q), NodeSel::One(r)) = (queried, remote) {
                    if !link_pair_ok(ctx, d, "SelectionSet::include_wildcard", q, r) {
                        return;
                    }
                }
                for r in remote.mask().iter() {
                    let slot = &mut slots[r.index()];
                    *slot = *slot | (queried.mask() - NodeMask::single(r));
                }
            }
        }
    }

    /// Select exactly (`queried`, `remote`) of `param`.
    pub fn include_single(&mut self, ctx: &Context, param: Param, queried: NodeId, remote: NodeId) {
        if !queried.is_valid() {
            ctx.report(false, "SelectionSet::include_single", "queried node out of range", param.index() as i64, queried.0 as i64);
            return;
        }
        let remote = if remote.is_valid() { remote } else {
            ctx.report(false, "SelectionSet::include_single", "remote node out of range", param.index() as i64, remote.0 as i64);
            match ctx.describe(param).cardinality {
                Cardinality::Link => return,
                _ => NodeId::ZERO,
            }
        };
        self.include_wildcard(ctx, param, NodeSel::One(queried), NodeSel::One(remote));
    }

    /// Deselect (`queried`, `remote`) of `param`.
    ///
    /// Node parameters clear the queried bit of slot 0; Link parameters
    /// clear the queried bit of the remote's slot.
    pub fn clear_bit(&mut self, ctx: &Context, param: Param, queried: NodeId, remote: NodeId) {
        let d = ctx.describe(param);
        let slots = &mut self.masks[param.index()];
        match d.cardinality {
            Cardinality::Network => {
                normalize_zero(ctx, d, "queried", queried);
                normalize_zero(ctx, d, "remote", remote);
                slots[0] = NodeMask::EMPTY;
            }
            Cardinality::Node => {
                normalize_zero(ctx, d, "remote", remote);
                slots[0].remove(queried);
            }
            Cardinality::Link => {
                if remote.is_valid() {
                    slots[remote.index()].remove(queried);
                } else {
                    ctx.report(false, "SelectionSet::clear_bit", "remote node out of range", param.index() as i64, remote.0 as i64);
                }
            }
        }
    }

    /// Every selected triple, ordered by parameter, then queried, then remote.
    pub fn triples(&self, ctx: &Context) -> Vec<(Param, NodeId, NodeId)> {
        let mut out = Vec::new();
        for p in Param::ALL {
            let slots = &self.masks[p.index()];
            match ctx.describe(p).cardinality {
                Cardinality::Network => {
                    if !slots[0].is_empty() {
                        out.push((p, NodeId::ZERO, NodeId::ZERO));
                    }
                }
                Cardinality::Node => out.extend(slots[0].iter().map(|q| (p, q, NodeId::ZERO))),
                Cardinality::Link => {
                    for q in NodeId::all() {
                        for r in NodeId::all() {
                            if r != q && slots[r.index()].contains(q) {
                                out.push((p, q, r));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    // ========================================================================
    // Set algebra
    // ========================================================================

    pub fn union_with(&mut self, other: &SelectionSet) {
        self.zip_apply(other, |a, b| a | b);
    }

    pub fn intersect_with(&mut self, other: &SelectionSet) {
        self.zip_apply(other, |a, b| a & b);
    }

    pub fn subtract(&mut self, other: &SelectionSet) {
        self.zip_apply(other, |a, b| a - b);
    }

    /// Keep only triples whose queried node is in `nodes`. Network
    /// parameters are unaffected.
    pub fn restrict_queried(&mut self, ctx: &Context, nodes: NodeMask) {
        for p in Param::ALL {
            if ctx.describe(p).cardinality == Cardinality::Network {
                continue;
            }
            for slot in self.masks[p.index()].iter_mut() {
                *slot = *slot & nodes;
            }
        }
    }

    /// Drop every triple of `param`.
    pub fn clear_param(&mut self, param: Param) {
        self.masks[param.index()] = [NodeMask::EMPTY; MAX_NODES];
    }

    fn zip_apply(&mut self, other: &SelectionSet, f: impl Fn(NodeMask, NodeMask) -> NodeMask) {
        for (mine, theirs) in self.masks.iter_mut().zip(&other.masks) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a = f(*a, *b);
            }
        }
    }

    /// Select every meaningful triple of a parameter. Used to build presets
    /// before a `Context` exists.
    pub(crate) fn include_all_of(&mut self, d: &Descriptor, nodes: NodeMask) {
        let slots = &mut self.masks[d.param.index()];
        match d.cardinality {
            Cardinality::Network => slots[0] = NodeMask::single(NodeId::ZERO),
            Cardinality::Node => slots[0] = slots[0] | nodes,
            Cardinality::Link => {
                for r in nodes.iter() {
                    slots[r.index()] = slots[r.index()] | (nodes - NodeMask::single(r));
                }
            }
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

fn normalize_zero(ctx: &Context, d: &Descriptor, what: &str, node: NodeId) {
    if node != NodeId::ZERO {
        ctx.report(
            false,
            "SelectionSet",
            &format!("{what} node ignored for {:?} parameter '{}'", d.cardinality, d.name),
            d.param.index() as i64,
            node.0 as i64,
        );
    }
}

fn normalize_sel(ctx: &Context, d: &Descriptor, what: &str, sel: NodeSel) {
    if let NodeSel::One(node) = sel {
        normalize_zero(ctx, d, what, node);
    }
}

fn link_pair_ok(ctx: &Context, d: &Descriptor, location: &'static str, queried: NodeId, remote: NodeId) -> bool {
    if !queried.is_valid() || !remote.is_valid() {
        ctx.report(false, location, "node out of range", queried.0 as i64, remote.0 as i64);
        return false;
    }
    if queried == remote {
        ctx.report(
            false,
            location,
            &format!("self-link requested for '{}'", d.name),
            d.param.index() as i64,
            queried.0 as i64,
        );
        return false;
    }
    true
}
