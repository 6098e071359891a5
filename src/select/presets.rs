//! Named selection sets, built once from the descriptor table.

use crate::model::NodeMask;
use crate::param::{Cardinality, ParamTable, Source};

use super::SelectionSet;

/// Selection presets.
#[derive(Debug, Clone)]
pub struct Presets {
    pub empty: SelectionSet,
    /// Every meaningful triple of every parameter.
    pub all: SelectionSet,
    /// Every Network-cardinality parameter.
    pub network: SelectionSet,
    /// Parameters fixed for as long as a node stays admitted.
    pub admission_constant: SelectionSet,
    /// Parameters of the link-up timing report.
    pub link_up_timing: SelectionSet,
    /// Every parameter collected through L2ME transactions.
    pub l2me: SelectionSet,
    /// Every parameter collected by the full-mesh rate query.
    pub full_mesh: SelectionSet,
}

impl Presets {
    pub fn new(params: &ParamTable) -> Self {
        let mut presets = Presets {
            empty: SelectionSet::empty(),
            all: SelectionSet::empty(),
            network: SelectionSet::empty(),
            admission_constant: SelectionSet::empty(),
            link_up_timing: SelectionSet::empty(),
            l2me: SelectionSet::empty(),
            full_mesh: SelectionSet::empty(),
        };

        for d in params.iter() {
            presets.all.include_all_of(d, NodeMask::ALL);
            if d.cardinality == Cardinality::Network {
                presets.network.include_all_of(d, NodeMask::ALL);
            }
            if d.admission_constant {
                presets.admission_constant.include_all_of(d, NodeMask::ALL);
            }
            if d.link_up_timing {
                presets.link_up_timing.include_all_of(d, NodeMask::ALL);
            }
            match d.source {
                Source::L2me => presets.l2me.include_all_of(d, NodeMask::ALL),
                Source::FullMeshRate => presets.full_mesh.include_all_of(d, NodeMask::ALL),
                _ => {}
            }
        }
        presets
    }

    /// Everything currently in the network: all Network parameters, Node
    /// parameters of present nodes, Link parameters between distinct
    /// present nodes.
    pub fn in_network(&self, params: &ParamTable, membership: NodeMask) -> SelectionSet {
        let mut set = SelectionSet::empty();
        for d in params.iter() {
            set.include_all_of(d, membership);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::model::NodeId;
    use crate::param::Param;

    #[test]
    fn test_presets_partition_by_source() {
        let ctx = Context::new(Config::default()).unwrap();
        let p = ctx.presets();
        assert!(!p.l2me.param_is_empty(Param::LinkSnr));
        assert!(p.l2me.param_is_empty(Param::LinkTxPhyRate));
        assert!(!p.full_mesh.param_is_empty(Param::LinkTxPhyRate));
        assert!(p.network.param_is_empty(Param::NodeUptime));
        assert!(!p.network.param_is_empty(Param::Password));
        assert!(!p.admission_constant.param_is_empty(Param::NodeMacAddr));
        assert!(!p.link_up_timing.param_is_empty(Param::LinkUpSeconds));
        assert!(p.empty.is_empty());
    }

    #[test]
    fn test_in_network_limits_nodes() {
        let ctx = Context::new(Config::default()).unwrap();
        let members = NodeMask::from_nodes([NodeId(0), NodeId(2)]);
        let s = ctx.presets().in_network(ctx.params(), members);
        assert!(s.test_single(&ctx, Param::NodeUptime, NodeId(2), NodeId::ZERO));
        assert!(!s.test_single(&ctx, Param::NodeUptime, NodeId(1), NodeId::ZERO));
        assert!(s.test_single(&ctx, Param::LinkSnr, NodeId(0), NodeId(2)));
        assert!(!s.test_single(&ctx, Param::LinkSnr, NodeId(0), NodeId(1)));
        assert!(s.test_single(&ctx, Param::NcNode, NodeId::ZERO, NodeId::ZERO));
    }

    #[test]
    fn test_all_is_union_of_sources() {
        let ctx = Context::new(Config::default()).unwrap();
        let p = ctx.presets();
        let mut rest = p.all.clone();
        rest.subtract(&p.l2me);
        rest.subtract(&p.full_mesh);
        for (param, _, _) in rest.triples(&ctx) {
            assert!(!matches!(ctx.describe(param).source, Source::L2me | Source::FullMeshRate));
        }
    }
}
